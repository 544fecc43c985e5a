use async_trait::async_trait;

use crate::auth::TokenClaims;
use crate::dispatch::{Flow, Middleware, RequestContext, StackResults};
use crate::error::ApiError;
use crate::types::Role;

use super::long_token::LONG_TOKEN;

pub const IS_SUPER_ADMIN: &str = "__isSuperAdmin";
pub const IS_SCHOOL_ADMIN: &str = "__isSchoolAdmin";

/// Admits requests whose verified claims carry one of `allowed`.
/// Reads the `__longToken` slot, so handlers must declare it first.
pub struct RoleGuard {
    name: &'static str,
    allowed: &'static [Role],
    message: &'static str,
}

impl RoleGuard {
    pub fn super_admin() -> Self {
        Self {
            name: IS_SUPER_ADMIN,
            allowed: &[Role::Superadmin],
            message: "forbidden: superadmin access required",
        }
    }

    pub fn school_admin() -> Self {
        Self {
            name: IS_SCHOOL_ADMIN,
            allowed: &[Role::Superadmin, Role::Schooladmin],
            message: "forbidden: schooladmin or superadmin access required",
        }
    }

    fn admits(&self, claims: Option<&TokenClaims>) -> bool {
        claims.is_some_and(|c| self.allowed.contains(&c.role))
    }
}

#[async_trait]
impl Middleware for RoleGuard {
    fn name(&self) -> &str {
        self.name
    }

    async fn handle(&self, _ctx: &RequestContext, results: &StackResults) -> anyhow::Result<Flow> {
        let claims = results
            .get(LONG_TOKEN)
            .and_then(|v| serde_json::from_value::<TokenClaims>(v.clone()).ok());

        if !self.admits(claims.as_ref()) {
            return Ok(Flow::Respond(ApiError::forbidden(self.message).into_reply()));
        }

        // Pass the claims through so the guard's own slot is usable too
        Ok(Flow::Next(results.get(LONG_TOKEN).cloned().unwrap_or_default()))
    }
}
