pub mod long_token;
pub mod rate_limit;
pub mod role_guard;

use std::sync::Arc;

use crate::dispatch::{Injectable, Middleware, MiddlewareRegistry};

pub use long_token::{extract_token, LongToken, LONG_TOKEN};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
pub use role_guard::{RoleGuard, IS_SCHOOL_ADMIN, IS_SUPER_ADMIN};

/// Registry with every middleware the entity modules ask for
pub fn default_registry() -> MiddlewareRegistry {
    let mut registry = MiddlewareRegistry::new();
    registry
        .register(LONG_TOKEN, |inj: &Injectable| {
            Arc::new(LongToken::new(Arc::clone(&inj.tokens))) as Arc<dyn Middleware>
        })
        .register(IS_SUPER_ADMIN, |_: &Injectable| {
            Arc::new(RoleGuard::super_admin()) as Arc<dyn Middleware>
        })
        .register(IS_SCHOOL_ADMIN, |_: &Injectable| {
            Arc::new(RoleGuard::school_admin()) as Arc<dyn Middleware>
        });
    registry
}
