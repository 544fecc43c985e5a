pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::types::Role;

pub use password::{hash_password, verify_password, DEFAULT_COST};

/// Payload of the long-lived session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub user_id: String,
    pub role: Role,
    pub school_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl TokenClaims {
    pub fn new(user_id: String, role: Role, school_id: Option<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            user_id,
            role,
            school_id,
            exp,
            iat: now.timestamp(),
        }
    }

    /// Superadmins reach every school; school admins only their own
    pub fn can_access_school(&self, school_id: Option<&str>) -> bool {
        match self.role {
            Role::Superadmin => true,
            Role::Schooladmin => match (self.school_id.as_deref(), school_id) {
                (Some(own), Some(target)) => own == target,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing error: {0}")]
    Signing(String),

    #[error("LONG_TOKEN_SECRET not set")]
    MissingSecret,
}

/// Issues and verifies long-lived tokens with the configured secret
#[derive(Clone)]
pub struct TokenManager {
    long_secret: String,
    long_expiry_hours: u64,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("long_expiry_hours", &self.long_expiry_hours)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(long_secret: impl Into<String>, long_expiry_hours: u64) -> Self {
        Self {
            long_secret: long_secret.into(),
            long_expiry_hours,
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        if security.long_token_secret.is_empty() {
            tracing::warn!("LONG_TOKEN_SECRET is empty; every token will be rejected");
        }
        Self::new(security.long_token_secret.clone(), security.long_token_expiry_hours)
    }

    pub fn claims_for(&self, user_id: String, role: Role, school_id: Option<String>) -> TokenClaims {
        TokenClaims::new(user_id, role, school_id, self.long_expiry_hours)
    }

    pub fn sign_long_token(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        if self.long_secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let encoding_key = EncodingKey::from_secret(self.long_secret.as_bytes());
        encode(&Header::default(), claims, &encoding_key).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry. Any failure yields None.
    pub fn verify_long_token(&self, token: &str) -> Option<TokenClaims> {
        if token.is_empty() || self.long_secret.is_empty() {
            return None;
        }

        let decoding_key = DecodingKey::from_secret(self.long_secret.as_bytes());
        match decode::<TokenClaims>(token, &decoding_key, &Validation::default()) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!("Rejected long token: {}", e);
                None
            }
        }
    }
}
