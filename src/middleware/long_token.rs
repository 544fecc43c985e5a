use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::auth::TokenManager;
use crate::dispatch::{Flow, Middleware, RequestContext, StackResults};
use crate::error::ApiError;

pub const LONG_TOKEN: &str = "__longToken";

/// Verifies the session token and hands its claims to the handler
pub struct LongToken {
    tokens: Arc<TokenManager>,
}

impl LongToken {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }
}

/// Token from the `token` header, or `Authorization: Bearer <jwt>`
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers.get("token").and_then(|v| v.to_str().ok()) {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    let auth = headers.get("authorization")?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Middleware for LongToken {
    fn name(&self) -> &str {
        LONG_TOKEN
    }

    async fn handle(&self, ctx: &RequestContext, _results: &StackResults) -> anyhow::Result<Flow> {
        let Some(token) = extract_token(&ctx.headers) else {
            return Ok(Flow::Respond(ApiError::unauthorized("missing token").into_reply()));
        };

        match self.tokens.verify_long_token(&token) {
            Some(claims) => Ok(Flow::Next(serde_json::to_value(claims)?)),
            None => Ok(Flow::Respond(ApiError::unauthorized("invalid token").into_reply())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use axum::http::{HeaderValue, Method, StatusCode};

    fn ctx_with(name: &'static str, value: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        RequestContext::new(Method::GET, "user", "getProfile").with_headers(headers)
    }

    #[tokio::test]
    async fn valid_token_yields_claims() {
        let tokens = Arc::new(TokenManager::new("secret", 1));
        let claims = tokens.claims_for("u1".into(), Role::Superadmin, None);
        let token = tokens.sign_long_token(&claims).unwrap();
        let mw = LongToken::new(tokens);

        for ctx in [ctx_with("token", &token), ctx_with("authorization", &format!("Bearer {}", token))] {
            match mw.handle(&ctx, &StackResults::default()).await.unwrap() {
                Flow::Next(value) => {
                    assert_eq!(value["userId"], "u1");
                    assert_eq!(value["role"], "superadmin");
                }
                other => panic!("expected claims, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let mw = LongToken::new(Arc::new(TokenManager::new("secret", 1)));

        let none = RequestContext::new(Method::GET, "user", "getProfile");
        let bad = ctx_with("token", "garbage");

        for ctx in [none, bad] {
            match mw.handle(&ctx, &StackResults::default()).await.unwrap() {
                Flow::Respond(reply) => assert_eq!(reply.status, StatusCode::UNAUTHORIZED),
                other => panic!("expected 401, got {:?}", other),
            }
        }
    }
}
