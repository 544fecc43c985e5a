//! Entity modules: the business methods exposed through the dispatch engine.
//!
//! Handlers report expected failures as `{ "error": .. }` or `{ "errors": .. }`
//! values. Unexpected failures (store or token errors) are logged and turned
//! into a generic `<action> failed` business error.

pub mod classroom;
pub mod school;
pub mod student;
pub mod user;

use std::future::Future;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::auth::TokenClaims;
use crate::dispatch::{bind, HandlerInput};
use crate::middleware::LONG_TOKEN;

pub use classroom::ClassroomModule;
pub use school::SchoolModule;
pub use student::StudentModule;
pub use user::UserModule;

/// Business error value
pub fn error(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Verified token claims injected into the handler, if any
pub fn claims(input: &HandlerInput) -> Option<TokenClaims> {
    input
        .injected(LONG_TOKEN)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

pub fn can_access(claims: Option<&TokenClaims>, school_id: Option<&str>) -> bool {
    claims.is_some_and(|c| c.can_access_school(school_id))
}

pub fn str_field<'a>(block: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    block.get(key).and_then(Value::as_str)
}

/// `page`/`limit` query paging with the list defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: i64,
    pub limit: i64,
}

impl Paging {
    pub fn from_input(input: &HandlerInput) -> Self {
        Self {
            page: input.int_or("page", 1),
            limit: input.int_or("limit", 20),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.max(0) as usize
    }

    pub fn offset(&self) -> usize {
        // Client-controlled; saturate instead of overflowing
        self.page.saturating_sub(1).saturating_mul(self.limit).max(0) as usize
    }
}

/// Copy each listed field the client sent (even as null) into `update`
pub fn copy_present(input: &HandlerInput, fields: &[&str], update: &mut Map<String, Value>) {
    for field in fields {
        if let Some(value) = input.get(field) {
            update.insert(field.to_string(), value.clone());
        }
    }
}

/// Client value, or null when absent or falsy
pub fn or_null(input: &HandlerInput, key: &str) -> Value {
    match input.get(key) {
        Some(value) if crate::dispatch::is_truthy(value) => value.clone(),
        _ => Value::Null,
    }
}

pub fn number_or_null(input: &HandlerInput, key: &str) -> Value {
    match input.get(key) {
        Some(value @ Value::Number(_)) => value.clone(),
        _ => Value::Null,
    }
}

pub fn without_password(mut block: Map<String, Value>) -> Value {
    block.remove("password");
    Value::Object(block)
}

pub fn merged(mut existing: Map<String, Value>, update: &Map<String, Value>) -> Value {
    for (key, value) in update {
        existing.insert(key.clone(), value.clone());
    }
    Value::Object(existing)
}

/// Bind an entity method as a handler. Any error the method raises is logged
/// and answered with the `failure` business error.
pub fn entity_handler<M, F, Fut>(
    target: &Arc<M>,
    failure: &'static str,
    f: F,
) -> impl Fn(HandlerInput) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static
where
    M: Send + Sync + 'static,
    F: Fn(Arc<M>, HandlerInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    bind(target, move |module, input| {
        let call = f(module, input);
        async move {
            match call.await {
                Ok(value) => Ok(value),
                Err(e) => {
                    tracing::error!("{}: {:#}", failure, e);
                    Ok(error(failure))
                }
            }
        }
        .boxed()
    })
}
