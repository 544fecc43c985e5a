use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::TokenManager;
use crate::config::AppConfig;
use crate::store::BlockStore;

use super::context::{RequestContext, StackResults};
use super::response::Reply;

/// What a middleware decided
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Continue the chain; the value is bound to this middleware's slot
    Next(Value),
    /// Terminal response; nothing after this middleware runs
    Respond(Reply),
}

/// A cross-cutting step run before a handler.
/// Returning `Err` is a fault and ends the request with a 500.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, ctx: &RequestContext, results: &StackResults) -> anyhow::Result<Flow>;
}

/// Shared dependencies handed to every middleware factory
#[derive(Clone)]
pub struct Injectable {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn BlockStore>,
    pub tokens: Arc<TokenManager>,
}

pub type MiddlewareFactory = Arc<dyn Fn(&Injectable) -> Arc<dyn Middleware> + Send + Sync>;

/// Lookup from special parameter (or pre-stage) name to factory
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, MiddlewareFactory>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; a later registration under the same name replaces it
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Injectable) -> Arc<dyn Middleware> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.insert(name.clone(), Arc::new(factory)).is_some() {
            tracing::warn!("Middleware factory '{}' replaced", name);
        } else {
            tracing::debug!("Registered middleware factory '{}'", name);
        }
        self
    }

    pub fn factory(&self, name: &str) -> Option<&MiddlewareFactory> {
        self.factories.get(name)
    }

    /// Build the middleware registered under `name`. Unknown names are absent, not errors.
    pub fn resolve(&self, name: &str, injectable: &Injectable) -> Option<Arc<dyn Middleware>> {
        self.factories.get(name).map(|factory| factory(injectable))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("MiddlewareRegistry").field("factories", &names).finish()
    }
}
