//! Shared fixtures for unit tests: stub middlewares, canned handlers and
//! handler inputs carrying verified claims.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::auth::TokenManager;
use crate::config::AppConfig;
use crate::dispatch::{
    Flow, HandlerDescriptor, HandlerInput, Injectable, Middleware, MiddlewareRegistry, Reply, RequestContext,
    StackResults,
};
use crate::middleware::LONG_TOKEN;
use crate::store::MemoryStore;
use crate::types::Role;

pub const TEST_SECRET: &str = "unit-test-secret";

pub fn test_tokens() -> Arc<TokenManager> {
    Arc::new(TokenManager::new(TEST_SECRET, 1))
}

pub fn test_injectable() -> Injectable {
    Injectable {
        config: Arc::new(AppConfig::development()),
        store: Arc::new(MemoryStore::new()),
        tokens: test_tokens(),
    }
}

/// Continues with a fixed value
pub struct Tag {
    name: String,
    value: Value,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Middleware for Tag {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: &RequestContext, _results: &StackResults) -> anyhow::Result<Flow> {
        Ok(Flow::Next(self.value.clone()))
    }
}

/// Registry where every name maps to a `Tag` producing the name itself
pub fn registry_of(names: &[&str]) -> Arc<MiddlewareRegistry> {
    let mut registry = MiddlewareRegistry::new();
    for name in names {
        let owned = name.to_string();
        registry.register(*name, move |_: &Injectable| {
            Arc::new(Tag::new(owned.clone(), owned.clone())) as Arc<dyn Middleware>
        });
    }
    Arc::new(registry)
}

/// Counts invocations, as a middleware or as a handler
#[derive(Clone)]
pub struct Counter {
    name: String,
    calls: Arc<AtomicUsize>,
}

impl Counter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn handler(&self, signature: &str) -> HandlerDescriptor {
        let calls = Arc::clone(&self.calls);
        HandlerDescriptor::new(self.name.clone(), signature, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Value::Null) }
        })
    }
}

#[async_trait]
impl Middleware for Counter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: &RequestContext, _results: &StackResults) -> anyhow::Result<Flow> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Flow::Next(json!(n)))
    }
}

/// Answers directly with a canned reply
pub struct Halt {
    reply: Reply,
}

impl Halt {
    pub fn new(reply: Reply) -> Self {
        Self { reply }
    }
}

#[async_trait]
impl Middleware for Halt {
    fn name(&self) -> &str {
        "__halt"
    }

    async fn handle(&self, _ctx: &RequestContext, _results: &StackResults) -> anyhow::Result<Flow> {
        Ok(Flow::Respond(self.reply.clone()))
    }
}

/// Always errors
pub struct Fail {
    message: String,
}

impl Fail {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[async_trait]
impl Middleware for Fail {
    fn name(&self) -> &str {
        "__fail"
    }

    async fn handle(&self, _ctx: &RequestContext, _results: &StackResults) -> anyhow::Result<Flow> {
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// Panics when run
pub struct Explode {
    message: &'static str,
}

impl Explode {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

#[async_trait]
impl Middleware for Explode {
    fn name(&self) -> &str {
        "__explode"
    }

    async fn handle(&self, _ctx: &RequestContext, _results: &StackResults) -> anyhow::Result<Flow> {
        panic!("{}", self.message)
    }
}

/// Handler that does nothing; only its declared parameters matter
pub fn handler_with(signature: &str) -> HandlerDescriptor {
    HandlerDescriptor::new("stub", signature, |_| async { Ok(Value::Null) })
}

/// Handler that returns its merged input
pub fn echo_handler(signature: &str) -> HandlerDescriptor {
    HandlerDescriptor::new("echo", signature, |input: HandlerInput| async move {
        Ok(Value::Object(input.merged()))
    })
}

pub fn failing_handler(message: &'static str) -> HandlerDescriptor {
    HandlerDescriptor::new("failing", "()", move |_| async move { Err(anyhow::anyhow!(message)) })
}

pub fn panicking_handler(message: &'static str) -> HandlerDescriptor {
    HandlerDescriptor::new("panicking", "()", move |_| async move {
        if !message.is_empty() {
            panic!("{}", message);
        }
        Ok(Value::Null)
    })
}

/// Handler input as the dispatch engine would build it after `__longToken` ran
pub fn input_for_user(fields: Value, user_id: &str, role: Role, school_id: Option<&str>) -> HandlerInput {
    let claims = test_tokens().claims_for(user_id.to_string(), role, school_id.map(str::to_string));
    let mut injected = BTreeMap::new();
    injected.insert(LONG_TOKEN.to_string(), json!(claims));

    HandlerInput {
        fields: fields.as_object().cloned().unwrap_or_default(),
        injected,
    }
}

/// Input with optional `(role, school)` claims for a generic test user
pub fn input_with_claims(fields: Value, claims: Option<(Role, Option<String>)>) -> HandlerInput {
    match claims {
        Some((role, school)) => input_for_user(fields, "test-user", role, school.as_deref()),
        None => HandlerInput {
            fields: fields.as_object().cloned().unwrap_or_default(),
            injected: BTreeMap::new(),
        },
    }
}
