use std::sync::Arc;

use crate::error::ApiError;

use super::context::RequestContext;
use super::executor::StackExecutor;
use super::resolver::ModuleTable;
use super::response::{Reply, ResponseDispatcher};
use super::stack::StackBuilder;

/// The single entry point every `/api/:module/:fn` request goes through
#[derive(Clone)]
pub struct ApiHandler {
    modules: Arc<ModuleTable>,
    stacks: StackBuilder,
    executor: StackExecutor,
    responses: ResponseDispatcher,
}

impl ApiHandler {
    pub fn new(modules: ModuleTable, stacks: StackBuilder) -> Self {
        Self {
            modules: Arc::new(modules),
            stacks,
            executor: StackExecutor,
            responses: ResponseDispatcher,
        }
    }

    pub fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    pub async fn handle(&self, ctx: RequestContext) -> Reply {
        let handler = match self.modules.resolve(&ctx.module_name, &ctx.fn_name, &ctx.method) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::debug!(
                    "Unresolved {} /api/{}/{}: {}",
                    ctx.method,
                    ctx.module_name,
                    ctx.fn_name,
                    e
                );
                return ApiError::from(e).into_reply();
            }
        };

        let stack = self.stacks.build(&handler);
        let outcome = self.executor.run(&handler, &stack, &ctx).await;
        self.responses.reply(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ApiModule, Injectable, Middleware, MiddlewareRegistry};
    use crate::testing::{test_injectable, Counter};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn handler() -> ApiHandler {
        let module = ApiModule::new("demo")
            .exposed(["post=create", "get=fail"])
            .unwrap()
            .handler("create", "({ name })", |input| async move {
                match input.text("name") {
                    Some(name) => Ok(json!({ "name": name })),
                    None => Ok(json!({ "error": "name required" })),
                }
            })
            .handler("fail", "()", |_| async { Err(anyhow::anyhow!("database offline")) });

        let mut modules = ModuleTable::new();
        modules.register(module).unwrap();
        let stacks = StackBuilder::new(Arc::new(MiddlewareRegistry::new()), test_injectable());
        ApiHandler::new(modules, stacks)
    }

    fn request(method: Method, module: &str, func: &str, body: serde_json::Value) -> RequestContext {
        RequestContext::new(method, module, func).with_body(body.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn routes_outcomes_to_the_envelope() {
        let api = handler();

        let ok = api.handle(request(Method::POST, "demo", "create", json!({"name": "x"}))).await;
        assert_eq!(ok.status, StatusCode::OK);
        assert_eq!(ok.envelope.data, Some(json!({"name": "x"})));

        let business = api.handle(request(Method::POST, "demo", "create", json!({}))).await;
        assert_eq!(business.status, StatusCode::BAD_REQUEST);
        assert_eq!(business.envelope.errors, Some(json!("name required")));

        let fault = api.handle(request(Method::GET, "demo", "fail", json!({}))).await;
        assert_eq!(fault.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fault.envelope.errors, Some(json!("database offline")));
    }

    #[tokio::test]
    async fn resolution_failures_are_not_found() {
        let api = handler();
        let reply = api.handle(request(Method::GET, "demo", "create", json!({}))).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.envelope.errors, Some(json!("method not found")));

        let reply = api.handle(request(Method::GET, "ghost", "create", json!({}))).await;
        assert_eq!(reply.envelope.errors, Some(json!("module not found")));
    }

    #[tokio::test]
    async fn unresolved_requests_never_reach_the_stack() {
        let spy = Counter::new("__spy");
        let mut registry = MiddlewareRegistry::new();
        let registered = spy.clone();
        registry.register("__spy", move |_: &Injectable| Arc::new(registered.clone()) as Arc<dyn Middleware>);

        let module = ApiModule::new("demo")
            .exposed(["post=create"])
            .unwrap()
            .handler("create", "({ __spy, name })", |_| async { Ok(json!("created")) });
        let mut modules = ModuleTable::new();
        modules.register(module).unwrap();

        let stacks = StackBuilder::new(Arc::new(registry), test_injectable()).with_pre_stack(vec!["__spy".into()]);
        let api = ApiHandler::new(modules, stacks);

        let reply = api.handle(request(Method::DELETE, "demo", "create", json!({}))).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(spy.count(), 0);

        let reply = api.handle(request(Method::POST, "demo", "create", json!({}))).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(spy.count(), 2);
    }
}
