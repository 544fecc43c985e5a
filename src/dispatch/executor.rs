use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::Instrument;

use super::context::{HandlerInput, RequestContext, StackResults};
use super::params::special_params;
use super::registry::Flow;
use super::resolver::HandlerDescriptor;
use super::response::Reply;
use super::stack::DispatchStack;

/// How a dispatched request ended
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Handler result with no error marker, returned as `data`
    Success(Value),
    /// Handler returned a truthy `error` or `errors`; carried as the envelope `errors`
    BusinessError(Value),
    /// Middleware error or handler failure
    Fault(String),
    /// A middleware answered directly
    Halted(Reply),
}

/// JavaScript-style truthiness, which is how handler error markers are read
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Decide between success and business error for a handler result
pub fn classify(result: Value) -> DispatchOutcome {
    if let Value::Object(map) = &result {
        if let Some(error) = map.get("error").filter(|v| is_truthy(v)) {
            return DispatchOutcome::BusinessError(error.clone());
        }
        if let Some(errors) = map.get("errors").filter(|v| is_truthy(v)) {
            return DispatchOutcome::BusinessError(errors.clone());
        }
    }
    DispatchOutcome::Success(result)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Runs a dispatch stack and then the handler
#[derive(Debug, Clone, Copy, Default)]
pub struct StackExecutor;

impl StackExecutor {
    pub async fn run(
        &self,
        handler: &HandlerDescriptor,
        stack: &DispatchStack,
        ctx: &RequestContext,
    ) -> DispatchOutcome {
        let span = tracing::info_span!(
            "dispatch",
            request_id = %ctx.request_id,
            module = %ctx.module_name,
            function = %ctx.fn_name,
        );

        self.run_inner(handler, stack, ctx).instrument(span).await
    }

    async fn run_inner(
        &self,
        handler: &HandlerDescriptor,
        stack: &DispatchStack,
        ctx: &RequestContext,
    ) -> DispatchOutcome {
        let mut results = StackResults::default();

        for entry in &stack.entries {
            let step = AssertUnwindSafe(entry.middleware.handle(ctx, &results))
                .catch_unwind()
                .await;

            match step {
                Ok(Ok(Flow::Next(value))) => results.push(entry.slot.clone(), value),
                Ok(Ok(Flow::Respond(reply))) => {
                    tracing::debug!(
                        "Middleware {} halted the stack with {}",
                        entry.slot,
                        reply.status
                    );
                    return DispatchOutcome::Halted(reply);
                }
                Ok(Err(e)) => {
                    tracing::error!("Middleware {} failed: {:#}", entry.slot, e);
                    return DispatchOutcome::Fault(e.to_string());
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!("Middleware {} panicked: {}", entry.slot, message);
                    return DispatchOutcome::Fault(message);
                }
            }
        }

        let specials = special_params(&handler.params);
        let input = HandlerInput::assemble(ctx, &specials, &results);

        let call = (handler.call)(input);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(result)) => {
                let outcome = classify(result);
                if let DispatchOutcome::BusinessError(errors) = &outcome {
                    tracing::debug!("Handler {} returned business error: {}", handler.name, errors);
                }
                outcome
            }
            Ok(Err(e)) => {
                tracing::error!("Handler {} failed: {:#}", handler.name, e);
                DispatchOutcome::Fault(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("Handler {} panicked: {}", handler.name, message);
                DispatchOutcome::Fault(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::response::Envelope;
    use crate::dispatch::stack::StackEntry;
    use crate::testing::{echo_handler, Counter, Explode, Fail, Halt, Tag};
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use std::sync::Arc;

    fn entry<M: crate::dispatch::Middleware + 'static>(slot: &str, middleware: M) -> StackEntry {
        StackEntry {
            slot: slot.to_string(),
            middleware: Arc::new(middleware),
        }
    }

    fn stack(entries: Vec<StackEntry>) -> DispatchStack {
        DispatchStack { entries }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::POST, "m", "f")
            .with_body(json!({"a": 1}).as_object().cloned().unwrap())
    }

    #[test]
    fn truthiness_matches_loose_semantics() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!(0.0)] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("x"), json!([]), json!({})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn error_marker_takes_precedence_over_errors() {
        assert_eq!(
            classify(json!({"error": "a", "errors": ["b"]})),
            DispatchOutcome::BusinessError(json!("a"))
        );
        assert_eq!(
            classify(json!({"error": "", "errors": ["b"]})),
            DispatchOutcome::BusinessError(json!(["b"]))
        );
        assert_eq!(
            classify(json!({"error": false, "name": "x"})),
            DispatchOutcome::Success(json!({"error": false, "name": "x"}))
        );
        assert_eq!(classify(json!(null)), DispatchOutcome::Success(json!(null)));
    }

    #[tokio::test]
    async fn injected_values_reach_the_handler_by_name() {
        let handler = echo_handler("({ a, __x, __y })");
        let stack = stack(vec![
            entry("__pre", Tag::new("__pre", json!("p"))),
            entry("__x", Tag::new("__x", json!("vx"))),
            entry("__y", Tag::new("__y", json!({"id": 7}))),
        ]);

        let outcome = StackExecutor.run(&handler, &stack, &ctx()).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Success(json!({"a": 1, "__x": "vx", "__y": {"id": 7}}))
        );
    }

    #[tokio::test]
    async fn halting_middleware_stops_everything_after_it() {
        let after = Counter::new("__after");
        let handler_calls = Counter::new("__handler");
        let handler = handler_calls.handler("(__guard, __after)");
        let reply = Reply::new(StatusCode::FORBIDDEN, Envelope::failure(json!("nope")));

        let stack = stack(vec![
            entry("__guard", Halt::new(reply.clone())),
            entry("__after", after.clone()),
        ]);

        let outcome = StackExecutor.run(&handler, &stack, &ctx()).await;
        assert_eq!(outcome, DispatchOutcome::Halted(reply));
        assert_eq!(after.count(), 0);
        assert_eq!(handler_calls.count(), 0);
    }

    #[tokio::test]
    async fn middleware_error_is_a_fault_and_skips_the_handler() {
        let handler_calls = Counter::new("__handler");
        let handler = handler_calls.handler("(__broken)");
        let stack = stack(vec![entry("__broken", Fail::new("store down"))]);

        let outcome = StackExecutor.run(&handler, &stack, &ctx()).await;
        assert_eq!(outcome, DispatchOutcome::Fault("store down".into()));
        assert_eq!(handler_calls.count(), 0);
    }

    #[tokio::test]
    async fn middleware_panic_is_a_fault_and_skips_the_rest() {
        let after = Counter::new("__after");
        let handler_calls = Counter::new("__handler");
        let handler = handler_calls.handler("(__exploding, __after)");
        let stack = stack(vec![
            entry("__exploding", Explode::new("middleware exploded")),
            entry("__after", after.clone()),
        ]);

        let outcome = StackExecutor.run(&handler, &stack, &ctx()).await;
        assert_eq!(outcome, DispatchOutcome::Fault("middleware exploded".into()));
        assert_eq!(after.count(), 0);
        assert_eq!(handler_calls.count(), 0);
    }

    #[tokio::test]
    async fn each_middleware_runs_once_per_request() {
        let first = Counter::new("__first");
        let second = Counter::new("__second");
        let handler = echo_handler("(__first, __second)");
        let stack = stack(vec![
            entry("__first", first.clone()),
            entry("__second", second.clone()),
        ]);

        StackExecutor.run(&handler, &stack, &ctx()).await;
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
    }

    #[tokio::test]
    async fn handler_failures_become_faults() {
        let failing = crate::testing::failing_handler("boom");
        let outcome = StackExecutor.run(&failing, &DispatchStack::default(), &ctx()).await;
        assert_eq!(outcome, DispatchOutcome::Fault("boom".into()));

        let panicking = crate::testing::panicking_handler("kaboom");
        let outcome = StackExecutor.run(&panicking, &DispatchStack::default(), &ctx()).await;
        assert_eq!(outcome, DispatchOutcome::Fault("kaboom".into()));
    }
}
