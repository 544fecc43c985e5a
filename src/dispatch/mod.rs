//! Declarative request dispatch.
//!
//! Every API request is resolved to a handler on a registered module. The
//! handler's declared special parameters (`__name`) select which middlewares
//! run before it; each middleware's output is bound to the parameter of the
//! same name. Outcomes are normalized into one response envelope.

pub mod api;
pub mod context;
pub mod error;
pub mod executor;
pub mod params;
pub mod registry;
pub mod resolver;
pub mod response;
pub mod stack;

pub use api::ApiHandler;
pub use context::{HandlerInput, RequestContext, StackResults};
pub use error::{RegistrationError, ResolveError};
pub use executor::{classify, is_truthy, DispatchOutcome, StackExecutor};
pub use params::{is_special, param_names, special_params, SPECIAL_PREFIX};
pub use registry::{Flow, Injectable, Middleware, MiddlewareFactory, MiddlewareRegistry};
pub use resolver::{bind, ApiModule, Exposure, HandlerDescriptor, HandlerFn, ModuleTable};
pub use response::{Envelope, Reply, ResponseDispatcher};
pub use stack::{DispatchStack, StackBuilder, StackEntry};
