use std::sync::Arc;

use super::params::special_params;
use super::registry::{Injectable, Middleware, MiddlewareRegistry};
use super::resolver::HandlerDescriptor;

/// One resolved middleware and the slot its output is recorded under
#[derive(Clone)]
pub struct StackEntry {
    pub slot: String,
    pub middleware: Arc<dyn Middleware>,
}

impl std::fmt::Debug for StackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackEntry")
            .field("slot", &self.slot)
            .field("middleware", &self.middleware.name())
            .finish()
    }
}

/// Ordered middlewares for one handler invocation
#[derive(Debug, Clone, Default)]
pub struct DispatchStack {
    pub entries: Vec<StackEntry>,
}

impl DispatchStack {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn slots(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.slot.as_str()).collect()
    }
}

/// Computes the middleware chain from a handler's declared parameters:
/// the pre-stage names first, then one entry per special parameter in
/// declaration order. Names with no registered factory are skipped.
#[derive(Clone)]
pub struct StackBuilder {
    pre_stack: Vec<String>,
    registry: Arc<MiddlewareRegistry>,
    injectable: Injectable,
}

impl StackBuilder {
    pub fn new(registry: Arc<MiddlewareRegistry>, injectable: Injectable) -> Self {
        Self {
            pre_stack: Vec::new(),
            registry,
            injectable,
        }
    }

    /// Middlewares that run first for every handler dispatched through this builder
    pub fn with_pre_stack(mut self, pre_stack: Vec<String>) -> Self {
        self.pre_stack = pre_stack;
        self
    }

    pub fn pre_stack(&self) -> &[String] {
        &self.pre_stack
    }

    pub fn build(&self, handler: &HandlerDescriptor) -> DispatchStack {
        let specials = special_params(&handler.params);

        let entries = self
            .pre_stack
            .iter()
            .chain(specials.iter())
            .filter_map(|name| match self.registry.resolve(name, &self.injectable) {
                Some(middleware) => Some(StackEntry {
                    slot: name.clone(),
                    middleware,
                }),
                None => {
                    tracing::trace!("No middleware registered for '{}' (handler {})", name, handler.name);
                    None
                }
            })
            .collect();

        DispatchStack { entries }
    }
}
