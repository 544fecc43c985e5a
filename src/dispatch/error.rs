use thiserror::Error;

/// Route resolution failures. All of them are terminal 404s produced before
/// any middleware runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("module not found")]
    ModuleNotFound,

    #[error("module has no exposed functions")]
    NoExposedFunctions,

    #[error("method not found")]
    MethodNotFound,

    #[error("handler not found")]
    HandlerNotFound,
}

/// Startup-time errors while building the module table
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("invalid exposure entry '{entry}' in module '{module}'")]
    InvalidExposure { module: String, entry: String },

    #[error("duplicate exposure '{verb}={name}' in module '{module}'")]
    DuplicateExposure { module: String, verb: String, name: String },

    #[error("module '{0}' registered twice")]
    DuplicateModule(String),
}
