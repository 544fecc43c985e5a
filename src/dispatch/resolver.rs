use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::context::HandlerInput;
use super::error::{RegistrationError, ResolveError};
use super::params::param_names;

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;
pub type HandlerFn = Arc<dyn Fn(HandlerInput) -> HandlerFuture + Send + Sync>;

/// A callable business method plus its declared parameter list
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub name: String,
    pub params: Vec<String>,
    pub call: HandlerFn,
}

impl HandlerDescriptor {
    /// Parameters are read from a declared signature such as
    /// `"({ schoolId, name, __longToken, __isSchoolAdmin })"`.
    pub fn new<F, Fut>(name: impl Into<String>, signature: &str, f: F) -> Self
    where
        F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::with_params(name, param_names(signature), f)
    }

    pub fn with_params<F, Fut>(name: impl Into<String>, params: Vec<String>, f: F) -> Self
    where
        F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            params,
            call: Arc::new(move |input| f(input).boxed()),
        }
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// Adapt an async method on a shared module into a handler closure
pub fn bind<M, F, Fut>(target: &Arc<M>, f: F) -> impl Fn(HandlerInput) -> Fut + Send + Sync + 'static
where
    M: Send + Sync + 'static,
    F: Fn(Arc<M>, HandlerInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    let target = Arc::clone(target);
    move |input| f(Arc::clone(&target), input)
}

/// One `verb=name` exposure entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exposure {
    pub verb: String,
    pub name: String,
}

impl Exposure {
    /// Parse `"post=createSchool"`. A missing verb means `get`.
    pub fn parse(entry: &str) -> Option<Self> {
        let (verb, name) = match entry.split_once('=') {
            Some((verb, name)) => (verb.trim(), name.trim()),
            None => ("", entry.trim()),
        };

        if name.is_empty() || name.contains('=') {
            return None;
        }

        let verb = if verb.is_empty() {
            "get".to_string()
        } else {
            verb.to_ascii_lowercase()
        };

        Some(Self {
            verb,
            name: name.to_string(),
        })
    }

    pub fn matches(&self, method: &Method, fn_name: &str) -> bool {
        self.name == fn_name && method.as_str().eq_ignore_ascii_case(&self.verb)
    }
}

/// A named module: its exposure table and its handlers
#[derive(Debug, Clone)]
pub struct ApiModule {
    name: String,
    /// None until `exposed()` is called; an empty list is still a list
    exposures: Option<Vec<Exposure>>,
    handlers: HashMap<String, HandlerDescriptor>,
}

impl ApiModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exposures: None,
            handlers: HashMap::new(),
        }
    }

    /// Declare the exposure table. Each (verb, name) pair may appear once.
    pub fn exposed<I, S>(mut self, entries: I) -> Result<Self, RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exposures = self.exposures.take().unwrap_or_default();
        let mut seen: HashSet<(String, String)> =
            exposures.iter().map(|e| (e.verb.clone(), e.name.clone())).collect();

        for entry in entries {
            let entry = entry.as_ref();
            let exposure = Exposure::parse(entry).ok_or_else(|| RegistrationError::InvalidExposure {
                module: self.name.clone(),
                entry: entry.to_string(),
            })?;

            if !seen.insert((exposure.verb.clone(), exposure.name.clone())) {
                return Err(RegistrationError::DuplicateExposure {
                    module: self.name.clone(),
                    verb: exposure.verb,
                    name: exposure.name,
                });
            }
            exposures.push(exposure);
        }

        self.exposures = Some(exposures);
        Ok(self)
    }

    pub fn handler<F, Fut>(self, name: &str, signature: &str, f: F) -> Self
    where
        F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.with_handler(HandlerDescriptor::new(name, signature, f))
    }

    pub fn with_handler(mut self, descriptor: HandlerDescriptor) -> Self {
        self.handlers.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exposures(&self) -> &[Exposure] {
        self.exposures.as_deref().unwrap_or_default()
    }

    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    fn lookup(&self, name: &str) -> Option<&HandlerDescriptor> {
        self.handlers.get(name)
    }
}

/// Every registered module, keyed by route name
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    modules: HashMap<String, ApiModule>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: ApiModule) -> Result<&mut Self, RegistrationError> {
        if self.modules.contains_key(module.name()) {
            return Err(RegistrationError::DuplicateModule(module.name.clone()));
        }

        for exposure in module.exposures() {
            if module.lookup(&exposure.name).is_none() {
                tracing::warn!(
                    "Module '{}' exposes '{}={}' with no handler",
                    module.name,
                    exposure.verb,
                    exposure.name
                );
            }
        }

        tracing::info!(
            "Registered module '{}' with {} exposed functions",
            module.name,
            module.exposures().len()
        );
        self.modules.insert(module.name.clone(), module);
        Ok(self)
    }

    pub fn module(&self, name: &str) -> Option<&ApiModule> {
        self.modules.get(name)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Map a (module, function, verb) triple to the handler to run.
    pub fn resolve(
        &self,
        module_name: &str,
        fn_name: &str,
        method: &Method,
    ) -> Result<HandlerDescriptor, ResolveError> {
        let module = self.modules.get(module_name).ok_or(ResolveError::ModuleNotFound)?;

        let exposures = module.exposures.as_ref().ok_or(ResolveError::NoExposedFunctions)?;

        let exposure = exposures
            .iter()
            .find(|e| e.matches(method, fn_name))
            .ok_or(ResolveError::MethodNotFound)?;

        // Exposed name first, then the route's function name.
        // The two are equal whenever an exposure matched, so the second lookup
        // only matters if matching ever becomes looser than exact equality.
        module
            .lookup(&exposure.name)
            .or_else(|| module.lookup(fn_name))
            .cloned()
            .ok_or(ResolveError::HandlerNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ping_module() -> ApiModule {
        ApiModule::new("demo")
            .exposed(["post=createThing", "GET=listThings", "ping", "delete=orphan"])
            .unwrap()
            .handler("createThing", "({ name, __longToken })", |_| async { Ok(json!("created")) })
            .handler("listThings", "({ page, limit })", |_| async { Ok(json!([])) })
            .handler("ping", "()", |_| async { Ok(json!("pong")) })
    }

    fn table() -> ModuleTable {
        let mut table = ModuleTable::new();
        table.register(ping_module()).unwrap();
        table.register(ApiModule::new("unexposed")).unwrap();
        table
            .register(ApiModule::new("empty").exposed(Vec::<&str>::new()).unwrap())
            .unwrap();
        table
    }

    #[test]
    fn exposure_entries_parse_with_default_verb() {
        assert_eq!(
            Exposure::parse("PUT=updateThing"),
            Some(Exposure { verb: "put".into(), name: "updateThing".into() })
        );
        assert_eq!(Exposure::parse("ping").unwrap().verb, "get");
        assert_eq!(Exposure::parse("=ping").unwrap().verb, "get");
        assert_eq!(Exposure::parse("post="), None);
        assert_eq!(Exposure::parse("a=b=c"), None);
    }

    #[test]
    fn resolves_with_case_insensitive_verbs() {
        let table = table();
        let handler = table.resolve("demo", "createThing", &Method::POST).unwrap();
        assert_eq!(handler.name, "createThing");
        assert_eq!(handler.params, vec!["name", "__longToken"]);

        assert!(table.resolve("demo", "listThings", &Method::GET).is_ok());
        assert!(table.resolve("demo", "ping", &Method::GET).is_ok());
    }

    #[test]
    fn failure_modes_are_distinct() {
        let table = table();
        assert_eq!(
            table.resolve("nope", "x", &Method::GET).unwrap_err(),
            ResolveError::ModuleNotFound
        );
        assert_eq!(
            table.resolve("unexposed", "x", &Method::GET).unwrap_err(),
            ResolveError::NoExposedFunctions
        );
        // An empty exposure list is still a list
        assert_eq!(
            table.resolve("empty", "x", &Method::GET).unwrap_err(),
            ResolveError::MethodNotFound
        );
        assert_eq!(
            table.resolve("demo", "createThing", &Method::GET).unwrap_err(),
            ResolveError::MethodNotFound
        );
        assert_eq!(
            table.resolve("demo", "unknown", &Method::POST).unwrap_err(),
            ResolveError::MethodNotFound
        );
        assert_eq!(
            table.resolve("demo", "orphan", &Method::DELETE).unwrap_err(),
            ResolveError::HandlerNotFound
        );
    }

    #[test]
    fn duplicate_registrations_are_rejected() {
        let err = ApiModule::new("m").exposed(["get=a", "GET=a"]).unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateExposure { .. }));

        // same name on a different verb is fine
        assert!(ApiModule::new("m").exposed(["get=a", "post=a"]).is_ok());

        let mut table = table();
        assert_eq!(
            table.register(ApiModule::new("demo")).unwrap_err(),
            RegistrationError::DuplicateModule("demo".into())
        );
    }

    #[tokio::test]
    async fn bound_methods_receive_their_module() {
        struct Greeter {
            greeting: String,
        }

        impl Greeter {
            async fn greet(&self, input: HandlerInput) -> anyhow::Result<Value> {
                let name = input.text("name").unwrap_or_default();
                Ok(json!(format!("{}, {}", self.greeting, name)))
            }
        }

        let greeter = Arc::new(Greeter { greeting: "hello".into() });
        let descriptor = HandlerDescriptor::new(
            "greet",
            "({ name })",
            bind(&greeter, |g, input| async move { g.greet(input).await }),
        );

        let mut input = HandlerInput::default();
        input.fields.insert("name".into(), json!("ada"));
        assert_eq!((descriptor.call)(input).await.unwrap(), json!("hello, ada"));
    }
}
