use std::collections::BTreeMap;

use axum::http::{HeaderMap, Method};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::params::is_special;

/// Everything the dispatch engine knows about one inbound request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: Method,
    pub module_name: String,
    pub fn_name: String,
    pub headers: HeaderMap,
    pub query: Map<String, Value>,
    pub body: Map<String, Value>,
}

impl RequestContext {
    pub fn new(method: Method, module_name: impl Into<String>, fn_name: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method,
            module_name: module_name.into(),
            fn_name: fn_name.into(),
            headers: HeaderMap::new(),
            query: Map::new(),
            body: Map::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Query fields overlaid by body fields. Client-supplied special names
    /// are dropped so they can never masquerade as middleware output.
    pub fn merged_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        for (key, value) in self.query.iter().chain(self.body.iter()) {
            if is_special(key) {
                continue;
            }
            fields.insert(key.clone(), value.clone());
        }
        fields
    }
}

/// Ordered outputs of the middlewares that have run so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackResults {
    values: Vec<(String, Value)>,
}

impl StackResults {
    pub fn push(&mut self, slot: impl Into<String>, value: Value) {
        self.values.push((slot.into(), value));
    }

    /// Latest value produced under `slot`
    pub fn get(&self, slot: &str) -> Option<&Value> {
        self.values.iter().rev().find(|(s, _)| s == slot).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(s, v)| (s.as_str(), v))
    }
}

/// The single argument every handler receives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerInput {
    /// Merged query and body fields (non-special parameters)
    pub fields: Map<String, Value>,
    /// Special parameter name to middleware output
    pub injected: BTreeMap<String, Value>,
}

impl HandlerInput {
    /// Bind each declared special parameter to the value its middleware
    /// produced. Parameters without a resolved middleware stay absent.
    pub fn assemble(ctx: &RequestContext, specials: &[String], results: &StackResults) -> Self {
        let injected = specials
            .iter()
            .filter_map(|name| results.get(name).map(|v| (name.clone(), v.clone())))
            .collect();

        Self {
            fields: ctx.merged_fields(),
            injected,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// True when the client sent the field at all, even as null
    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Non-empty string field
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Numeric field; numeric strings (from the query string) are accepted
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Leading-integer parse in the manner of query string paging params
    pub fn int_or(&self, key: &str, default: i64) -> i64 {
        let parsed = match self.fields.get(key) {
            Some(Value::Number(n)) => n.as_f64().map(|f| f.trunc() as i64),
            Some(Value::String(s)) => {
                let s = s.trim();
                let end = s
                    .char_indices()
                    .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
                    .map(|(i, c)| i + c.len_utf8())
                    .last()
                    .unwrap_or(0);
                s[..end].parse().ok()
            }
            _ => None,
        };
        parsed.unwrap_or(default)
    }

    pub fn injected(&self, name: &str) -> Option<&Value> {
        self.injected.get(name)
    }

    /// Fields overlaid with injected values, the flat view of the input
    pub fn merged(&self) -> Map<String, Value> {
        let mut merged = self.fields.clone();
        for (name, value) in &self.injected {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}
