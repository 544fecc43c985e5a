// Declarative field validation for entity inputs.
//
// A field model describes one input field (where it lives, its type, length
// bounds, an optional custom check). A rule set lists which models a method
// checks and which of them are required. Failures are reported as a list of
// `<model> <problem>` messages, e.g. `username too short`.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
}

#[derive(Clone, Copy)]
pub struct FieldModel {
    pub name: &'static str,
    /// Key of the field in the request fields
    pub path: &'static str,
    pub kind: FieldType,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub custom: Option<fn(&str) -> bool>,
}

impl FieldModel {
    const fn text(name: &'static str, path: &'static str, min: usize, max: usize) -> Self {
        Self {
            name,
            path,
            kind: FieldType::Text,
            min_len: Some(min),
            max_len: Some(max),
            custom: None,
        }
    }

    const fn with_custom(mut self, check: fn(&str) -> bool) -> Self {
        self.custom = Some(check);
        self
    }

    /// Check a present value. Custom checks replace the type and length checks.
    fn check(&self, value: &Value) -> Option<String> {
        if let Some(custom) = self.custom {
            let ok = value.as_str().is_some_and(custom);
            return (!ok).then(|| format!("{} invalid", self.name));
        }

        match self.kind {
            FieldType::Text => {
                let Some(text) = value.as_str() else {
                    return Some(format!("{} must be string", self.name));
                };
                let len = text.chars().count();
                if self.min_len.is_some_and(|min| len < min) {
                    return Some(format!("{} too short", self.name));
                }
                if self.max_len.is_some_and(|max| len > max) {
                    return Some(format!("{} too long", self.name));
                }
                None
            }
            FieldType::Number => (!value.is_number()).then(|| format!("{} must be number", self.name)),
        }
    }
}

impl std::fmt::Debug for FieldModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldModel")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("min_len", &self.min_len)
            .field("max_len", &self.max_len)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

fn valid_username(value: &str) -> bool {
    (3..=20).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain
            .rsplit_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
}

pub const USERNAME: FieldModel = FieldModel::text("username", "username", 3, 20).with_custom(valid_username);
pub const PASSWORD: FieldModel = FieldModel::text("password", "password", 8, 100);
pub const EMAIL: FieldModel = FieldModel::text("email", "email", 3, 100).with_custom(valid_email);
pub const SCHOOL_NAME: FieldModel = FieldModel::text("schoolName", "name", 2, 200);
pub const ADDRESS: FieldModel = FieldModel::text("address", "address", 5, 500);
pub const ROLE: FieldModel = FieldModel::text("role", "role", 3, 20);
pub const PHONE: FieldModel = FieldModel::text("phone", "phone", 7, 20);
pub const CAPACITY: FieldModel = FieldModel {
    name: "capacity",
    path: "capacity",
    kind: FieldType::Number,
    min_len: None,
    max_len: None,
    custom: None,
};

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub model: FieldModel,
    pub required: bool,
}

const fn required(model: FieldModel) -> Rule {
    Rule { model, required: true }
}

const fn optional(model: FieldModel) -> Rule {
    Rule { model, required: false }
}

/// Rule sets, one per validated entity method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSet {
    UserLogin,
    UserCreateUser,
    SchoolCreateSchool,
}

impl RuleSet {
    pub fn rules(&self) -> &'static [Rule] {
        const LOGIN: &[Rule] = &[required(USERNAME), required(PASSWORD)];
        const CREATE_USER: &[Rule] = &[required(USERNAME), required(PASSWORD), required(EMAIL), required(ROLE)];
        const CREATE_SCHOOL: &[Rule] = &[
            required(SCHOOL_NAME),
            required(ADDRESS),
            required(EMAIL),
            optional(PHONE),
            optional(CAPACITY),
        ];

        match self {
            RuleSet::UserLogin => LOGIN,
            RuleSet::UserCreateUser => CREATE_USER,
            RuleSet::SchoolCreateSchool => CREATE_SCHOOL,
        }
    }

    /// All problems found, or None when the data passes
    pub fn validate(&self, data: &Map<String, Value>) -> Option<Vec<String>> {
        let errors: Vec<String> = self
            .rules()
            .iter()
            .filter_map(|rule| {
                let value = data.get(rule.model.path);
                let missing = matches!(value, None | Some(Value::Null))
                    || value.and_then(Value::as_str).is_some_and(str::is_empty);

                if missing {
                    return rule.required.then(|| format!("{} required", rule.model.name));
                }
                value.and_then(|v| rule.model.check(v))
            })
            .collect();

        (!errors.is_empty()).then_some(errors)
    }
}
