//! Payload validation
//!
//! A [`ResourceSchema`] declares field rules for a resource type's
//! properties. Schemas are plain serde structs, so they can be embedded as
//! YAML next to a provider:
//!
//! ```yaml
//! fields:
//!   - name: displayName
//!     required: true
//!     kind: string
//!     max_length: 64
//!   - name: mode
//!     allowed_values: [All, Indexed]
//! allow_unknown: false
//! ```
//!
//! All violations are collected and reported together as one
//! [`EngineError::Validation`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Validator;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl FieldRule {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            required: true,
            kind,
            max_length: None,
            allowed_values: Vec::new(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    fn check(&self, value: Option<&Value>, errors: &mut Vec<(String, String)>) {
        let value = match value {
            None | Some(Value::Null) => {
                if self.required {
                    errors.push((self.name.clone(), "is required".to_string()));
                }
                return;
            }
            Some(v) => v,
        };

        if !self.kind.matches(value) {
            errors.push((
                self.name.clone(),
                format!("must be of type {}", self.kind.as_str()),
            ));
            return;
        }

        if let Some(max) = self.max_length {
            let len = match value {
                Value::String(s) => Some(s.chars().count()),
                Value::Array(a) => Some(a.len()),
                _ => None,
            };
            if matches!(len, Some(l) if l > max) {
                errors.push((
                    self.name.clone(),
                    format!("must be at most {} long", max),
                ));
            }
        }

        if !self.allowed_values.is_empty() {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !self.allowed_values.iter().any(|a| *a == rendered) {
                errors.push((
                    self.name.clone(),
                    format!("must be one of {}", self.allowed_values.join(", ")),
                ));
            }
        }
    }
}

fn default_allow_unknown() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSchema {
    #[serde(default)]
    pub fields: Vec<FieldRule>,
    #[serde(default = "default_allow_unknown")]
    pub allow_unknown: bool,
}

impl Default for ResourceSchema {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            allow_unknown: true,
        }
    }
}

impl ResourceSchema {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self {
            fields,
            allow_unknown: true,
        }
    }

    pub fn strict(mut self) -> Self {
        self.allow_unknown = false;
        self
    }

    pub fn from_yaml(content: &str) -> EngineResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| EngineError::validation(format!("schema: {}", e)))
    }

    /// Every violation in `payload`, as `(field, reason)` pairs.
    pub fn violations(&self, payload: &Value) -> Vec<(String, String)> {
        let mut errors = Vec::new();

        let empty = serde_json::Map::new();
        let object = match payload {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                errors.push(("properties".to_string(), "must be an object".to_string()));
                return errors;
            }
        };

        for rule in &self.fields {
            rule.check(object.get(&rule.name), &mut errors);
        }

        if !self.allow_unknown {
            for key in object.keys() {
                if !self.fields.iter().any(|f| f.name == *key) {
                    errors.push((key.clone(), "is not a recognized field".to_string()));
                }
            }
        }

        errors
    }
}

/// [`Validator`] backed by a [`ResourceSchema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    schema: ResourceSchema,
}

impl SchemaValidator {
    pub fn new(schema: ResourceSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }
}

impl Validator for SchemaValidator {
    fn validate(&self, payload: &Value) -> EngineResult<()> {
        let violations = self.schema.violations(payload);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::from_field_errors(violations))
        }
    }
}
