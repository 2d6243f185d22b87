//! Record validation results and validators.
//!
//! Validation failures are data, not errors: a failed `save()` returns
//! `Ok(false)` and leaves a [`ValidationErrors`] map on the record.

use indexmap::IndexMap;
use regex_lite::Regex;
use serde::Serialize;
use std::fmt;

use crate::error::{QueryError, QueryResult};
use crate::record::Record;
use crate::value::Value;

/// Validation failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationCode {
    /// A required column is unset or empty.
    Required,
    /// A text value exceeds the column length.
    Length,
    /// A unique group already exists in storage.
    Unique,
    /// Saving a related record failed.
    Relational,
    /// A declared validator rejected the value.
    Invalid,
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Required => "required",
            Self::Length => "length",
            Self::Unique => "unique",
            Self::Relational => "relational",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Failure kind.
    pub code: ValidationCode,
    /// Human-readable description.
    pub description: String,
    /// Extra data, e.g. the nested errors of a relational failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ValidationError {
    /// Create a validation error.
    pub fn new(code: ValidationCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            data: None,
        }
    }

    /// Attach extra data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Validation failures keyed by column or relation name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: IndexMap<String, ValidationError>,
}

impl ValidationErrors {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. The first failure per property wins.
    pub fn add(&mut self, property: impl Into<String>, error: ValidationError) {
        self.errors.entry(property.into()).or_insert(error);
    }

    /// Failure for a property.
    pub fn get(&self, property: &str) -> Option<&ValidationError> {
        self.errors.get(property)
    }

    /// Whether a property failed.
    pub fn contains(&self, property: &str) -> bool {
        self.errors.contains_key(property)
    }

    /// No failures.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of failing properties.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterate failures in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ValidationError)> {
        self.errors.iter()
    }

    /// Remove all failures.
    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// JSON form, used as data of relational failures.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A per-column validation rule.
///
/// Null values are never passed in; the required check covers them.
pub trait Validator: Send + Sync {
    /// Check a value. `record` gives access to the other columns.
    fn validate(&self, value: &Value, record: &Record) -> Result<(), ValidationError>;
}

/// Accepts syntactically valid e-mail addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailValidator;

impl EmailValidator {
    fn is_valid(address: &str) -> bool {
        if address.chars().any(char::is_whitespace) {
            return false;
        }
        match address.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain
                        .split_once('.')
                        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
            }
            None => false,
        }
    }
}

impl Validator for EmailValidator {
    fn validate(&self, value: &Value, _record: &Record) -> Result<(), ValidationError> {
        match value.as_str() {
            Some(s) if Self::is_valid(s) => Ok(()),
            _ => Err(ValidationError::new(ValidationCode::Invalid, "Invalid e-mail address")),
        }
    }
}

/// Accepts strings matching a pattern.
#[derive(Debug, Clone)]
pub struct RegexValidator {
    pattern: Regex,
    description: String,
}

impl RegexValidator {
    /// Compile the pattern. Fails on an invalid expression.
    pub fn new(pattern: &str, description: impl Into<String>) -> QueryResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| QueryError::configuration(format!("invalid validator pattern: {}", e)))?;
        Ok(Self {
            pattern,
            description: description.into(),
        })
    }
}

impl Validator for RegexValidator {
    fn validate(&self, value: &Value, _record: &Record) -> Result<(), ValidationError> {
        let text = value.to_string();
        if self.pattern.is_match(&text) {
            Ok(())
        } else {
            Err(ValidationError::new(ValidationCode::Invalid, self.description.clone()))
        }
    }
}

/// Accepts numbers within an inclusive range.
#[derive(Debug, Clone, Copy)]
pub struct RangeValidator {
    min: Option<f64>,
    max: Option<f64>,
}

impl RangeValidator {
    /// Inclusive bounds; `None` leaves a side open.
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }
}

impl Validator for RangeValidator {
    fn validate(&self, value: &Value, _record: &Record) -> Result<(), ValidationError> {
        let number = match value {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            _ => return Err(ValidationError::new(ValidationCode::Invalid, "Not a number")),
        };
        let below = self.min.is_some_and(|min| number < min);
        let above = self.max.is_some_and(|max| number > max);
        if below || above {
            return Err(ValidationError::new(ValidationCode::Invalid, "Value out of range")
                .with_data(serde_json::json!({ "min": self.min, "max": self.max })));
        }
        Ok(())
    }
}
