//! SQL text utilities: identifier quoting and the statement buffer.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{QueryError, QueryResult};
use crate::value::{Params, Value};

static PARAM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Allocate a process-unique parameter name (`:p1`, `:p2`, ...).
///
/// Uniqueness across the whole process lets sub-queries be compiled
/// independently and spliced into an outer statement without renaming.
pub fn next_param_name() -> String {
    format!(":p{}", PARAM_COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
}

/// Check an identifier for characters that could break out of quoting.
pub fn validate_identifier(name: &str) -> QueryResult<&str> {
    let forbidden = |c: char| matches!(c, '`' | '\\' | '\0' | '(' | ')');
    if name.is_empty() || name.chars().any(forbidden) {
        return Err(QueryError::invalid_identifier(name));
    }
    Ok(name)
}

/// Quote an identifier with backticks after validating it.
pub fn quote_identifier(name: &str) -> QueryResult<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name))
}

/// Quote `alias`.`column`.
pub fn quote_qualified(alias: &str, column: &str) -> QueryResult<String> {
    Ok(format!("{}.{}", quote_identifier(alias)?, quote_identifier(column)?))
}

/// A buffer for building one statement and its named parameters.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    sql: String,
    params: Params,
}

impl SqlBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a literal SQL string.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.sql.push_str(sql.as_ref());
        self
    }

    /// Push a placeholder and record its value.
    pub fn push_param(&mut self, value: impl Into<Value>) -> &mut Self {
        let name = next_param_name();
        self.sql.push_str(&name);
        self.params.push((name, value.into()));
        self
    }

    /// Push a quoted identifier.
    pub fn push_identifier(&mut self, name: &str) -> QueryResult<&mut Self> {
        let quoted = quote_identifier(name)?;
        self.sql.push_str(&quoted);
        Ok(self)
    }

    /// Splice in another fragment, taking over its parameters in order.
    pub fn append(&mut self, sql: &str, params: Params) -> &mut Self {
        self.sql.push_str(sql);
        self.params.extend(params);
        self
    }

    /// Add parameters referenced by text already pushed.
    pub fn extend_params(&mut self, params: impl IntoIterator<Item = (String, Value)>) -> &mut Self {
        self.params.extend(params);
        self
    }

    /// Get the current SQL string.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the current parameters.
    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    /// Build the final SQL string and parameters.
    pub fn build(self) -> (String, Params) {
        (self.sql, self.params)
    }
}
