//! Table and column metadata.
//!
//! A [`Table`] describes one database table. Columns know how to move values
//! between the application representation ([`Column::normalize`]), the driver
//! representation ([`Column::to_db`]) and back ([`Column::from_db`]).

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    BigInt,
    /// Boolean, stored as an integer by most drivers.
    Bool,
    /// Floating point.
    Float,
    /// Fixed-point decimal, handled as a float.
    Decimal,
    /// Text of optional maximum length.
    Text,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// Binary blob.
    Binary,
    /// JSON document stored as text.
    Json,
}

impl ColumnType {
    /// Integer and floating point types.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::BigInt | Self::Float | Self::Decimal)
    }

    /// Types whose "unset" state is null rather than empty.
    ///
    /// For these the required check only rejects null.
    pub fn is_unset_only(&self) -> bool {
        self.is_numeric() || matches!(self, Self::Bool | Self::Date | Self::DateTime | Self::Binary)
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Metadata for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub db_type: ColumnType,
    /// Maximum length for text columns.
    pub length: Option<usize>,
    /// NOT NULL without a default.
    pub required: bool,
    /// Default applied to new records.
    pub default: Option<Value>,
    /// Unique group. Columns sharing a group name are unique together.
    pub unique: Option<String>,
    /// Part of the primary key.
    pub primary: bool,
    /// Filled by the database on insert.
    pub auto_increment: bool,
}

impl Column {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, db_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            db_type,
            length: None,
            required: false,
            default: None,
            unique: None,
            primary: false,
            auto_increment: false,
        }
    }

    /// An auto-increment integer primary key.
    pub fn id(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Int).primary().auto_increment()
    }

    /// An integer column.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Int)
    }

    /// A text column with a maximum length.
    pub fn text(name: impl Into<String>, length: usize) -> Self {
        Self::new(name, ColumnType::Text).length(length)
    }

    /// A boolean column.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Bool)
    }

    /// A date-time column.
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::DateTime)
    }

    /// Set the maximum length.
    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Mark the column NOT NULL.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Add the column to a unique group.
    pub fn unique(mut self, group: impl Into<String>) -> Self {
        self.unique = Some(group.into());
        self
    }

    /// Mark as part of the primary key.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Mark as auto-increment.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Cast an application value to this column's typed representation.
    ///
    /// Empty strings become null for every non-text type.
    pub fn normalize(&self, value: Value) -> QueryResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if matches!(&value, Value::String(s) if s.is_empty()) && self.db_type != ColumnType::Text {
            return Ok(Value::Null);
        }
        let invalid = |v: &Value| {
            QueryError::invalid_data(&self.name, format!("cannot convert {} to {:?}", v, self.db_type))
        };
        let out = match (self.db_type, value) {
            (ColumnType::Int | ColumnType::BigInt, v) => match v.as_i64() {
                Some(i) => Value::Int(i),
                None => return Err(invalid(&v)),
            },
            (ColumnType::Bool, Value::Bool(b)) => Value::Bool(b),
            (ColumnType::Bool, Value::Int(i)) => Value::Bool(i != 0),
            (ColumnType::Bool, Value::String(s)) => match s.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Value::Bool(true),
                "0" | "false" | "no" | "off" => Value::Bool(false),
                _ => return Err(invalid(&Value::String(s))),
            },
            (ColumnType::Float | ColumnType::Decimal, Value::Float(f)) => Value::Float(f),
            (ColumnType::Float | ColumnType::Decimal, Value::Int(i)) => Value::Float(i as f64),
            (ColumnType::Float | ColumnType::Decimal, Value::String(s)) => match s.trim().parse() {
                Ok(f) => Value::Float(f),
                Err(_) => return Err(invalid(&Value::String(s))),
            },
            (ColumnType::Text, Value::String(s)) => Value::String(s),
            (ColumnType::Text, v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                Value::String(v.to_string())
            }
            (ColumnType::Date, Value::Date(d)) => Value::Date(d),
            (ColumnType::Date, Value::DateTime(dt)) => Value::Date(dt.date()),
            (ColumnType::Date, Value::String(s)) => match parse_date(&s) {
                Some(d) => Value::Date(d),
                None => return Err(invalid(&Value::String(s))),
            },
            (ColumnType::DateTime, Value::DateTime(dt)) => Value::DateTime(dt),
            (ColumnType::DateTime, Value::Date(d)) => Value::DateTime(d.and_time(Default::default())),
            (ColumnType::DateTime, Value::String(s)) => match parse_datetime(&s) {
                Some(dt) => Value::DateTime(dt),
                None => return Err(invalid(&Value::String(s))),
            },
            (ColumnType::Binary, Value::Bytes(b)) => Value::Bytes(b),
            (ColumnType::Binary, Value::String(s)) => Value::Bytes(s.into_bytes()),
            (ColumnType::Json, Value::Json(j)) => Value::Json(j),
            (ColumnType::Json, Value::String(s)) => match serde_json::from_str(&s) {
                Ok(j) => Value::Json(j),
                Err(_) => Value::Json(serde_json::Value::String(s)),
            },
            (ColumnType::Json, v) => Value::Json(v.to_json()),
            (_, v) => return Err(invalid(&v)),
        };
        Ok(out)
    }

    /// Convert a typed value into what the driver stores.
    pub fn to_db(&self, value: &Value) -> Value {
        match value {
            Value::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
            Value::Json(j) => Value::String(j.to_string()),
            other => other.clone(),
        }
    }

    /// Convert a raw driver value into this column's typed representation.
    ///
    /// Values the column type cannot interpret are passed through untouched.
    pub fn from_db(&self, value: Value) -> Value {
        match (self.db_type, value) {
            (_, Value::Null) => Value::Null,
            (ColumnType::Bool, Value::Int(i)) => Value::Bool(i != 0),
            (ColumnType::Float | ColumnType::Decimal, Value::Int(i)) => Value::Float(i as f64),
            (ColumnType::Int | ColumnType::BigInt, Value::String(s)) => match s.trim().parse() {
                Ok(i) => Value::Int(i),
                Err(_) => Value::String(s),
            },
            (ColumnType::Date, Value::String(s)) => match parse_date(&s) {
                Some(d) => Value::Date(d),
                None => Value::String(s),
            },
            (ColumnType::DateTime, Value::String(s)) => match parse_datetime(&s) {
                Some(dt) => Value::DateTime(dt),
                None => Value::String(s),
            },
            (ColumnType::Json, Value::String(s)) => match serde_json::from_str(&s) {
                Ok(j) => Value::Json(j),
                Err(_) => Value::String(s),
            },
            (_, v) => v,
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(Default::default()))
        })
}

/// Metadata for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: IndexMap<String, Column>,
}

impl Table {
    /// Create a table without columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
        }
    }

    /// Add a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    /// Add several columns.
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        for column in columns {
            self.columns.insert(column.name.clone(), column);
        }
        self
    }

    /// Look up a column.
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Check if a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Primary key column names in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .values()
            .filter(|c| c.primary)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// The auto-increment column, if any.
    pub fn auto_increment_column(&self) -> Option<&Column> {
        self.columns.values().find(|c| c.auto_increment)
    }

    /// Unique groups and their member columns.
    pub fn unique_groups(&self) -> IndexMap<&str, Vec<&str>> {
        let mut groups: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for column in self.columns.values() {
            if let Some(group) = &column.unique {
                groups.entry(group.as_str()).or_default().push(column.name.as_str());
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn contact_table() -> Table {
        Table::new("contact").with_columns([
            Column::id("id"),
            Column::text("name", 10).required(),
            Column::bool("deleted").default(false),
            Column::datetime("createdAt"),
            Column::new("data", ColumnType::Json),
            Column::text("email", 100).unique("email"),
        ])
    }

    #[test]
    fn test_primary_key_and_auto_increment() {
        let table = contact_table();
        assert_eq!(table.primary_key(), vec!["id"]);
        assert_eq!(table.auto_increment_column().map(|c| c.name.as_str()), Some("id"));
        assert!(table.has_column("deleted"));
        assert!(!table.has_column("missing"));
    }

    #[test]
    fn test_normalize_casts() {
        let table = contact_table();
        let id = table.get("id").unwrap();
        assert_eq!(id.normalize(Value::from("12")).unwrap(), Value::Int(12));
        assert_eq!(id.normalize(Value::from("")).unwrap(), Value::Null);
        assert!(id.normalize(Value::from("abc")).is_err());

        let deleted = table.get("deleted").unwrap();
        assert_eq!(deleted.normalize(Value::Int(1)).unwrap(), Value::Bool(true));

        let created = table.get("createdAt").unwrap();
        let parsed = created.normalize(Value::from("2024-01-02 03:04:05")).unwrap();
        assert!(matches!(parsed, Value::DateTime(_)));
    }

    #[test]
    fn test_db_round_trip() {
        let table = contact_table();
        let created = table.get("createdAt").unwrap();
        let typed = created.normalize(Value::from("2024-01-02T03:04:05")).unwrap();
        let stored = created.to_db(&typed);
        assert_eq!(stored, Value::from("2024-01-02 03:04:05"));
        assert_eq!(created.from_db(stored), typed);

        let deleted = table.get("deleted").unwrap();
        assert_eq!(deleted.from_db(Value::Int(0)), Value::Bool(false));

        let data = table.get("data").unwrap();
        assert_eq!(data.from_db(Value::from("{\"a\":1}")), Value::Json(serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_unique_groups() {
        let table = contact_table();
        let groups = table.unique_groups();
        assert_eq!(groups.get("email"), Some(&vec!["email"]));
    }
}
