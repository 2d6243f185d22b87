//! Conversion between Tabula values and SQLite values.
//!
//! SQLite has no boolean, date or JSON storage class. Booleans bind as
//! integers, dates and date-times as ISO-8601 text and JSON documents as
//! serialized text. Reading back yields the raw storage class;
//! [`Column::from_db`](tabula_query::Column::from_db) restores the typed
//! value.

use rusqlite::types::{Value as SqliteValue, ValueRef};
use tabula_query::Value;

use crate::error::{SqliteError, SqliteResult};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Convert a bound parameter to a SQLite value.
///
/// Lists are expanded by the SQL compiler and never reach the driver.
pub fn to_sqlite(value: &Value) -> SqliteResult<SqliteValue> {
    Ok(match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Date(d) => SqliteValue::Text(d.format(DATE_FORMAT).to_string()),
        Value::DateTime(dt) => SqliteValue::Text(dt.format(DATETIME_FORMAT).to_string()),
        Value::Json(j) => SqliteValue::Text(j.to_string()),
        Value::List(_) => {
            return Err(SqliteError::type_conversion("a list cannot be bound as a single parameter"));
        }
    })
}

/// Convert a column read from a row to a Tabula value.
pub fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(to_sqlite(&Value::Null).unwrap(), SqliteValue::Null);
        assert_eq!(to_sqlite(&Value::Bool(true)).unwrap(), SqliteValue::Integer(1));
        assert_eq!(to_sqlite(&Value::Bool(false)).unwrap(), SqliteValue::Integer(0));
        assert_eq!(to_sqlite(&Value::Int(42)).unwrap(), SqliteValue::Integer(42));
        assert_eq!(to_sqlite(&Value::from("hello")).unwrap(), SqliteValue::Text("hello".into()));
    }

    #[test]
    fn test_dates_and_json_as_text() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(to_sqlite(&Value::Date(date)).unwrap(), SqliteValue::Text("2024-02-29".into()));

        let dt = date.and_hms_opt(13, 5, 0).unwrap();
        assert_eq!(
            to_sqlite(&Value::DateTime(dt)).unwrap(),
            SqliteValue::Text("2024-02-29 13:05:00".into())
        );

        let doc = Value::Json(json!({ "a": 1 }));
        assert_eq!(to_sqlite(&doc).unwrap(), SqliteValue::Text(r#"{"a":1}"#.into()));
    }

    #[test]
    fn test_list_is_rejected() {
        assert!(to_sqlite(&Value::List(vec![Value::Int(1)])).is_err());
    }

    #[test]
    fn test_from_sqlite() {
        assert_eq!(from_sqlite(ValueRef::Null), Value::Null);
        assert_eq!(from_sqlite(ValueRef::Integer(7)), Value::Int(7));
        assert_eq!(from_sqlite(ValueRef::Text(b"abc")), Value::from("abc"));
        assert_eq!(from_sqlite(ValueRef::Blob(&[1, 2])), Value::Bytes(vec![1, 2]));
    }
}
