//! Error types for SQLite operations.

use rusqlite::ffi;
use tabula_query::error::{ErrorCode, QueryError};
use thiserror::Error;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Error, Debug)]
pub enum SqliteError {
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value that SQLite cannot bind.
    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    /// Transaction state error.
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl SqliteError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a type conversion error.
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// Create a transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Whether SQLite rejected the statement because of a constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<SqliteError> for QueryError {
    fn from(err: SqliteError) -> Self {
        let message = err.to_string();
        let code = match &err {
            SqliteError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => match e.code {
                rusqlite::ErrorCode::ConstraintViolation => constraint_code(e.extended_code),
                rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase => ErrorCode::ConnectionFailed,
                _ => ErrorCode::DatabaseError,
            },
            SqliteError::Sqlite(_) => ErrorCode::DatabaseError,
            SqliteError::Config(_) => ErrorCode::InvalidConfiguration,
            SqliteError::TypeConversion(_) => ErrorCode::InvalidDataType,
            SqliteError::Transaction(_) => ErrorCode::TransactionFailed,
        };
        QueryError::new(code, message).with_source(err)
    }
}

/// Integrity code for an extended `SQLITE_CONSTRAINT_*` result.
fn constraint_code(extended_code: i32) -> ErrorCode {
    match extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ErrorCode::UniqueConstraint,
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ErrorCode::ForeignKeyConstraint,
        ffi::SQLITE_CONSTRAINT_NOTNULL => ErrorCode::NotNullConstraint,
        ffi::SQLITE_CONSTRAINT_CHECK => ErrorCode::CheckConstraint,
        _ => ErrorCode::DatabaseError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqliteError::config("invalid path");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("invalid path"));
    }

    #[test]
    fn test_error_conversion() {
        let err: QueryError = SqliteError::config("bad url").into();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);

        let err: QueryError = SqliteError::type_conversion("list").into();
        assert_eq!(err.code, ErrorCode::InvalidDataType);

        let err: QueryError = SqliteError::transaction("no transaction").into();
        assert!(err.is_fatal_storage());
    }

    #[test]
    fn test_constraint_violation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE); INSERT INTO t (name) VALUES ('a');")
            .unwrap();
        let err: SqliteError = conn.execute("INSERT INTO t (name) VALUES ('a')", []).unwrap_err().into();
        assert!(err.is_constraint_violation());

        let err: QueryError = err.into();
        assert_eq!(err.code, ErrorCode::UniqueConstraint);
        assert!(err.source.is_some());
    }

    #[test]
    fn test_constraint_kinds() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                 id INTEGER PRIMARY KEY,
                 parentId INTEGER NOT NULL REFERENCES parent(id),
                 size INTEGER CHECK (size > 0)
             );",
        )
        .unwrap();

        let code = |sql: &str| -> ErrorCode {
            let err: SqliteError = conn.execute(sql, []).unwrap_err().into();
            QueryError::from(err).code
        };
        assert_eq!(code("INSERT INTO child (parentId) VALUES (99)"), ErrorCode::ForeignKeyConstraint);
        assert_eq!(code("INSERT INTO child (parentId) VALUES (NULL)"), ErrorCode::NotNullConstraint);
        conn.execute("INSERT INTO parent (id) VALUES (1)", []).unwrap();
        assert_eq!(code("INSERT INTO child (parentId, size) VALUES (1, 0)"), ErrorCode::CheckConstraint);
        conn.execute("INSERT INTO child (id, parentId) VALUES (5, 1)", []).unwrap();
        assert_eq!(code("INSERT INTO child (id, parentId) VALUES (5, 1)"), ErrorCode::UniqueConstraint);
    }
}
