//! Error types for query, record and relation operations.
//!
//! Every fatal failure surfaces as a [`QueryError`] that carries:
//! - An error code for programmatic handling
//! - Actionable suggestions for fixing the issue
//! - Context about what operation failed
//!
//! Validation failures are deliberately *not* errors: they are collected on the
//! record (see [`crate::validate::ValidationErrors`]) and reported through the
//! boolean result of `save()`.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: P{category}{number}
//! - 1xxx: Invalid usage (unknown property, malformed condition, bad identifier)
//! - 2xxx: Integrity (delete restricted, unique)
//! - 3xxx: Connection errors
//! - 4xxx: Transaction errors
//! - 5xxx: Storage errors (statement failed, missing insert id)
//! - 6xxx: Data errors (type, serialization)
//! - 7xxx: Configuration errors
//! - 8xxx: Authorization errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use tabula_query::{QueryError, ErrorCode};
//!
//! let err = QueryError::forbidden("Contact", "write");
//! assert_eq!(err.code, ErrorCode::Forbidden);
//! assert!(err.is_forbidden());
//!
//! let err = QueryError::empty_in_list("id");
//! assert!(err.is_invalid_usage());
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Invalid usage (1xxx)
    /// Record not found where one was required (P1001).
    RecordNotFound = 1001,
    /// Invalid filter or where clause (P1003).
    InvalidFilter = 1003,
    /// Invalid select list (P1004).
    InvalidSelect = 1004,
    /// Identifier contains forbidden characters (P1006).
    InvalidIdentifier = 1006,
    /// Empty IN-list (P1007).
    EmptyInList = 1007,
    /// Unknown column or relation name (P1008).
    UnknownProperty = 1008,
    /// Unknown record type (P1009).
    UnknownRecordType = 1009,
    /// API used in an unsupported way (P1010).
    InvalidUsage = 1010,

    // Integrity (2xxx)
    /// Unique constraint violation (P2001).
    UniqueConstraint = 2001,
    /// Foreign key constraint violation (P2002).
    ForeignKeyConstraint = 2002,
    /// Check constraint violation (P2003).
    CheckConstraint = 2003,
    /// Not null constraint violation (P2004).
    NotNullConstraint = 2004,
    /// Delete blocked by a restricting relation (P2005).
    DeleteRestricted = 2005,

    // Connection errors (3xxx)
    /// Database connection failed (P3001).
    ConnectionFailed = 3001,

    // Transaction errors (4xxx)
    /// Transaction failed (P4001).
    TransactionFailed = 4001,

    // Storage errors (5xxx)
    /// General database error (P5005).
    DatabaseError = 5005,
    /// A write statement failed (P5006).
    StatementFailed = 5006,
    /// The auto-increment value was not returned after insert (P5007).
    MissingInsertId = 5007,

    // Data errors (6xxx)
    /// Invalid data type (P6001).
    InvalidDataType = 6001,
    /// Serialization error (P6002).
    SerializationError = 6002,

    // Configuration errors (7xxx)
    /// Invalid configuration (P7001).
    InvalidConfiguration = 7001,

    // Authorization errors (8xxx)
    /// Permission denied (P8001).
    Forbidden = 8001,

    // Internal errors (9xxx)
    /// Internal error (P9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "P1001").
    pub fn code(&self) -> String {
        format!("P{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RecordNotFound => "Record not found",
            Self::InvalidFilter => "Invalid filter condition",
            Self::InvalidSelect => "Invalid select list",
            Self::InvalidIdentifier => "Invalid identifier",
            Self::EmptyInList => "Empty IN list",
            Self::UnknownProperty => "Unknown property",
            Self::UnknownRecordType => "Unknown record type",
            Self::InvalidUsage => "Invalid usage",
            Self::UniqueConstraint => "Unique constraint violation",
            Self::ForeignKeyConstraint => "Foreign key constraint violation",
            Self::CheckConstraint => "Check constraint violation",
            Self::NotNullConstraint => "Not null constraint violation",
            Self::DeleteRestricted => "Delete restricted",
            Self::ConnectionFailed => "Database connection failed",
            Self::TransactionFailed => "Transaction failed",
            Self::DatabaseError => "Database error",
            Self::StatementFailed => "Statement failed",
            Self::MissingInsertId => "Missing insert id",
            Self::InvalidDataType => "Invalid data type",
            Self::SerializationError => "Serialization error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Forbidden => "Forbidden",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
    /// Optional code example.
    pub code: Option<String>,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            code: None,
        }
    }

    /// Add a code example.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The record type involved.
    pub model: Option<String>,
    /// The column or relation involved.
    pub field: Option<String>,
    /// The SQL statement (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur during query, save and delete operations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Add a code suggestion.
    pub fn with_code_suggestion(mut self, text: impl Into<String>, code: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(text).with_code(code));
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the record type.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the column or relation.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a not found error.
    pub fn not_found(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("No {} record found matching the query", model),
        )
        .with_model(&model)
        .with_code_suggestion(
            "Use find_by_pk() to receive None instead of an error",
            format!("session.find_by_pk(\"{}\", id)?", model),
        )
    }

    /// Create a permission denied error.
    pub fn forbidden(model: impl Into<String>, action: impl fmt::Display) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::Forbidden,
            format!("Permission denied: cannot {} {}", action, model),
        )
        .with_model(&model)
    }

    /// Create a delete restriction error.
    pub fn delete_restricted(model: impl Into<String>, relation: impl Into<String>) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::DeleteRestricted,
            format!(
                "Cannot delete {}: relation '{}' still has dependent records",
                model, relation
            ),
        )
        .with_model(&model)
        .with_field(&relation)
        .with_suggestion(format!("Delete or detach the '{}' records first", relation))
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::InvalidIdentifier,
            format!("Invalid identifier '{}'", name.escape_debug()),
        )
        .with_field(&name)
        .with_help("Identifiers may not contain backticks, backslashes, NUL or parentheses")
    }

    /// Create an empty IN-list error.
    pub fn empty_in_list(column: impl Into<String>) -> Self {
        let column = column.into();
        Self::new(
            ErrorCode::EmptyInList,
            format!("Empty value list given for IN condition on '{}'", column),
        )
        .with_field(&column)
        .with_suggestion("Skip the condition, or short-circuit the query when the list is empty")
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFilter, message)
    }

    /// Create an unknown column error.
    pub fn unknown_column(model: impl Into<String>, column: impl Into<String>) -> Self {
        let model = model.into();
        let column = column.into();
        Self::new(
            ErrorCode::UnknownProperty,
            format!("{} has no column '{}'", model, column),
        )
        .with_model(&model)
        .with_field(&column)
    }

    /// Create an unknown relation error.
    pub fn unknown_relation(model: impl Into<String>, relation: impl Into<String>) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::UnknownProperty,
            format!("{} has no relation '{}'", model, relation),
        )
        .with_model(&model)
        .with_field(&relation)
    }

    /// Create an unknown record type error.
    pub fn unknown_type(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::UnknownRecordType,
            format!("Record type '{}' is not registered", name),
        )
        .with_model(&name)
        .with_suggestion("Register the type with SchemaBuilder::model() or SchemaBuilder::entity()")
    }

    /// Create an invalid usage error.
    pub fn invalid_usage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidUsage, message)
    }

    /// Create a failed statement error.
    pub fn statement_failed(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(ErrorCode::StatementFailed, message).with_sql(sql)
    }

    /// Create a missing insert id error.
    pub fn missing_insert_id(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::MissingInsertId,
            format!("No auto-increment value returned after inserting {}", model),
        )
        .with_model(&model)
        .with_help("Check that the table's auto-increment column matches the declared metadata")
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::ConnectionFailed, format!("Connection error: {}", message))
            .with_suggestion("Verify the database URL is correct")
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::TransactionFailed, format!("Transaction error: {}", message))
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
            .with_suggestion("Check the database logs for more details")
    }

    /// Create an invalid data type error.
    pub fn invalid_data(column: impl Into<String>, message: impl Into<String>) -> Self {
        let column = column.into();
        Self::new(
            ErrorCode::InvalidDataType,
            format!("Invalid value for {}: {}", column, message.into()),
        )
        .with_field(&column)
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
    }

    // ============== Error Checks ==============

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if this is a permission error.
    pub fn is_forbidden(&self) -> bool {
        self.code == ErrorCode::Forbidden
    }

    /// Check if a restricting relation blocked a delete.
    pub fn is_delete_restricted(&self) -> bool {
        self.code == ErrorCode::DeleteRestricted
    }

    /// Check if this is an unrecoverable storage error.
    pub fn is_fatal_storage(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::DatabaseError
                | ErrorCode::StatementFailed
                | ErrorCode::MissingInsertId
                | ErrorCode::ConnectionFailed
                | ErrorCode::TransactionFailed
        )
    }

    /// Check if this is a programmer error detected at the call site.
    pub fn is_invalid_usage(&self) -> bool {
        (self.code as u16) / 1000 == 1 && self.code != ErrorCode::RecordNotFound
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  → Field: {}\n", field));
        }

        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.chars().count() > 200 {
                format!("{}...", sql.chars().take(200).collect::<String>())
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion.text));
                if let Some(ref code) = suggestion.code {
                    output.push_str(&format!("     ```\n     {}\n     ```\n", code.replace('\n', "\n     ")));
                }
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::serialization(err.to_string()).with_source(err)
    }
}
