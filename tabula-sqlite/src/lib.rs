//! SQLite database driver for the Tabula ORM.
//!
//! This crate provides a synchronous [`Connection`](tabula_query::Connection)
//! on top of `rusqlite`.
//!
//! # Features
//!
//! - Named parameters bound from compiled queries
//! - Transaction support
//! - In-memory and file-based databases
//! - URL and environment driven configuration
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tabula_query::{Column, EntityDef, Schema, Session, Table, UserContext};
//! use tabula_sqlite::{SqliteConfig, SqliteConnection};
//!
//! let config = SqliteConfig::from_url("sqlite::memory:").unwrap();
//! let conn = SqliteConnection::open(&config).unwrap();
//! conn.execute_batch("CREATE TABLE note (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT)").unwrap();
//!
//! let schema = Schema::builder()
//!     .entity(EntityDef::new(
//!         "Note",
//!         Table::new("note").with_columns([Column::id("id"), Column::text("title", 200)]),
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let session = Session::new(Arc::new(schema), conn, UserContext::anonymous());
//! let note = session.create("Note").unwrap();
//! note.set("title", "Hello").unwrap();
//! assert!(note.save().unwrap());
//! assert_eq!(session.find("Note").unwrap().count().unwrap(), 1);
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod types;

pub use config::{DATABASE_URL_VAR, DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use connection::SqliteConnection;
pub use error::{SqliteError, SqliteResult};
