//! # Tabula
//!
//! An active-record ORM core. Records are loaded and saved through a
//! [`Session`], relations between them are declared on the [`Schema`], and a
//! single `save()` persists a whole graph of related records inside one
//! transaction.
//!
//! Tabula provides:
//! - A declarative schema of tables, relations and permissions
//! - A query model compiled to parameterized SQL
//! - Relation-graph saves with validation and rollback
//! - Soft and hard deletes with restrict and cascade rules
//!
//! ## Quick Start
//!
//! ```rust
//! # #[cfg(feature = "sqlite")]
//! # fn main() -> Result<(), tabula::QueryError> {
//! use std::sync::Arc;
//! use tabula::prelude::*;
//! use tabula::sqlite::SqliteConnection;
//!
//! let schema = Schema::builder()
//!     .entity(EntityDef::new(
//!         "Note",
//!         Table::new("note").with_columns([Column::id("id"), Column::text("body", 200).required()]),
//!     ))
//!     .build()?;
//!
//! let connection = SqliteConnection::open_in_memory()?;
//! connection.execute_batch("CREATE TABLE note (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT NOT NULL)")?;
//! let session = Session::new(Arc::new(schema), connection, UserContext::anonymous());
//!
//! let note = session.create("Note")?;
//! note.set("body", "hello")?;
//! assert!(note.save()?);
//! assert_eq!(session.find("Note")?.count()?, 1);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "sqlite"))]
//! # fn main() {}
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use tabula_query::*;

/// SQLite connection support.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use tabula_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tabula_query::prelude::*;

    #[cfg(feature = "sqlite")]
    pub use tabula_sqlite::{SqliteConfig, SqliteConnection};
}
