//! # tabula-query
//!
//! Record, relation and query-builder core for the Tabula ORM.
//!
//! This crate provides:
//! - A [`Schema`] of record types, each backed by a [`Table`] and a set of
//!   [`Relation`]s
//! - [`Record`]s that track changes against their loaded baseline
//! - Relation graphs saved in one transaction, in dependency order
//! - Soft and hard deletes with restrict and cascade handling
//! - A [`Query`] description compiled to SQL by [`QueryBuilder`]
//! - Row-level permissions through [`PermissionsModel`]
//!
//! Storage drivers implement [`Connection`]; see `tabula-sqlite`.
//!
//! ## Schema
//!
//! ```rust
//! use tabula_query::{Column, DeleteAction, EntityDef, Relation, Schema, Table};
//!
//! let schema = Schema::builder()
//!     .entity(
//!         EntityDef::new(
//!             "Contact",
//!             Table::new("contact").with_columns([Column::id("id"), Column::text("name", 100).required()]),
//!         )
//!         .with_relation(
//!             Relation::has_many("emailAddresses", "EmailAddress")
//!                 .key("id", "contactId")
//!                 .on_delete(DeleteAction::Cascade),
//!         ),
//!     )
//!     .entity(
//!         EntityDef::new(
//!             "EmailAddress",
//!             Table::new("email_address").with_columns([
//!                 Column::id("id"),
//!                 Column::int("contactId").required(),
//!                 Column::text("email", 255).required(),
//!             ]),
//!         )
//!         .with_relation(Relation::belongs_to("contact", "Contact").key("contactId", "id")),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(schema.relation("Contact", "emailAddresses").is_ok());
//! ```
//!
//! ## Table names
//!
//! ```rust
//! use tabula_query::schema::derive_table_name;
//!
//! assert_eq!(derive_table_name("crm::EmailAddress", 1), "email_address");
//! ```

pub mod builder;
pub mod cache;
pub mod connection;
pub mod criteria;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod permissions;
pub mod query;
pub mod record;
pub mod relation;
pub mod relation_store;
pub mod schema;
pub mod session;
pub mod sql;
pub mod store;
pub mod table;
pub mod types;
pub mod validate;
pub mod value;

pub use builder::{CompiledQuery, QueryBuilder};
pub use cache::{CacheBackend, CacheEntry, CacheError, CacheKey, CacheResult, MemoryCache, MemoryCacheBuilder, MemoryCacheConfig, NullCache};
pub use connection::Connection;
pub use criteria::{Comparator, Condition, Connective, Criteria, Operand};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult, Suggestion};
pub use hooks::{NoHooks, RecordHooks};
pub use permissions::{Action, AllowAll, OwnerPermissions, PermissionsModel, RelayPermissions, UserContext};
pub use query::{DEFAULT_ALIAS, Join, Query};
pub use record::{Record, RecordRef};
pub use relation::{DeleteAction, Direction, Relation, Via};
pub use relation_store::{RelationInput, RelationStore, Staged, StagedOp};
pub use schema::{EntityDef, Model, Schema, SchemaBuilder, SchemaConfig};
pub use session::Session;
pub use store::Store;
pub use table::{Column, ColumnType, Table};
pub use types::{FetchMode, JoinKind, NullsOrder, OrderByField, SelectItem, SortOrder};
pub use validate::{EmailValidator, RangeValidator, RegexValidator, ValidationCode, ValidationError, ValidationErrors, Validator};
pub use value::{Params, Row, Value};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::connection::Connection;
    pub use crate::criteria::{Comparator, Criteria};
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::permissions::{Action, PermissionsModel, UserContext};
    pub use crate::query::Query;
    pub use crate::record::RecordRef;
    pub use crate::relation::{DeleteAction, Relation};
    pub use crate::schema::{EntityDef, Schema};
    pub use crate::session::Session;
    pub use crate::table::{Column, Table};
    pub use crate::types::{JoinKind, OrderByField};
    pub use crate::value::Value;
}
