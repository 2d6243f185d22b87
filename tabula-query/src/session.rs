//! Request-scoped database session.
//!
//! A [`Session`] bundles the schema, one connection and the acting user. It
//! is created once per request and shared through an `Rc`; records and
//! stores keep a handle to it.
//!
//! ```rust,ignore
//! let session = Session::new(schema, SqliteConnection::open_in_memory()?, UserContext::user(1));
//! let contact = session.create("Contact")?;
//! contact.set("name", "Alice")?;
//! contact.save()?;
//!
//! let found = session.find_by_pk("Contact", contact.get("id")?)?;
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::builder::{CompiledQuery, QueryBuilder};
use crate::connection::Connection;
use crate::error::{QueryError, QueryResult};
use crate::permissions::UserContext;
use crate::query::Query;
use crate::record::{Record, RecordRef};
use crate::schema::{EntityDef, Schema};
use crate::store::Store;
use crate::value::{Row, Value};

/// Schema, connection and user of one request.
pub struct Session {
    schema: Arc<Schema>,
    connection: RefCell<Box<dyn Connection>>,
    user: UserContext,
}

impl Session {
    /// Open a session.
    pub fn new(schema: Arc<Schema>, connection: impl Connection + 'static, user: UserContext) -> Rc<Self> {
        Rc::new(Self {
            schema,
            connection: RefCell::new(Box::new(connection)),
            user,
        })
    }

    /// The schema registry.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The acting user.
    pub fn user(&self) -> &UserContext {
        &self.user
    }

    /// A SQL compiler over this session's schema.
    pub fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.schema)
    }

    // ============== Statements ==============

    /// Run a compiled SELECT.
    pub fn query_rows(&self, compiled: &CompiledQuery) -> QueryResult<Vec<Row>> {
        debug!(sql = %compiled.sql, params = compiled.params.len(), "executing query");
        let rows = self
            .connection
            .borrow_mut()
            .query(&compiled.sql, &compiled.params)
            .map_err(|e| e.with_sql(&compiled.sql))?;
        trace!(rows = rows.len(), "query returned");
        Ok(rows)
    }

    /// Run a compiled write statement.
    pub fn execute(&self, compiled: &CompiledQuery) -> QueryResult<u64> {
        debug!(sql = %compiled.sql, params = compiled.params.len(), "executing statement");
        self.connection
            .borrow_mut()
            .execute(&compiled.sql, &compiled.params)
            .map_err(|e| e.with_sql(&compiled.sql))
    }

    /// Key generated by the last insert.
    pub fn last_insert_id(&self) -> QueryResult<Option<i64>> {
        self.connection.borrow_mut().last_insert_id()
    }

    // ============== Transactions ==============

    /// Whether a transaction is open on the connection.
    pub fn in_transaction(&self) -> bool {
        self.connection.borrow().in_transaction()
    }

    /// Begin a transaction.
    pub fn begin_transaction(&self) -> QueryResult<()> {
        debug!("begin transaction");
        self.connection.borrow_mut().begin_transaction()
    }

    /// Commit the open transaction.
    pub fn commit(&self) -> QueryResult<()> {
        debug!("commit transaction");
        self.connection.borrow_mut().commit()
    }

    /// Roll back the open transaction.
    pub fn roll_back(&self) -> QueryResult<()> {
        warn!("rolling back transaction");
        self.connection.borrow_mut().roll_back()
    }

    // ============== Records ==============

    /// All readable records of a type.
    pub fn find(self: &Rc<Self>, record_type: &str) -> QueryResult<Store> {
        self.find_with(Query::from_type(record_type))
    }

    /// Records matching `query`, constrained by the type's permissions unless
    /// the query skips them.
    pub fn find_with(self: &Rc<Self>, mut query: Query) -> QueryResult<Store> {
        let record_type = query
            .get_record_type()
            .ok_or_else(|| QueryError::invalid_usage("Query has no record type"))?
            .to_string();
        let entity = self.schema.entity(&record_type)?.clone();
        if !query.skips_permissions() {
            entity.permissions().apply_to_query(&mut query, &self.user, &self.schema)?;
        }
        Ok(Store::new(self.clone(), query))
    }

    /// The readable record with a single-column primary key, or `None`.
    pub fn find_by_pk(self: &Rc<Self>, record_type: &str, pk: impl Into<Value>) -> QueryResult<Option<RecordRef>> {
        let entity = self.schema.entity(record_type)?;
        let columns = entity.table().primary_key();
        let [column] = columns.as_slice() else {
            return Err(QueryError::invalid_usage(format!(
                "'{}' has a composite primary key, use find_by_keys",
                record_type
            )));
        };
        let mut keys = IndexMap::new();
        keys.insert(column.to_string(), pk.into());
        self.find_by_keys(record_type, &keys)
    }

    /// The readable record matching every key, or `None`.
    pub fn find_by_keys(
        self: &Rc<Self>,
        record_type: &str,
        keys: &IndexMap<String, Value>,
    ) -> QueryResult<Option<RecordRef>> {
        let mut query = Query::from_type(record_type).limit(1);
        for (column, value) in keys {
            query = query.where_eq(column.as_str(), value.clone());
        }
        self.find_with(query)?.single()
    }

    /// A new, unsaved record with column defaults applied.
    pub fn create(self: &Rc<Self>, record_type: &str) -> QueryResult<RecordRef> {
        let entity = self.schema.entity(record_type)?.clone();
        let mut values = IndexMap::new();
        for column in entity.table().columns.values() {
            let value = match &column.default {
                Some(default) => column.normalize(default.clone())?,
                None => Value::Null,
            };
            values.insert(column.name.clone(), value);
        }
        trace!(entity = %entity.name(), "created record");
        Ok(RecordRef::new(Record::new(self.clone(), entity, values, true)))
    }

    /// Build a record from a driver row. Rows carrying the full primary key
    /// are persisted records, anything else stays new.
    pub(crate) fn hydrate(self: &Rc<Self>, entity: Arc<EntityDef>, row: &Row) -> RecordRef {
        let values: IndexMap<String, Value> = entity
            .table()
            .columns
            .values()
            .map(|column| {
                let raw = row.get(&column.name).cloned().unwrap_or_default();
                (column.name.clone(), column.from_db(raw))
            })
            .collect();
        let is_new = entity
            .table()
            .primary_key()
            .iter()
            .any(|column| values.get(*column).is_none_or(Value::is_null));
        RecordRef::new(Record::new(self.clone(), entity, values, is_new))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}
