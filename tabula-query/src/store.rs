//! Lazy result sets.
//!
//! A [`Store`] binds a [`Query`] to a session. Nothing runs until the records
//! are asked for; the first fetch is kept, so reading a store twice issues
//! one query.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::builder::CompiledQuery;
use crate::criteria::Operand;
use crate::error::{QueryError, QueryResult};
use crate::query::{Join, Query};
use crate::record::RecordRef;
use crate::session::Session;
use crate::types::FetchMode;
use crate::value::{Row, Value};

/// A query bound to a session.
pub struct Store {
    session: Rc<Session>,
    query: Query,
    fetched: RefCell<Option<Vec<RecordRef>>>,
}

impl Store {
    pub(crate) fn new(session: Rc<Session>, query: Query) -> Self {
        Self {
            session,
            query,
            fetched: RefCell::new(None),
        }
    }

    /// The underlying query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Give up the store and keep the query.
    pub fn into_query(self) -> Query {
        self.query
    }

    /// Compile the SELECT this store runs.
    pub fn compile(&self) -> QueryResult<CompiledQuery> {
        self.session.builder().select(&self.query)
    }

    /// All records, fetched once.
    pub fn all(&self) -> QueryResult<Vec<RecordRef>> {
        if let Some(records) = self.fetched.borrow().as_ref() {
            return Ok(records.clone());
        }
        if self.query.get_fetch_mode() == FetchMode::Rows {
            return Err(QueryError::invalid_usage("Store is in row mode, use rows()"));
        }
        let rows = self.rows()?;
        let records = self.hydrate(&rows)?;
        *self.fetched.borrow_mut() = Some(records.clone());
        Ok(records)
    }

    /// Iterate the records.
    pub fn iter(&self) -> QueryResult<std::vec::IntoIter<RecordRef>> {
        Ok(self.all()?.into_iter())
    }

    /// The first record, or `None`. Runs a `LIMIT 1` query unless the store
    /// was already fetched.
    pub fn single(&self) -> QueryResult<Option<RecordRef>> {
        if let Some(records) = self.fetched.borrow().as_ref() {
            return Ok(records.first().cloned());
        }
        let limited = Store::new(self.session.clone(), self.query.clone().limit(1));
        Ok(limited.all()?.into_iter().next())
    }

    /// Raw rows without hydration.
    pub fn rows(&self) -> QueryResult<Vec<Row>> {
        let compiled = self.compile()?;
        self.session.query_rows(&compiled)
    }

    /// Number of matching rows.
    pub fn count(&self) -> QueryResult<i64> {
        let compiled = self.session.builder().count(&self.query)?;
        let rows = self.session.query_rows(&compiled)?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    fn hydrate(&self, rows: &[Row]) -> QueryResult<Vec<RecordRef>> {
        let record_type = self
            .query
            .get_record_type()
            .ok_or_else(|| QueryError::invalid_usage("Query has no record type"))?;
        let schema = self.session.schema();
        let entity = schema.entity(record_type)?.clone();

        let preloaded: Vec<&str> = self
            .query
            .joins()
            .iter()
            .filter_map(|join| match join {
                Join::Relation { path, select: true, .. } if !path.contains('.') => Some(path.as_str()),
                _ => None,
            })
            .collect();

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = self.session.hydrate(entity.clone(), row);
            for path in &preloaded {
                let Some(relation) = entity.relation(path) else {
                    continue;
                };
                let prefix = format!("{}.", path);
                let related: Row = row
                    .iter()
                    .filter_map(|(key, value)| key.strip_prefix(&prefix).map(|col| (col.to_string(), value.clone())))
                    .collect::<IndexMap<_, _>>();
                let target = if related.values().all(Value::is_null) {
                    None
                } else {
                    let target_entity = schema.entity(&relation.to_type)?.clone();
                    Some(self.session.hydrate(target_entity, &related))
                };
                record.preload(path, target)?;
            }
            records.push(record);
        }
        Ok(records)
    }
}

impl From<Store> for Operand {
    fn from(store: Store) -> Self {
        Operand::Query(Box::new(store.query))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("query", &self.query)
            .field("fetched", &self.fetched.borrow().as_ref().map(Vec::len))
            .finish()
    }
}
