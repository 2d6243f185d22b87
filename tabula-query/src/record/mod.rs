//! Active records.
//!
//! A [`Record`] holds the current and the baseline column values of one row,
//! the state of every relation touched so far, and the validation errors of
//! the last save. Records are shared through [`RecordRef`] handles: a record
//! may be reachable from several relation stores at once and all of them see
//! the same instance.
//!
//! Relations are explicit method calls:
//!
//! ```rust,ignore
//! let contact = session.create("Contact")?;
//! contact.set("name", "Alice")?;
//! contact.set_json(&json!({
//!     "emailAddresses": [{ "email": "a@x.com" }, { "email": "b@x.com" }]
//! }))?;
//! assert!(contact.save()?);
//! assert_eq!(contact.related("emailAddresses")?.len(), 2);
//! ```

pub(crate) mod delete;
pub(crate) mod save;
mod validation;

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::relation_store::{self, RelationInput, RelationStore, Staged};
use crate::schema::EntityDef;
use crate::session::Session;
use crate::validate::ValidationErrors;
use crate::value::Value;

/// One mapped row.
pub struct Record {
    session: Rc<Session>,
    entity: Arc<EntityDef>,
    values: IndexMap<String, Value>,
    old: IndexMap<String, Value>,
    is_new: bool,
    is_deleted: bool,
    pub(crate) relations: IndexMap<String, RelationStore>,
    pub(crate) errors: ValidationErrors,
}

impl Record {
    pub(crate) fn new(session: Rc<Session>, entity: Arc<EntityDef>, values: IndexMap<String, Value>, is_new: bool) -> Self {
        let old = if is_new { IndexMap::new() } else { values.clone() };
        Self {
            session,
            entity,
            values,
            old,
            is_new,
            is_deleted: false,
            relations: IndexMap::new(),
            errors: ValidationErrors::new(),
        }
    }

    /// The owning session.
    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    /// The record type definition.
    pub fn entity(&self) -> &Arc<EntityDef> {
        &self.entity
    }

    /// Record type name.
    pub fn record_type(&self) -> &str {
        self.entity.name()
    }

    /// Current value of a column.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// All current values.
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Baseline value of a column: what was loaded or last committed.
    pub fn old_value(&self, column: &str) -> Option<&Value> {
        self.old.get(column)
    }

    /// Assign a column, normalizing the value to the column type.
    pub fn set_value(&mut self, column: &str, value: Value) -> QueryResult<()> {
        let definition = self
            .entity
            .table()
            .get(column)
            .ok_or_else(|| QueryError::unknown_column(self.entity.name(), column))?;
        let value = definition.normalize(value)?;
        self.values.insert(column.to_string(), value);
        Ok(())
    }

    /// Never saved.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Deleted, softly or for good.
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Validation errors of the last save or validate.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Whether a column differs from its baseline.
    pub fn is_column_modified(&self, column: &str) -> bool {
        let current = self.values.get(column).unwrap_or(&Value::Null);
        let old = self.old.get(column).unwrap_or(&Value::Null);
        current != old
    }

    /// Columns that differ from their baseline, in declaration order.
    pub fn modified_columns(&self) -> Vec<&str> {
        self.values
            .keys()
            .filter(|column| self.is_column_modified(column))
            .map(String::as_str)
            .collect()
    }

    /// Primary key values. Uses the baseline when a key column was changed so
    /// the stored row can still be located.
    pub fn primary_key_old(&self) -> IndexMap<String, Value> {
        self.entity
            .table()
            .primary_key()
            .into_iter()
            .map(|column| {
                let value = self
                    .old
                    .get(column)
                    .filter(|v| !v.is_null())
                    .or_else(|| self.values.get(column))
                    .cloned()
                    .unwrap_or_default();
                (column.to_string(), value)
            })
            .collect()
    }

    /// Current primary key values.
    pub fn primary_key(&self) -> IndexMap<String, Value> {
        self.entity
            .table()
            .primary_key()
            .into_iter()
            .map(|column| (column.to_string(), self.values.get(column).cloned().unwrap_or_default()))
            .collect()
    }

    /// JSON object of the column values.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(column, value)| (column.clone(), value.to_json()))
                .collect(),
        )
    }

    fn has_changes(&self) -> bool {
        self.values.keys().any(|column| self.is_column_modified(column))
    }

    pub(crate) fn reset_baseline(&mut self) {
        self.old = self.values.clone();
        self.relations.clear();
    }

    pub(crate) fn mark_saved(&mut self) {
        self.is_new = false;
    }

    pub(crate) fn mark_unsaved(&mut self) {
        self.is_new = true;
        if let Some(column) = self.entity.table().auto_increment_column() {
            self.values.insert(column.name.clone(), Value::Null);
        }
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }

    pub(crate) fn values_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.values
    }

    pub(crate) fn old_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.old
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.entity.name())
            .field("values", &self.values)
            .field("is_new", &self.is_new)
            .field("is_deleted", &self.is_deleted)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Shared handle to a [`Record`].
#[derive(Clone)]
pub struct RecordRef(Rc<RefCell<Record>>);

impl RecordRef {
    pub(crate) fn new(record: Record) -> Self {
        Self(Rc::new(RefCell::new(record)))
    }

    /// Borrow the record.
    ///
    /// # Panics
    ///
    /// Panics if the record is mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, Record> {
        self.0.borrow()
    }

    /// Borrow the record mutably.
    ///
    /// # Panics
    ///
    /// Panics if the record is borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, Record> {
        self.0.borrow_mut()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn as_ptr(&self) -> *const RefCell<Record> {
        Rc::as_ptr(&self.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<Record>> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<RefCell<Record>>) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    /// Same instance, or the same stored row.
    pub fn same_record(&self, other: &RecordRef) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.borrow(), other.borrow());
        !a.is_new && !b.is_new && a.record_type() == b.record_type() && a.primary_key() == b.primary_key()
    }

    /// The owning session.
    pub fn session(&self) -> Rc<Session> {
        self.borrow().session.clone()
    }

    /// The record type definition.
    pub fn entity(&self) -> Arc<EntityDef> {
        self.borrow().entity.clone()
    }

    /// Record type name.
    pub fn record_type(&self) -> String {
        self.borrow().record_type().to_string()
    }

    /// Current value of a column, null when unset.
    pub fn value(&self, column: &str) -> Value {
        self.borrow().value(column).cloned().unwrap_or_default()
    }

    /// Never saved.
    pub fn is_new(&self) -> bool {
        self.borrow().is_new
    }

    /// Deleted, softly or for good.
    pub fn is_deleted(&self) -> bool {
        self.borrow().is_deleted
    }

    /// Validation errors of the last save or validate.
    pub fn errors(&self) -> ValidationErrors {
        self.borrow().errors.clone()
    }

    /// JSON object of the column values.
    pub fn to_json(&self) -> serde_json::Value {
        self.borrow().to_json()
    }

    // ============== Columns ==============

    /// Read a column.
    pub fn get(&self, column: &str) -> QueryResult<Value> {
        let record = self.borrow();
        record
            .value(column)
            .cloned()
            .ok_or_else(|| QueryError::unknown_column(record.record_type(), column))
    }

    /// Assign a column.
    pub fn set(&self, column: &str, value: impl Into<Value>) -> QueryResult<()> {
        self.borrow_mut().set_value(column, value.into())
    }

    /// Assign columns and relations from a JSON object. Relation keys take an
    /// object (to-one), an array of objects (to-many) or null.
    pub fn set_json(&self, payload: &serde_json::Value) -> QueryResult<()> {
        match payload {
            serde_json::Value::Object(map) => self.set_json_map(map.clone()),
            other => Err(QueryError::invalid_usage(format!("Expected a JSON object, got {}", other))),
        }
    }

    pub(crate) fn set_json_map(&self, map: serde_json::Map<String, serde_json::Value>) -> QueryResult<()> {
        let entity = self.entity();
        for (key, value) in map {
            if entity.table().has_column(&key) {
                self.set(&key, Value::from(value))?;
                continue;
            }
            let relation = entity
                .relation(&key)
                .ok_or_else(|| QueryError::unknown_column(entity.name(), &key))?;
            let inputs = match value {
                serde_json::Value::Null => Vec::new(),
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .map(RelationInput::try_from)
                    .collect::<QueryResult<Vec<_>>>()?,
                other => vec![RelationInput::try_from(other)?],
            };
            if inputs.is_empty() && relation.is_belongs_to() {
                self.clear_belongs_to(&key)?;
            } else {
                self.set_related(&key, inputs)?;
            }
        }
        Ok(())
    }

    /// Whether any column differs from its baseline or any touched relation
    /// has pending changes.
    pub fn is_modified(&self) -> bool {
        self.is_modified_in(&mut HashSet::new())
    }

    pub(crate) fn is_modified_in(&self, visited: &mut HashSet<*const RefCell<Record>>) -> bool {
        if !visited.insert(self.as_ptr()) {
            return false;
        }
        let record = self.borrow();
        if record.has_changes() {
            return true;
        }
        record.relations.values().any(|store| store.is_modified(visited))
    }

    // ============== Relations ==============

    fn relation_store(&self, name: &str) -> QueryResult<RelationStore> {
        if let Some(store) = self.borrow().relations.get(name) {
            return Ok(store.clone());
        }
        let relation = self
            .entity()
            .relation(name)
            .cloned()
            .ok_or_else(|| QueryError::unknown_relation(self.record_type(), name))?;
        Ok(RelationStore::new(relation))
    }

    /// A query-backed store of the related records, or `None` while the
    /// owner's keys are null. Ignores staged changes.
    pub fn related_store(&self, name: &str) -> QueryResult<Option<crate::store::Store>> {
        let store = self.relation_store(name)?;
        let relation = store.relation().clone();
        let session = self.session();
        let link_table = match &relation.via {
            Some(via) => Some(session.schema().entity(&via.record_type)?.table().name.clone()),
            None => None,
        };
        let query = relation_store::scoped_query(&self.borrow(), &relation, link_table.as_deref())?;
        match query {
            Some(query) => Ok(Some(session.find_with(query)?)),
            None => Ok(None),
        }
    }

    /// The related records: staged ones when assigned, else loaded once.
    pub fn related(&self, name: &str) -> QueryResult<Vec<RecordRef>> {
        let mut store = self.relation_store(name)?;
        if let Some(records) = store.records() {
            return Ok(records);
        }
        let records = match self.related_store(name)? {
            Some(query) => query.all()?,
            None => Vec::new(),
        };
        store.set_loaded(records.clone());
        self.borrow_mut().relations.insert(name.to_string(), store);
        Ok(records)
    }

    /// The first related record.
    pub fn related_one(&self, name: &str) -> QueryResult<Option<RecordRef>> {
        Ok(self.related(name)?.into_iter().next())
    }

    /// Replace the related records.
    ///
    /// Keys are copied between owner and targets right away; records pushed
    /// into a to-many relation get their reverse relation pointed back at the
    /// owner. For via relations, currently linked records missing from the
    /// new list are unlinked on save.
    pub fn set_related<I, T>(&self, name: &str, inputs: I) -> QueryResult<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<RelationInput>,
    {
        let mut store = self.relation_store(name)?;
        let relation = store.relation().clone();
        let session = self.session();

        let mut items: Vec<Staged> = Vec::new();
        for input in inputs {
            let target = relation_store::normalize(&session, &relation, input.into())?;
            if items.iter().any(|item| item.record.same_record(&target)) {
                continue;
            }
            relation_store::propagate_keys(&relation, self, &target)?;
            relation_store::set_back_reference(&relation, self, &target);
            let linked = relation.is_via() && relation_store::is_linked(&session, &relation, self, &target)?;
            items.push(Staged::save(target, linked));
        }
        if !relation.is_many() && items.len() > 1 {
            return Err(QueryError::invalid_usage(format!(
                "Relation '{}' holds a single record",
                relation.name
            )));
        }

        if relation.is_via() {
            let linked = match self.related_store(name)? {
                Some(query) => query.all()?,
                None => Vec::new(),
            };
            for current in linked {
                if !items.iter().any(|item| item.record.same_record(&current)) {
                    let mut removal = Staged::save(current, true);
                    removal.op = relation_store::StagedOp::Delete;
                    items.push(removal);
                }
            }
        }

        trace!(relation = %name, entries = items.len(), "staged relation");
        store.set_staged(items);
        self.borrow_mut().relations.insert(name.to_string(), store);
        Ok(())
    }

    /// Add one record to a relation, keeping the current ones.
    pub fn add_related(&self, name: &str, input: impl Into<RelationInput>) -> QueryResult<()> {
        let relation = self.relation_store(name)?.relation().clone();
        if !relation.is_many() {
            return self.set_related(name, [input.into()]);
        }
        let mut inputs: Vec<RelationInput> = self.related(name)?.into_iter().map(RelationInput::Record).collect();
        inputs.push(input.into());
        self.set_related(name, inputs)
    }

    /// Remove a record from a relation. Owned records are deleted on save,
    /// via links are removed and belongs-to keys are cleared.
    pub fn remove_related(&self, name: &str, target: &RecordRef) -> QueryResult<()> {
        let relation = self.relation_store(name)?.relation().clone();
        if relation.is_belongs_to() {
            return self.clear_belongs_to(name);
        }
        let current = self.related(name)?;
        let mut store = self.relation_store(name)?;
        if !store.is_staged() {
            let session = self.session();
            let mut items = Vec::with_capacity(current.len());
            for record in current {
                let linked = relation.is_via() && relation_store::is_linked(&session, &relation, self, &record)?;
                items.push(Staged::save(record, linked));
            }
            store.set_staged(items);
        }
        if !store.mark_deleted(target) {
            return Err(QueryError::invalid_usage(format!(
                "Record is not part of relation '{}'",
                relation.name
            )));
        }
        self.borrow_mut().relations.insert(name.to_string(), store);
        Ok(())
    }

    fn clear_belongs_to(&self, name: &str) -> QueryResult<()> {
        let mut store = self.relation_store(name)?;
        let relation = store.relation().clone();
        {
            let mut record = self.borrow_mut();
            for local in relation.keys.keys() {
                record.set_value(local, Value::Null)?;
            }
        }
        store.set_staged(Vec::new());
        self.borrow_mut().relations.insert(name.to_string(), store);
        Ok(())
    }

    /// Install a to-one relation loaded by a joined select.
    pub(crate) fn preload(&self, name: &str, target: Option<RecordRef>) -> QueryResult<()> {
        let mut store = self.relation_store(name)?;
        store.set_loaded(target.into_iter().collect());
        self.borrow_mut().relations.insert(name.to_string(), store);
        Ok(())
    }

    // ============== Lifecycle ==============

    /// Run validation without saving. Errors are left on the record.
    pub fn validate(&self) -> QueryResult<bool> {
        validation::validate_record(self)
    }

    /// Save the record and every touched relation in one transaction.
    ///
    /// Returns `Ok(false)` when validation failed here or in a related record;
    /// nothing is written in that case. Permission denials and storage
    /// failures are errors.
    pub fn save(&self) -> QueryResult<bool> {
        save::save_root(self)
    }

    /// Delete the record, softly when the type has a soft-delete column.
    pub fn delete(&self) -> QueryResult<bool> {
        delete::delete_record(self, false, &mut HashSet::new())
    }

    /// Remove the row for good.
    pub fn delete_hard(&self) -> QueryResult<bool> {
        delete::delete_record(self, true, &mut HashSet::new())
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(record) => record.fmt(f),
            Err(_) => f.write_str("RecordRef(<borrowed>)"),
        }
    }
}
