//! Per-record relation state.
//!
//! Each touched relation of a record gets a [`RelationStore`]. It starts out
//! lazy, caches what it loaded, and once the caller assigns records it holds
//! the desired end state as a list of [`Staged`] entries. Reads are served
//! from that list from then on, so "load, edit, save" never loses edits.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::criteria::{Condition, Criteria};
use crate::error::{QueryError, QueryResult};
use crate::query::Query;
use crate::record::delete::delete_record;
use crate::record::save::{SaveContext, save_record};
use crate::record::{Record, RecordRef};
use crate::relation::Relation;
use crate::session::Session;
use crate::sql::quote_qualified;
use crate::types::JoinKind;
use crate::value::{Row, Value};

const LINK_ALIAS: &str = "link";

/// A value assigned to a relation.
#[derive(Debug, Clone)]
pub enum RelationInput {
    /// An existing record instance.
    Record(RecordRef),
    /// Attributes of a new or existing record. A complete primary key looks
    /// up the stored record and merges onto it.
    Attributes(serde_json::Map<String, serde_json::Value>),
    /// A row that was already loaded, hydrated without a lookup.
    Loaded(Row),
}

impl From<RecordRef> for RelationInput {
    fn from(record: RecordRef) -> Self {
        Self::Record(record)
    }
}

impl From<&RecordRef> for RelationInput {
    fn from(record: &RecordRef) -> Self {
        Self::Record(record.clone())
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for RelationInput {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::Attributes(map)
    }
}

impl TryFrom<serde_json::Value> for RelationInput {
    type Error = QueryError;

    fn try_from(value: serde_json::Value) -> QueryResult<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self::Attributes(map)),
            other => Err(QueryError::invalid_usage(format!(
                "Relation values must be objects, got {}",
                other
            ))),
        }
    }
}

/// What saving the owner does with a staged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedOp {
    /// Save the record and make sure it is related.
    Save,
    /// Delete the record, or unlink it for via relations.
    Delete,
}

/// One entry of a staged relation.
#[derive(Debug, Clone)]
pub struct Staged {
    /// The related record.
    pub record: RecordRef,
    /// Pending operation.
    pub op: StagedOp,
    /// Via relations only: a link row existed when the entry was staged.
    pub(crate) linked: bool,
}

impl Staged {
    pub(crate) fn save(record: RecordRef, linked: bool) -> Self {
        Self {
            record,
            op: StagedOp::Save,
            linked,
        }
    }
}

/// State of one relation of one record.
#[derive(Clone)]
pub struct RelationStore {
    relation: Arc<Relation>,
    loaded: Option<Vec<RecordRef>>,
    staged: Option<Vec<Staged>>,
    /// Owner that pushed this record into one of its to-many relations.
    /// Weak, the owner already holds this record strongly.
    back: Option<Weak<RefCell<Record>>>,
}

impl RelationStore {
    pub(crate) fn new(relation: Arc<Relation>) -> Self {
        Self {
            relation,
            loaded: None,
            staged: None,
            back: None,
        }
    }

    pub(crate) fn back_reference(relation: Arc<Relation>, owner: &RecordRef) -> Self {
        Self {
            back: Some(owner.downgrade()),
            ..Self::new(relation)
        }
    }

    fn back_record(&self) -> Option<RecordRef> {
        self.back.as_ref().and_then(RecordRef::upgrade)
    }

    /// Staged entries, with a live back reference counted as a staged save.
    pub(crate) fn entries(&self) -> Option<Vec<Staged>> {
        match &self.staged {
            Some(items) => Some(items.clone()),
            None => self.back_record().map(|owner| vec![Staged::save(owner, false)]),
        }
    }

    /// The relation this store belongs to.
    pub fn relation(&self) -> &Arc<Relation> {
        &self.relation
    }

    /// Staged entries, if anything was assigned.
    pub fn staged(&self) -> Option<&[Staged]> {
        self.staged.as_deref()
    }

    /// Whether records were assigned.
    pub fn is_staged(&self) -> bool {
        self.staged.is_some() || self.back_record().is_some()
    }

    /// The current records: staged saves if assigned, else what was loaded.
    pub(crate) fn records(&self) -> Option<Vec<RecordRef>> {
        match self.entries() {
            Some(items) => Some(
                items
                    .into_iter()
                    .filter(|item| item.op == StagedOp::Save)
                    .map(|item| item.record)
                    .collect(),
            ),
            None => self.loaded.clone(),
        }
    }

    pub(crate) fn set_loaded(&mut self, records: Vec<RecordRef>) {
        self.loaded = Some(records);
    }

    pub(crate) fn set_staged(&mut self, items: Vec<Staged>) {
        self.staged = Some(items);
    }

    /// Mark an entry for deletion. Returns false when the record is not part
    /// of the staged list.
    pub(crate) fn mark_deleted(&mut self, target: &RecordRef) -> bool {
        let Some(items) = self.staged.as_mut() else {
            return false;
        };
        match items.iter_mut().find(|item| item.record.same_record(target)) {
            Some(item) => {
                item.op = StagedOp::Delete;
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_modified(&self, visited: &mut HashSet<*const RefCell<Record>>) -> bool {
        let Some(items) = self.entries() else {
            return false;
        };
        if self.relation.is_belongs_to() {
            return true;
        }
        let via = self.relation.is_via();
        items.iter().any(|item| match item.op {
            StagedOp::Delete if via => item.linked,
            StagedOp::Delete => !item.record.is_new(),
            StagedOp::Save => (via && !item.linked) || item.record.is_new() || item.record.is_modified_in(visited),
        })
    }

    /// Persist the staged entries. `Ok(false)` means a related record failed
    /// validation; its errors stay on that record.
    pub(crate) fn save(&self, owner: &RecordRef, ctx: &mut SaveContext) -> QueryResult<bool> {
        let Some(items) = self.entries() else {
            return Ok(true);
        };
        let relation = &self.relation;
        trace!(relation = %relation.name, entries = items.len(), "saving relation");

        for item in &items {
            let target = &item.record;
            let ok = match (item.op, relation.is_via(), relation.is_belongs_to()) {
                (StagedOp::Save, true, _) => {
                    if !save_record(target, ctx)? {
                        return Ok(false);
                    }
                    let session = owner.session();
                    if item.linked || is_linked(&session, relation, owner, target)? {
                        true
                    } else {
                        create_link(&session, relation, owner, target, ctx)?
                    }
                }
                (StagedOp::Delete, true, _) => {
                    if !target.is_new() && !owner.is_new() {
                        delete_link(&owner.session(), relation, owner, target)?;
                    }
                    true
                }
                (StagedOp::Save, false, true) => {
                    let saved = save_record(target, ctx)?;
                    if saved {
                        propagate_keys(relation, owner, target)?;
                    }
                    saved
                }
                (StagedOp::Save, false, false) => {
                    propagate_keys(relation, owner, target)?;
                    save_record(target, ctx)?
                }
                (StagedOp::Delete, false, _) => {
                    if target.is_new() {
                        true
                    } else {
                        delete_record(target, false, &mut HashSet::new())?
                    }
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for RelationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationStore")
            .field("relation", &self.relation.name)
            .field("loaded", &self.loaded.as_ref().map(Vec::len))
            .field("staged", &self.staged.as_ref().map(Vec::len))
            .field("back", &self.back.is_some())
            .finish()
    }
}

/// The query selecting `owner`'s related records, or `None` while any owner
/// key is null.
pub(crate) fn scoped_query(owner: &Record, relation: &Relation, link_table: Option<&str>) -> QueryResult<Option<Query>> {
    let mut query = Query::from_type(relation.to_type.as_str());
    match (&relation.via, link_table) {
        (Some(via), Some(link_table)) => {
            let mut on = Criteria::new();
            for (link_column, target_column) in &via.keys {
                on = on.and(Condition::Raw {
                    sql: format!(
                        "{} = {}",
                        quote_qualified(LINK_ALIAS, link_column)?,
                        quote_qualified(query.get_alias(), target_column)?
                    ),
                    params: Vec::new(),
                });
            }
            query = query.join(link_table, LINK_ALIAS, on, JoinKind::Inner);
            for (local, link_column) in &relation.keys {
                match owner.value(local) {
                    Some(value) if !value.is_null() => {
                        query = query.where_eq(format!("{}.{}", LINK_ALIAS, link_column), value.clone());
                    }
                    _ => return Ok(None),
                }
            }
        }
        (Some(via), None) => {
            return Err(QueryError::internal(format!(
                "link table of '{}' not resolved",
                via.record_type
            )));
        }
        (None, _) => {
            for (local, foreign) in &relation.keys {
                match owner.value(local) {
                    Some(value) if !value.is_null() => {
                        query = query.where_eq(foreign.as_str(), value.clone());
                    }
                    _ => return Ok(None),
                }
            }
        }
    }
    Ok(Some(query))
}

/// Turn an assigned value into a record of the relation's target type.
pub(crate) fn normalize(session: &Rc<Session>, relation: &Relation, input: RelationInput) -> QueryResult<RecordRef> {
    let entity = session.schema().entity(&relation.to_type)?.clone();
    match input {
        RelationInput::Record(record) => {
            let record_type = record.record_type();
            if record_type != relation.to_type {
                return Err(QueryError::invalid_usage(format!(
                    "Relation '{}' expects {}, got {}",
                    relation.name, relation.to_type, record_type
                )));
            }
            Ok(record)
        }
        RelationInput::Loaded(row) => Ok(session.hydrate(entity, &row)),
        RelationInput::Attributes(mut map) => {
            let negative_is_new = session.schema().config().negative_keys_as_new;
            let mut keys = IndexMap::new();
            let mut absent = Vec::new();
            for column in entity.table().primary_key() {
                let value = map.get(column).cloned().map(Value::from).unwrap_or_default();
                if value.is_empty() || (negative_is_new && value.is_negative()) {
                    absent.push(column.to_string());
                } else {
                    keys.insert(column.to_string(), value);
                }
            }

            // Key parts that were supplied stay on the new record.
            let existing = if absent.is_empty() {
                session.find_by_keys(&relation.to_type, &keys)?
            } else {
                for column in &absent {
                    map.remove(column);
                }
                None
            };
            let record = match existing {
                Some(record) => record,
                None => session.create(&relation.to_type)?,
            };
            record.set_json_map(map)?;
            Ok(record)
        }
    }
}

/// Copy key values across a direct relation. Null values are never copied.
pub(crate) fn propagate_keys(relation: &Relation, owner: &RecordRef, target: &RecordRef) -> QueryResult<()> {
    if relation.is_via() {
        return Ok(());
    }
    for (local, foreign) in &relation.keys {
        if relation.is_belongs_to() {
            let value = target.value(foreign);
            if !value.is_null() && owner.value(local) != value {
                owner.borrow_mut().set_value(local, value)?;
            }
        } else {
            let value = owner.value(local);
            if !value.is_null() && target.value(foreign) != value {
                target.borrow_mut().set_value(foreign, value)?;
            }
        }
    }
    Ok(())
}

/// Point the target's reverse relation back at the owner, unless it was
/// already set.
pub(crate) fn set_back_reference(relation: &Relation, owner: &RecordRef, target: &RecordRef) {
    if relation.is_belongs_to() || relation.is_via() || owner.ptr_eq(target) {
        return;
    }
    let entity = target.entity();
    let Some(reverse) = entity.relations().values().find(|r| relation.is_reverse_of(r)) else {
        return;
    };
    let mut record = target.borrow_mut();
    if !record.relations.contains_key(&reverse.name) {
        record
            .relations
            .insert(reverse.name.clone(), RelationStore::back_reference(reverse.clone(), owner));
    }
}

fn link_criteria(relation: &Relation, owner: &RecordRef, target: &RecordRef) -> QueryResult<Criteria> {
    let via = relation
        .via
        .as_ref()
        .ok_or_else(|| QueryError::internal(format!("'{}' is not a via relation", relation.name)))?;
    let mut criteria = Criteria::new();
    for (local, link_column) in &relation.keys {
        criteria = criteria.eq(link_column.as_str(), owner.value(local));
    }
    for (link_column, target_column) in &via.keys {
        criteria = criteria.eq(link_column.as_str(), target.value(target_column));
    }
    Ok(criteria)
}

/// Whether a link row joins `owner` and `target`.
pub(crate) fn is_linked(session: &Rc<Session>, relation: &Relation, owner: &RecordRef, target: &RecordRef) -> QueryResult<bool> {
    if owner.is_new() || target.is_new() {
        return Ok(false);
    }
    let via = relation
        .via
        .as_ref()
        .ok_or_else(|| QueryError::internal(format!("'{}' is not a via relation", relation.name)))?;
    let query = Query::from_type(via.record_type.as_str())
        .with_deleted()
        .skip_permissions()
        .and_where(link_criteria(relation, owner, target)?);
    Ok(session.find_with(query)?.count()? > 0)
}

fn create_link(
    session: &Rc<Session>,
    relation: &Relation,
    owner: &RecordRef,
    target: &RecordRef,
    ctx: &mut SaveContext,
) -> QueryResult<bool> {
    let via = relation
        .via
        .as_ref()
        .ok_or_else(|| QueryError::internal(format!("'{}' is not a via relation", relation.name)))?;
    let link = session.create(&via.record_type)?;
    for (local, link_column) in &relation.keys {
        link.set(link_column, owner.value(local))?;
    }
    for (link_column, target_column) in &via.keys {
        link.set(link_column, target.value(target_column))?;
    }
    trace!(relation = %relation.name, "creating link row");
    save_record(&link, ctx)
}

fn delete_link(session: &Rc<Session>, relation: &Relation, owner: &RecordRef, target: &RecordRef) -> QueryResult<()> {
    let via = relation
        .via
        .as_ref()
        .ok_or_else(|| QueryError::internal(format!("'{}' is not a via relation", relation.name)))?;
    let link = session.schema().entity(&via.record_type)?;
    let compiled = session
        .builder()
        .delete(&link.table().name, &link_criteria(relation, owner, target)?)?;
    trace!(relation = %relation.name, "removing link row");
    session.execute(&compiled)?;
    Ok(())
}
