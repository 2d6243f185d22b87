//! Saving a record and its touched relation graph.
//!
//! One call to [`RecordRef::save`] walks the graph in dependency order:
//! belongs-to targets first, then the record itself, then owned records and
//! via links. Every record visited shares one [`SaveContext`], which breaks
//! cycles, remembers what to reset after commit and what to restore after a
//! rollback.

use std::cell::RefCell;
use std::collections::HashSet;

use chrono::Local;
use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::error::{QueryError, QueryResult};
use crate::permissions::Action;
use crate::query::Query;
use crate::record::{Record, RecordRef, validation};
use crate::relation_store::RelationStore;
use crate::validate::{ValidationCode, ValidationError};
use crate::value::Value;

const CREATED_AT: &str = "createdAt";
const MODIFIED_AT: &str = "modifiedAt";
const CREATED_BY: &str = "createdBy";
const MODIFIED_BY: &str = "modifiedBy";

/// State shared by every record saved in one call.
#[derive(Default)]
pub(crate) struct SaveContext {
    visited: HashSet<*const RefCell<Record>>,
    touched: Vec<RecordRef>,
    created: Vec<RecordRef>,
    began_transaction: bool,
}

impl SaveContext {
    fn visit(&mut self, record: &RecordRef) -> bool {
        if self.visited.insert(record.as_ptr()) {
            self.touched.push(record.clone());
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    BelongsTo,
    Owned,
}

/// Save `record` as the root of a save call: open the transaction if none is
/// active, and commit or roll back once the graph is done.
pub(crate) fn save_root(record: &RecordRef) -> QueryResult<bool> {
    let mut ctx = SaveContext::default();
    let session = record.session();
    let result = save_record(record, &mut ctx);

    match result {
        Ok(true) => {
            if ctx.began_transaction {
                if let Err(e) = session.commit() {
                    restore_after_rollback(&ctx);
                    if let Err(rollback) = session.roll_back() {
                        warn!(error = %rollback, "rollback after failed commit failed");
                    }
                    return Err(QueryError::transaction(format!("commit failed: {}", e.message)).with_source(e));
                }
            }
            for touched in &ctx.touched {
                touched.borrow_mut().reset_baseline();
            }
            for touched in &ctx.touched {
                let entity = touched.entity();
                entity.hooks().after_commit(&touched.borrow());
            }
            debug!(records = ctx.touched.len(), "save committed");
            Ok(true)
        }
        Ok(false) | Err(_) => {
            if ctx.began_transaction {
                restore_after_rollback(&ctx);
                session.roll_back()?;
            }
            result
        }
    }
}

fn restore_after_rollback(ctx: &SaveContext) {
    for created in &ctx.created {
        created.borrow_mut().mark_unsaved();
    }
}

/// Save one record within a running save call. Records already visited in
/// this call succeed without doing anything.
pub(crate) fn save_record(record: &RecordRef, ctx: &mut SaveContext) -> QueryResult<bool> {
    if !ctx.visit(record) {
        return Ok(true);
    }
    let session = record.session();
    let entity = record.entity();
    let (is_new, is_deleted) = {
        let current = record.borrow();
        (current.is_new(), current.is_deleted())
    };
    if is_deleted {
        return Err(QueryError::invalid_usage("Cannot save a deleted record").with_model(entity.name()));
    }
    if !is_new && !record.is_modified() {
        trace!(entity = %entity.name(), "nothing to save");
        return Ok(true);
    }

    let action = if is_new { Action::Create } else { Action::Write };
    let allowed = entity.permissions().can(action, &record.borrow(), session.user())?;
    if !allowed {
        debug!(entity = %entity.name(), action = %action, "permission denied");
        return Err(QueryError::forbidden(entity.name(), action));
    }
    if is_new {
        entity
            .permissions()
            .before_create(&mut record.borrow_mut(), session.user())?;
    }
    check_foreign_keys_readable(record)?;

    if !entity.hooks().before_save(&mut record.borrow_mut())? {
        debug!(entity = %entity.name(), "save cancelled by hook");
        return Ok(false);
    }
    if !validation::validate_record(record)? {
        return Ok(false);
    }

    if !session.in_transaction() {
        session.begin_transaction()?;
        ctx.began_transaction = true;
    }

    let mut relations = std::mem::take(&mut record.borrow_mut().relations);
    let result = save_relations(record, &relations, ctx, Phase::BelongsTo)
        .and_then(|ok| if ok { write_row(record, ctx) } else { Ok(false) })
        .and_then(|ok| {
            if ok {
                save_relations(record, &relations, ctx, Phase::Owned)
            } else {
                Ok(false)
            }
        });

    let mut current = record.borrow_mut();
    for (name, store) in std::mem::take(&mut current.relations) {
        relations.entry(name).or_insert(store);
    }
    current.relations = relations;
    result
}

/// Belongs-to keys set directly, not through the relation, must point at a
/// record the user can read.
fn check_foreign_keys_readable(record: &RecordRef) -> QueryResult<()> {
    let session = record.session();
    let entity = record.entity();
    for relation in entity.relations().values().filter(|r| r.is_belongs_to()) {
        let mut query = Query::from_type(relation.to_type.as_str()).limit(1);
        {
            let current = record.borrow();
            if current.relations.get(&relation.name).is_some_and(RelationStore::is_staged) {
                continue;
            }
            if !relation.keys.keys().any(|local| current.is_column_modified(local)) {
                continue;
            }
            let mut complete = true;
            for (local, foreign) in &relation.keys {
                match current.value(local) {
                    Some(value) if !value.is_null() => query = query.where_eq(foreign.as_str(), value.clone()),
                    _ => complete = false,
                }
            }
            if !complete {
                continue;
            }
        }
        if session.find_with(query)?.single()?.is_none() {
            debug!(entity = %entity.name(), relation = %relation.name, "foreign key not readable");
            return Err(QueryError::forbidden(relation.to_type.as_str(), Action::Read).with_field(&relation.name));
        }
    }
    Ok(())
}

fn save_relations(
    record: &RecordRef,
    relations: &IndexMap<String, RelationStore>,
    ctx: &mut SaveContext,
    phase: Phase,
) -> QueryResult<bool> {
    for (name, store) in relations {
        let belongs_to = store.relation().is_belongs_to();
        if (phase == Phase::BelongsTo) != belongs_to || !store.is_staged() {
            continue;
        }
        if !store.save(record, ctx)? {
            let nested = failed_errors(store);
            debug!(relation = %name, "related record failed to save");
            record.borrow_mut().errors.add(
                name.as_str(),
                ValidationError::new(ValidationCode::Relational, format!("Could not save {}", name))
                    .with_data(nested),
            );
            return Ok(false);
        }
    }
    Ok(true)
}

/// Errors of the staged records that failed, keyed by position.
fn failed_errors(store: &RelationStore) -> serde_json::Value {
    let mut failed = serde_json::Map::new();
    for (index, item) in store.entries().unwrap_or_default().iter().enumerate() {
        let Ok(record) = item.record.0.try_borrow() else {
            continue;
        };
        if !record.errors().is_empty() {
            failed.insert(index.to_string(), record.errors().to_json());
        }
    }
    serde_json::Value::Object(failed)
}

fn write_row(record: &RecordRef, ctx: &mut SaveContext) -> QueryResult<bool> {
    if record.is_new() {
        insert(record, ctx)
    } else {
        update(record)
    }
}

fn stamp(record: &mut Record, columns: &[&str], value: Value) -> QueryResult<()> {
    for column in columns {
        if record.entity().table().has_column(column) && !record.is_column_modified(column) {
            record.set_value(column, value.clone())?;
        }
    }
    Ok(())
}

fn insert(record: &RecordRef, ctx: &mut SaveContext) -> QueryResult<bool> {
    let session = record.session();
    let (compiled, auto_increment, entity) = {
        let mut current = record.borrow_mut();
        let now = Value::DateTime(Local::now().naive_local());
        stamp(&mut current, &[CREATED_AT, MODIFIED_AT], now)?;
        if let Some(user) = session.user().id {
            stamp(&mut current, &[CREATED_BY, MODIFIED_BY], Value::Int(user))?;
        }

        let entity = current.entity().clone();
        let table = entity.table();
        let auto_increment = table.auto_increment_column().map(|c| c.name.clone());
        let mut values = IndexMap::new();
        for column in table.columns.values() {
            let value = current.value(&column.name).cloned().unwrap_or_default();
            if column.auto_increment && value.is_null() {
                continue;
            }
            values.insert(column.name.clone(), column.to_db(&value));
        }
        let filled = auto_increment
            .as_ref()
            .filter(|c| current.value(c).is_none_or(Value::is_null))
            .cloned();
        (session.builder().insert(&table.name, &values)?, filled, entity)
    };

    session.execute(&compiled).map_err(|e| {
        QueryError::statement_failed(format!("insert into {} failed: {}", entity.table().name, e.message), &compiled.sql)
            .with_model(entity.name())
            .with_source(e)
    })?;

    if let Some(column) = auto_increment {
        let id = session
            .last_insert_id()?
            .ok_or_else(|| QueryError::missing_insert_id(entity.name()))?;
        record.borrow_mut().values_mut().insert(column, Value::Int(id));
    }
    record.borrow_mut().mark_saved();
    ctx.created.push(record.clone());
    trace!(entity = %entity.name(), "inserted");
    Ok(true)
}

fn update(record: &RecordRef) -> QueryResult<bool> {
    let session = record.session();
    let compiled = {
        let mut current = record.borrow_mut();
        if current.modified_columns().is_empty() {
            return Ok(true);
        }
        let now = Value::DateTime(Local::now().naive_local());
        stamp(&mut current, &[MODIFIED_AT], now)?;
        if let Some(user) = session.user().id {
            stamp(&mut current, &[MODIFIED_BY], Value::Int(user))?;
        }

        let entity = current.entity().clone();
        let table = entity.table();
        let mut values = IndexMap::new();
        for column in current.modified_columns() {
            if let Some(definition) = table.get(column) {
                let value = current.value(column).cloned().unwrap_or_default();
                values.insert(column.to_string(), definition.to_db(&value));
            }
        }
        let keys = current
            .primary_key_old()
            .into_iter()
            .map(|(column, value)| {
                let value = match table.get(&column) {
                    Some(definition) => definition.to_db(&value),
                    None => value,
                };
                (column, value)
            })
            .collect();
        session.builder().update(&table.name, &values, &keys)?
    };

    session.execute(&compiled).map_err(|e| {
        let entity = record.entity();
        QueryError::statement_failed(format!("update of {} failed: {}", entity.table().name, e.message), &compiled.sql)
            .with_model(entity.name())
            .with_source(e)
    })?;
    trace!(entity = %record.record_type(), "updated");
    Ok(true)
}
