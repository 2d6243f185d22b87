//! Deleting a record with restrict and cascade handling.
//!
//! Deletes do not open a transaction of their own. A cascade that fails half
//! way leaves the already deleted dependents deleted.

use std::cell::RefCell;
use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::criteria::Criteria;
use crate::error::{QueryError, QueryResult};
use crate::permissions::Action;
use crate::record::{Record, RecordRef};
use crate::relation::{DeleteAction, Relation};
use crate::relation_store::scoped_query;
use crate::store::Store;
use crate::value::Value;

/// Delete `record`. `visited` guards against cascades that loop back.
pub(crate) fn delete_record(
    record: &RecordRef,
    hard: bool,
    visited: &mut HashSet<*const RefCell<Record>>,
) -> QueryResult<bool> {
    if !visited.insert(record.as_ptr()) {
        return Ok(true);
    }
    let session = record.session();
    let entity = record.entity();

    let allowed = entity.permissions().can(Action::Write, &record.borrow(), session.user())?;
    if !allowed {
        debug!(entity = %entity.name(), "delete denied");
        return Err(QueryError::forbidden(entity.name(), Action::Write));
    }
    if record.is_new() {
        return Ok(true);
    }
    if !entity.hooks().before_delete(&mut record.borrow_mut(), hard)? {
        debug!(entity = %entity.name(), "delete cancelled by hook");
        return Ok(false);
    }

    // A physical delete has to reach soft-deleted dependents too, their rows
    // still reference this one.
    let soft = !hard && session.schema().is_soft_deletable(&entity);

    for relation in entity.relations().values() {
        if relation.is_belongs_to() || relation.delete_action != DeleteAction::Restrict {
            continue;
        }
        if let Some(dependents) = dependents(record, relation, !soft)? {
            if dependents.count()? > 0 {
                debug!(entity = %entity.name(), relation = %relation.name, "delete restricted");
                return Err(QueryError::delete_restricted(entity.name(), relation.name.as_str()));
            }
        }
    }

    for relation in entity.relations().values() {
        if relation.is_belongs_to() || relation.delete_action != DeleteAction::Cascade {
            continue;
        }
        if let Some(via) = &relation.via {
            let mut criteria = Criteria::new();
            for (local, link_column) in &relation.keys {
                criteria = criteria.eq(link_column.as_str(), record.value(local));
            }
            let link = session.schema().entity(&via.record_type)?;
            let compiled = session.builder().delete(&link.table().name, &criteria)?;
            trace!(relation = %relation.name, "removing links");
            session.execute(&compiled)?;
            continue;
        }
        let Some(dependents) = dependents(record, relation, !soft)? else {
            continue;
        };
        for dependent in dependents.all()? {
            if dependent.same_record(record) {
                continue;
            }
            trace!(relation = %relation.name, "cascading delete");
            if !delete_record(&dependent, hard, visited)? {
                return Ok(false);
            }
        }
    }

    let table = entity.table();
    let keys: IndexMap<String, Value> = record
        .borrow()
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

    if soft {
        let column = session.schema().config().soft_delete_column.clone();
        let mut values = IndexMap::new();
        values.insert(column.clone(), Value::Bool(true));
        let compiled = session.builder().update(&table.name, &values, &keys)?;
        session.execute(&compiled)?;
        let mut current = record.borrow_mut();
        current.values_mut().insert(column.clone(), Value::Bool(true));
        current.old_mut().insert(column, Value::Bool(true));
        current.mark_deleted();
    } else {
        let mut criteria = Criteria::new();
        for (column, value) in keys {
            criteria = criteria.eq(column, value);
        }
        let compiled = session.builder().delete(&table.name, &criteria)?;
        session.execute(&compiled)?;
        record.borrow_mut().mark_deleted();
    }
    debug!(entity = %entity.name(), soft, "deleted");
    Ok(true)
}

/// Related records of an owned relation, including rows the user cannot
/// read. `with_deleted` also includes soft-deleted rows.
fn dependents(record: &RecordRef, relation: &Relation, with_deleted: bool) -> QueryResult<Option<Store>> {
    let session = record.session();
    let link_table = match &relation.via {
        Some(via) => Some(session.schema().entity(&via.record_type)?.table().name.clone()),
        None => None,
    };
    let query = scoped_query(&record.borrow(), relation, link_table.as_deref())?;
    match query {
        Some(query) if with_deleted => Ok(Some(session.find_with(query.skip_permissions().with_deleted())?)),
        Some(query) => Ok(Some(session.find_with(query.skip_permissions())?)),
        None => Ok(None),
    }
}
