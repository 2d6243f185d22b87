//! Column validation of a record.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::json;
use tracing::debug;

use crate::criteria::{Comparator, Criteria};
use crate::error::QueryResult;
use crate::query::Query;
use crate::record::RecordRef;
use crate::relation_store::{RelationStore, StagedOp};
use crate::validate::{ValidationCode, ValidationError, ValidationErrors};
use crate::value::Value;

/// Check required columns, lengths, declared validators and unique groups.
/// Errors replace whatever the record held before.
pub(crate) fn validate_record(record: &RecordRef) -> QueryResult<bool> {
    let mut errors = ValidationErrors::new();
    {
        let current = record.borrow();
        let entity = current.entity().clone();
        let filled_by_relations = keys_filled_by_relations(&current.relations);

        for column in entity.table().columns.values() {
            let value = current.value(&column.name).unwrap_or(&Value::Null);

            if column.required && !column.auto_increment && !filled_by_relations.contains(column.name.as_str()) {
                let unset = if column.db_type.is_unset_only() {
                    value.is_null()
                } else {
                    value.is_empty()
                };
                if unset {
                    errors.add(
                        &column.name,
                        ValidationError::new(ValidationCode::Required, format!("{} is required", column.name)),
                    );
                    continue;
                }
            }

            if let (Some(max), Value::String(text)) = (column.length, value) {
                let length = text.chars().count();
                if length > max {
                    errors.add(
                        &column.name,
                        ValidationError::new(
                            ValidationCode::Length,
                            format!("{} is longer than {} characters", column.name, max),
                        )
                        .with_data(json!({ "max": max, "length": length })),
                    );
                }
            }
        }

        for (column, validator) in entity.validators() {
            let value = current.value(column).unwrap_or(&Value::Null);
            if value.is_null() || errors.contains(column) {
                continue;
            }
            if let Err(error) = validator.validate(value, &current) {
                errors.add(column, error);
            }
        }
    }

    if errors.is_empty() {
        check_unique_groups(record, &mut errors)?;
    }

    let valid = errors.is_empty();
    if !valid {
        debug!(entity = %record.record_type(), errors = errors.len(), "validation failed");
    }
    record.borrow_mut().errors = errors;
    Ok(valid)
}

/// Belongs-to key columns that a staged relation will fill in on save.
fn keys_filled_by_relations(relations: &IndexMap<String, RelationStore>) -> HashSet<&str> {
    let mut columns = HashSet::new();
    for store in relations.values() {
        let relation = store.relation();
        let Some(items) = store.entries() else {
            continue;
        };
        if relation.is_belongs_to() && items.iter().any(|item| item.op == StagedOp::Save) {
            columns.extend(relation.keys.keys().map(String::as_str));
        }
    }
    columns
}

fn check_unique_groups(record: &RecordRef, errors: &mut ValidationErrors) -> QueryResult<()> {
    let (session, query_for_groups) = {
        let current = record.borrow();
        let table = current.entity().table().clone();
        let mut queries = Vec::new();
        for (group, columns) in table.unique_groups() {
            if !current.is_new() && !columns.iter().any(|c| current.is_column_modified(c)) {
                continue;
            }
            let values: Vec<(String, Value)> = columns
                .iter()
                .map(|c| (c.to_string(), current.value(c).cloned().unwrap_or_default()))
                .collect();
            if values.iter().any(|(_, v)| v.is_null()) {
                continue;
            }

            let mut query = Query::from_type(current.record_type())
                .with_deleted()
                .skip_permissions();
            for (column, value) in &values {
                query = query.where_eq(column.as_str(), value.clone());
            }
            if !current.is_new() {
                let mut exclude = Criteria::new();
                for (column, value) in current.primary_key_old() {
                    exclude = exclude.or_compare(column, Comparator::NotEq, value);
                }
                query = query.and_where(exclude);
            }
            queries.push((group.to_string(), values, query));
        }
        (current.session().clone(), queries)
    };

    for (group, values, query) in query_for_groups {
        if session.find_with(query)?.count()? > 0 {
            let columns: Vec<&str> = values.iter().map(|(c, _)| c.as_str()).collect();
            let property = columns.first().copied().unwrap_or(group.as_str()).to_string();
            errors.add(
                property,
                ValidationError::new(ValidationCode::Unique, format!("{} must be unique", columns.join(", ")))
                    .with_data(json!({ "group": group, "columns": columns })),
            );
        }
    }
    Ok(())
}
