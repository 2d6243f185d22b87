//! Compiles queries into parameterized SQL.
//!
//! The compiler turns a [`Query`] plus schema metadata into SQL text and the
//! named parameters it references, in placeholder order:
//!
//! - identifiers are backtick-quoted and checked for forbidden characters
//! - unqualified columns resolve against the primary alias, qualified ones
//!   against a joined relation path or an explicit alias
//! - soft-deleted rows are filtered unless the query asks for them
//! - sub-selects get a fresh alias when theirs is already in use
//!
//! ```rust
//! use tabula_query::{Column, EntityDef, Query, QueryBuilder, Schema, Table};
//!
//! let schema = Schema::builder()
//!     .entity(EntityDef::new("Note", Table::new("note").with_columns([
//!         Column::id("id"),
//!         Column::text("title", 50),
//!     ])))
//!     .build()
//!     .unwrap();
//!
//! let compiled = QueryBuilder::new(&schema)
//!     .select(&Query::from_type("Note").where_eq("title", "hello"))
//!     .unwrap();
//! assert!(compiled.sql.starts_with("SELECT `t`.* FROM `note` `t` WHERE `t`.`title` = :p"));
//! assert_eq!(compiled.params.len(), 1);
//! ```

use std::sync::Arc;

use indexmap::IndexMap;

use crate::criteria::{Comparator, Condition, Criteria, Operand};
use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::query::{Join, Query};
use crate::relation::Relation;
use crate::schema::{EntityDef, Schema};
use crate::sql::{SqlBuilder, quote_identifier, quote_qualified, validate_identifier};
use crate::types::SelectItem;
use crate::value::{Params, Value};

/// A compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// SQL text with `:pN` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Params,
}

impl From<SqlBuilder> for CompiledQuery {
    fn from(builder: SqlBuilder) -> Self {
        let (sql, params) = builder.build();
        Self { sql, params }
    }
}

/// Compiles queries and write statements against a schema.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    schema: &'a Schema,
}

impl<'a> QueryBuilder<'a> {
    /// Create a builder for `schema`.
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Compile a SELECT.
    pub fn select(&self, query: &Query) -> QueryResult<CompiledQuery> {
        let mut sb = SqlBuilder::new();
        Compiler::new(self.schema).select(query, &mut sb)?;
        Ok(sb.into())
    }

    /// Compile a row count of `query`, ignoring its ordering.
    pub fn count(&self, query: &Query) -> QueryResult<CompiledQuery> {
        let mut inner = query.clone();
        inner.order_by.clear();
        let mut sb = SqlBuilder::new();
        sb.push("SELECT COUNT(*) AS `count` FROM (");
        Compiler::new(self.schema).select(&inner, &mut sb)?;
        sb.push(") `counted`");
        Ok(sb.into())
    }

    /// Compile an INSERT of `values` into `table`.
    pub fn insert(&self, table: &str, values: &IndexMap<String, Value>) -> QueryResult<CompiledQuery> {
        let mut sb = SqlBuilder::new();
        sb.push("INSERT INTO ");
        sb.push_identifier(table)?;
        if values.is_empty() {
            sb.push(" DEFAULT VALUES");
            return Ok(sb.into());
        }
        let columns = values
            .keys()
            .map(|c| quote_identifier(c))
            .collect::<QueryResult<Vec<_>>>()?;
        sb.push(" (").push(columns.join(", ")).push(") VALUES (");
        for (i, value) in values.values().enumerate() {
            if i > 0 {
                sb.push(", ");
            }
            sb.push_param(value.clone());
        }
        sb.push(")");
        Ok(sb.into())
    }

    /// Compile an UPDATE of `values` on the row identified by `keys`.
    pub fn update(
        &self,
        table: &str,
        values: &IndexMap<String, Value>,
        keys: &IndexMap<String, Value>,
    ) -> QueryResult<CompiledQuery> {
        if values.is_empty() {
            return Err(QueryError::invalid_usage("UPDATE without columns"));
        }
        if keys.is_empty() {
            return Err(QueryError::invalid_usage("UPDATE without key columns"));
        }
        let mut sb = SqlBuilder::new();
        sb.push("UPDATE ");
        sb.push_identifier(table)?;
        sb.push(" SET ");
        for (i, (column, value)) in values.iter().enumerate() {
            if i > 0 {
                sb.push(", ");
            }
            sb.push_identifier(column)?;
            sb.push(" = ").push_param(value.clone());
        }
        sb.push(" WHERE ");
        write_key_match(&mut sb, keys)?;
        Ok(sb.into())
    }

    /// Compile a DELETE of the rows matching `criteria`. Columns are not
    /// qualified.
    pub fn delete(&self, table: &str, criteria: &Criteria) -> QueryResult<CompiledQuery> {
        if criteria.is_empty() {
            return Err(QueryError::invalid_usage("DELETE without conditions"));
        }
        let mut sb = SqlBuilder::new();
        sb.push("DELETE FROM ");
        sb.push_identifier(table)?;
        sb.push(" WHERE ");
        let scope = Scope::unaliased();
        Compiler::new(self.schema).criteria(criteria, &scope, &mut sb)?;
        Ok(sb.into())
    }
}

fn write_key_match(sb: &mut SqlBuilder, keys: &IndexMap<String, Value>) -> QueryResult<()> {
    for (i, (column, value)) in keys.iter().enumerate() {
        if i > 0 {
            sb.push(" AND ");
        }
        sb.push_identifier(column)?;
        if value.is_null() {
            sb.push(" IS NULL");
        } else {
            sb.push(" = ").push_param(value.clone());
        }
    }
    Ok(())
}

struct JoinedRelation {
    relation: Arc<Relation>,
    entity: Arc<EntityDef>,
    parent_alias: String,
}

/// Name resolution context of one SELECT.
struct Scope {
    alias: Option<String>,
    entity: Option<Arc<EntityDef>>,
    joined: IndexMap<String, JoinedRelation>,
    outputs: Vec<String>,
}

impl Scope {
    fn unaliased() -> Self {
        Self {
            alias: None,
            entity: None,
            joined: IndexMap::new(),
            outputs: Vec::new(),
        }
    }

    fn resolve(&self, column: &str) -> QueryResult<String> {
        if let Some((prefix, name)) = column.rsplit_once('.') {
            if let Some(joined) = self.joined.get(prefix) {
                if !joined.entity.table().has_column(name) {
                    return Err(QueryError::unknown_column(joined.entity.name(), name));
                }
            }
            return quote_qualified(prefix, name);
        }
        match (&self.alias, &self.entity) {
            (Some(alias), Some(entity)) => {
                if entity.table().has_column(column) {
                    quote_qualified(alias, column)
                } else if self.outputs.iter().any(|o| o == column) {
                    quote_identifier(column)
                } else {
                    Err(QueryError::unknown_column(entity.name(), column))
                }
            }
            _ => quote_identifier(column),
        }
    }
}

struct Compiler<'a> {
    schema: &'a Schema,
    aliases_in_use: Vec<String>,
}

impl<'a> Compiler<'a> {
    fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            aliases_in_use: Vec::new(),
        }
    }

    fn fresh_alias(&self) -> String {
        (1..)
            .map(|n| format!("t{}", n))
            .find(|candidate| !self.aliases_in_use.contains(candidate))
            .unwrap_or_default()
    }

    fn select(&mut self, query: &Query, sb: &mut SqlBuilder) -> QueryResult<()> {
        let record_type = query
            .record_type
            .as_deref()
            .ok_or_else(|| QueryError::invalid_usage("Query has no record type"))?;
        let entity = self.schema.entity(record_type)?.clone();

        let mut alias = query.get_alias().to_string();
        if self.aliases_in_use.contains(&alias) {
            alias = self.fresh_alias();
        }
        validate_identifier(&alias)?;

        self.aliases_in_use.push(alias.clone());
        let result = self.select_in_scope(query, entity, alias, sb);
        self.aliases_in_use.pop();
        result
    }

    fn select_in_scope(
        &mut self,
        query: &Query,
        entity: Arc<EntityDef>,
        alias: String,
        sb: &mut SqlBuilder,
    ) -> QueryResult<()> {
        let mut scope = Scope {
            alias: Some(alias.clone()),
            entity: Some(entity.clone()),
            joined: IndexMap::new(),
            outputs: Vec::new(),
        };
        self.resolve_relation_joins(query, &entity, &alias, &mut scope)?;

        sb.push("SELECT ");
        if query.distinct {
            sb.push("DISTINCT ");
        }
        self.select_list(query, &mut scope, sb)?;

        sb.push(" FROM ");
        sb.push_identifier(&entity.table().name)?;
        sb.push(" ");
        sb.push_identifier(&alias)?;

        for join in &query.joins {
            self.join(query, join, &scope, sb)?;
        }

        let mut criteria = query.criteria.clone();
        let soft_column = &self.schema.config().soft_delete_column;
        if !query.with_deleted && entity.table().has_column(soft_column) {
            criteria = criteria.grouped().and(Condition::Compare {
                column: format!("{}.{}", alias, soft_column),
                comparator: Comparator::NotEq,
                operand: Operand::Value(Value::Bool(true)),
            });
        }
        if !criteria.is_empty() {
            sb.push(" WHERE ");
            self.criteria(&criteria, &scope, sb)?;
        }

        if !query.group_by.is_empty() {
            let columns = query
                .group_by
                .iter()
                .map(|c| scope.resolve(c))
                .collect::<QueryResult<Vec<_>>>()?;
            sb.push(" GROUP BY ").push(columns.join(", "));
        }

        if !query.having.is_empty() {
            sb.push(" HAVING ");
            self.criteria(&query.having, &scope, sb)?;
        }

        if !query.order_by.is_empty() {
            let mut clause = String::from(" ORDER BY ");
            for (i, field) in query.order_by.iter().enumerate() {
                if i > 0 {
                    clause.push_str(", ");
                }
                let column = if field.raw {
                    field.column.to_string()
                } else {
                    scope.resolve(&field.column)?
                };
                field.write_sql(&column, &mut clause);
            }
            sb.push(clause);
        }

        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => {
                sb.push(format!(" LIMIT {} OFFSET {}", limit, offset));
            }
            (Some(limit), None) => {
                sb.push(format!(" LIMIT {}", limit));
            }
            (None, Some(offset)) => {
                sb.push(format!(" LIMIT -1 OFFSET {}", offset));
            }
            (None, None) => {}
        }

        sb.extend_params(query.bindings.iter().cloned());
        Ok(())
    }

    fn resolve_relation_joins(
        &self,
        query: &Query,
        root: &Arc<EntityDef>,
        alias: &str,
        scope: &mut Scope,
    ) -> QueryResult<()> {
        for join in &query.joins {
            let Join::Relation { path, .. } = join else {
                continue;
            };
            let (parent_alias, parent, name) = match path.rsplit_once('.') {
                Some((parent_path, name)) => {
                    let parent = scope.joined.get(parent_path).ok_or_else(|| {
                        QueryError::invalid_usage(format!("Relation path '{}' is not joined", parent_path))
                    })?;
                    (parent_path.to_string(), parent.entity.clone(), name)
                }
                None => (alias.to_string(), root.clone(), path.as_str()),
            };
            let relation = parent
                .relation(name)
                .ok_or_else(|| QueryError::unknown_relation(parent.name(), name))?
                .clone();
            let entity = self.schema.entity(&relation.to_type)?.clone();
            scope.joined.insert(
                path.clone(),
                JoinedRelation {
                    relation,
                    entity,
                    parent_alias,
                },
            );
        }
        Ok(())
    }

    fn select_list(&self, query: &Query, scope: &mut Scope, sb: &mut SqlBuilder) -> QueryResult<()> {
        let mut items: Vec<String> = Vec::new();
        if query.select.is_empty() {
            items.push(format!("{}.*", quote_identifier(scope.alias.as_deref().unwrap_or_default())?));
        }
        for item in &query.select {
            match item {
                SelectItem::Column(column) => items.push(scope.resolve(column)?),
                SelectItem::Aliased { column, alias } => {
                    items.push(format!("{} AS {}", scope.resolve(column)?, quote_identifier(alias)?));
                    scope.outputs.push(alias.clone());
                }
                SelectItem::Raw(expression) => items.push(expression.clone()),
            }
        }
        for join in &query.joins {
            let Join::Relation { path, select: true, .. } = join else {
                continue;
            };
            let Some(joined) = scope.joined.get(path) else {
                continue;
            };
            if joined.relation.is_many() {
                return Err(QueryError::new(
                    ErrorCode::InvalidSelect,
                    format!("Cannot select columns of to-many relation '{}'", path),
                ));
            }
            for column in joined.entity.table().columns.keys() {
                items.push(format!(
                    "{} AS {}",
                    quote_qualified(path, column)?,
                    quote_identifier(&format!("{}.{}", path, column))?
                ));
            }
        }
        sb.push(items.join(", "));
        Ok(())
    }

    fn join(&mut self, query: &Query, join: &Join, scope: &Scope, sb: &mut SqlBuilder) -> QueryResult<()> {
        match join {
            Join::Table { table, alias, on, kind } => {
                sb.push(" ").push(kind.as_sql()).push(" ");
                sb.push_identifier(table)?;
                sb.push(" ");
                sb.push_identifier(alias)?;
                sb.push(" ON ");
                if on.is_empty() {
                    sb.push("1 = 1");
                } else {
                    self.criteria(on, scope, sb)?;
                }
            }
            Join::Relation { path, kind, .. } => {
                let joined = scope
                    .joined
                    .get(path)
                    .ok_or_else(|| QueryError::internal(format!("unresolved relation join '{}'", path)))?;
                let relation = &joined.relation;
                let parent = &joined.parent_alias;

                let pairs: Vec<(String, String)> = match &relation.via {
                    Some(via) => {
                        let link = self.schema.entity(&via.record_type)?;
                        let link_alias = format!("{}__link", path);
                        sb.push(" ").push(kind.as_sql()).push(" ");
                        sb.push_identifier(&link.table().name)?;
                        sb.push(" ");
                        sb.push_identifier(&link_alias)?;
                        sb.push(" ON ");
                        let on = relation
                            .keys
                            .iter()
                            .map(|(local, link_col)| {
                                Ok(format!(
                                    "{} = {}",
                                    quote_qualified(&link_alias, link_col)?,
                                    quote_qualified(parent, local)?
                                ))
                            })
                            .collect::<QueryResult<Vec<_>>>()?;
                        sb.push(on.join(" AND "));
                        via.keys
                            .iter()
                            .map(|(link_col, target_col)| (target_col.clone(), format!("{}.{}", link_alias, link_col)))
                            .collect()
                    }
                    None => relation
                        .keys
                        .iter()
                        .map(|(local, foreign)| (foreign.clone(), format!("{}.{}", parent, local)))
                        .collect(),
                };

                sb.push(" ").push(kind.as_sql()).push(" ");
                sb.push_identifier(&joined.entity.table().name)?;
                sb.push(" ");
                sb.push_identifier(path)?;
                sb.push(" ON ");
                let on = pairs
                    .iter()
                    .map(|(target_col, source)| {
                        let (source_alias, source_col) = source.rsplit_once('.').unwrap_or(("", source));
                        Ok(format!(
                            "{} = {}",
                            quote_qualified(path, target_col)?,
                            quote_qualified(source_alias, source_col)?
                        ))
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                sb.push(on.join(" AND "));

                let soft_column = &self.schema.config().soft_delete_column;
                if !query.with_deleted && joined.entity.table().has_column(soft_column) {
                    sb.push(" AND ");
                    sb.push(quote_qualified(path, soft_column)?);
                    sb.push(" != ").push_param(true);
                }
            }
        }
        Ok(())
    }

    fn criteria(&mut self, criteria: &Criteria, scope: &Scope, sb: &mut SqlBuilder) -> QueryResult<()> {
        for (i, (connective, condition)) in criteria.items().iter().enumerate() {
            if i > 0 {
                sb.push(" ").push(connective.as_sql()).push(" ");
            }
            self.condition(condition, scope, sb)?;
        }
        Ok(())
    }

    fn condition(&mut self, condition: &Condition, scope: &Scope, sb: &mut SqlBuilder) -> QueryResult<()> {
        match condition {
            Condition::Raw { sql, params } => {
                sb.append(sql, params.clone());
            }
            Condition::Group(group) => {
                if group.is_empty() {
                    sb.push("1 = 1");
                } else {
                    sb.push("(");
                    self.criteria(group, scope, sb)?;
                    sb.push(")");
                }
            }
            Condition::Exists { negated, query } => {
                sb.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.select(query, sb)?;
                sb.push(")");
            }
            Condition::Compare {
                column,
                comparator,
                operand,
            } => {
                let column_sql = scope.resolve(column)?;
                self.comparison(column, &column_sql, *comparator, operand, sb)?;
            }
        }
        Ok(())
    }

    fn comparison(
        &mut self,
        column: &str,
        column_sql: &str,
        comparator: Comparator,
        operand: &Operand,
        sb: &mut SqlBuilder,
    ) -> QueryResult<()> {
        sb.push(column_sql);
        match operand {
            Operand::Value(Value::Null) => {
                if comparator.is_positive() {
                    sb.push(" IS NULL");
                } else if comparator.is_negative() {
                    sb.push(" IS NOT NULL");
                } else {
                    return Err(QueryError::invalid_filter(format!(
                        "Cannot compare '{}' with NULL using {}",
                        column,
                        comparator.as_sql()
                    ))
                    .with_field(column));
                }
            }
            Operand::Value(Value::List(items)) => {
                let keyword = match comparator {
                    Comparator::Eq | Comparator::In => " IN (",
                    Comparator::NotEq | Comparator::NotIn => " NOT IN (",
                    other => {
                        return Err(QueryError::invalid_filter(format!(
                            "Cannot compare '{}' with a list using {}",
                            column,
                            other.as_sql()
                        ))
                        .with_field(column));
                    }
                };
                if items.is_empty() {
                    return Err(QueryError::empty_in_list(column));
                }
                sb.push(keyword);
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        sb.push(", ");
                    }
                    sb.push_param(item.clone());
                }
                sb.push(")");
            }
            Operand::Value(value) => {
                let op = match comparator {
                    Comparator::Is | Comparator::IsNot => {
                        return Err(QueryError::invalid_filter(format!(
                            "{} on '{}' requires NULL",
                            comparator.as_sql(),
                            column
                        ))
                        .with_field(column));
                    }
                    Comparator::In => "=",
                    Comparator::NotIn => "!=",
                    other => other.as_sql(),
                };
                sb.push(" ").push(op).push(" ").push_param(value.clone());
            }
            Operand::Query(subquery) => {
                let op = match comparator {
                    Comparator::Eq | Comparator::In => "IN",
                    Comparator::NotEq | Comparator::NotIn => "NOT IN",
                    Comparator::Is | Comparator::IsNot => {
                        return Err(QueryError::invalid_filter(format!(
                            "{} cannot take a sub-select",
                            comparator.as_sql()
                        )));
                    }
                    other => other.as_sql(),
                };
                sb.push(" ").push(op).push(" (");
                self.select(subquery, sb)?;
                sb.push(")");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::DeleteAction;
    use crate::table::{Column, Table};
    use crate::types::{FetchMode, JoinKind, OrderByField};
    use pretty_assertions::assert_eq;
    use regex_lite::Regex;

    fn schema() -> Schema {
        Schema::builder()
            .entity(
                EntityDef::new(
                    "Contact",
                    Table::new("contact").with_columns([
                        Column::id("id"),
                        Column::text("name", 100).required(),
                        Column::int("organizationId"),
                        Column::bool("deleted").default(false),
                    ]),
                )
                .with_relation(Relation::belongs_to("organization", "Organization").key("organizationId", "id"))
                .with_relation(
                    Relation::has_many("emailAddresses", "EmailAddress")
                        .key("id", "contactId")
                        .on_delete(DeleteAction::Cascade),
                )
                .with_relation(
                    Relation::has_many("groups", "Group")
                        .key("id", "contactId")
                        .via("ContactGroup", [("groupId", "id")]),
                ),
            )
            .entity(EntityDef::new(
                "EmailAddress",
                Table::new("email_address").with_columns([
                    Column::id("id"),
                    Column::int("contactId").required(),
                    Column::text("email", 255),
                ]),
            ))
            .entity(
                EntityDef::new(
                    "Organization",
                    Table::new("organization").with_columns([
                        Column::id("id"),
                        Column::text("name", 100),
                        Column::int("addressId"),
                        Column::bool("deleted").default(false),
                    ]),
                )
                .with_relation(Relation::belongs_to("address", "Address").key("addressId", "id")),
            )
            .entity(EntityDef::new(
                "Address",
                Table::new("address").with_columns([Column::id("id"), Column::text("city", 100)]),
            ))
            .entity(EntityDef::new(
                "Group",
                Table::new("group").with_columns([Column::id("id"), Column::text("name", 100)]),
            ))
            .entity(EntityDef::new(
                "ContactGroup",
                Table::new("contact_group").with_columns([
                    Column::int("contactId").primary(),
                    Column::int("groupId").primary(),
                ]),
            ))
            .build()
            .unwrap()
    }

    /// Replace generated parameter names with `?` so SQL can be compared.
    fn normalized(compiled: &CompiledQuery) -> String {
        Regex::new(r":p\d+").unwrap().replace_all(&compiled.sql, "?").into_owned()
    }

    fn assert_params_in_text_order(compiled: &CompiledQuery) {
        let positions: Vec<usize> = compiled
            .params
            .iter()
            .map(|(name, _)| {
                let pattern = Regex::new(&format!(r"{}\b", regex_lite::escape(name))).unwrap();
                pattern.find(&compiled.sql).map(|m| m.start()).unwrap()
            })
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_simple_select_with_soft_delete() {
        let schema = schema();
        let compiled = QueryBuilder::new(&schema)
            .select(&Query::from_type("Contact").where_eq("name", "Alice"))
            .unwrap();
        assert_eq!(
            normalized(&compiled),
            "SELECT `t`.* FROM `contact` `t` WHERE `t`.`name` = ? AND `t`.`deleted` != ?"
        );
        assert_eq!(compiled.params[0].1, Value::from("Alice"));
        assert_eq!(compiled.params[1].1, Value::Bool(true));
    }

    #[test]
    fn test_soft_delete_wraps_or_criteria() {
        let schema = schema();
        let query = Query::from_type("Contact")
            .where_eq("name", "a")
            .or_where(Criteria::new().eq("name", "b"));
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(
            normalized(&compiled),
            "SELECT `t`.* FROM `contact` `t` WHERE (`t`.`name` = ? OR (`t`.`name` = ?)) AND `t`.`deleted` != ?"
        );

        // compiling twice must not double-wrap
        let again = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(normalized(&again), normalized(&compiled));
    }

    #[test]
    fn test_with_deleted_and_no_criteria() {
        let schema = schema();
        let compiled = QueryBuilder::new(&schema)
            .select(&Query::from_type("Contact").with_deleted())
            .unwrap();
        assert_eq!(compiled.sql, "SELECT `t`.* FROM `contact` `t`");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_null_comparisons() {
        let schema = schema();
        let query = Query::from_type("EmailAddress")
            .where_eq("email", Value::Null)
            .filter("contactId", Comparator::NotEq, Value::Null);
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT `t`.* FROM `email_address` `t` WHERE `t`.`email` IS NULL AND `t`.`contactId` IS NOT NULL"
        );

        let bad = Query::from_type("EmailAddress").filter("contactId", Comparator::Gt, Value::Null);
        let err = QueryBuilder::new(&schema).select(&bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFilter);
    }

    #[test]
    fn test_in_lists() {
        let schema = schema();
        let query = Query::from_type("EmailAddress")
            .where_eq("id", vec![1i64, 2, 3])
            .filter("contactId", Comparator::NotEq, vec![4i64]);
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(
            normalized(&compiled),
            "SELECT `t`.* FROM `email_address` `t` WHERE `t`.`id` IN (?, ?, ?) AND `t`.`contactId` NOT IN (?)"
        );
        assert_eq!(compiled.params.len(), 4);
        assert_params_in_text_order(&compiled);
    }

    #[test]
    fn test_empty_in_list_is_an_error() {
        let schema = schema();
        let query = Query::from_type("EmailAddress").where_eq("id", Value::List(vec![]));
        let err = QueryBuilder::new(&schema).select(&query).unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyInList);
    }

    #[test]
    fn test_list_with_ordering_comparator_is_an_error() {
        let schema = schema();
        let query = Query::from_type("EmailAddress").filter("id", Comparator::Gt, vec![1i64]);
        assert!(QueryBuilder::new(&schema).select(&query).is_err());
    }

    #[test]
    fn test_unknown_column() {
        let schema = schema();
        let err = QueryBuilder::new(&schema)
            .select(&Query::from_type("EmailAddress").where_eq("nope", 1))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownProperty);
    }

    #[test]
    fn test_invalid_identifier() {
        let schema = schema();
        let err = QueryBuilder::new(&schema)
            .select(&Query::from_type("EmailAddress").where_eq("x.`id`", 1))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidIdentifier);
    }

    #[test]
    fn test_subquery_alias_is_renamed() {
        let schema = schema();
        let sub = Query::from_type("EmailAddress")
            .select(["contactId"])
            .where_eq("email", "a@x.com");
        let query = Query::from_type("Contact").with_deleted().where_eq("id", sub);
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(
            normalized(&compiled),
            "SELECT `t`.* FROM `contact` `t` WHERE `t`.`id` IN (SELECT `t1`.`contactId` FROM `email_address` `t1` WHERE `t1`.`email` = ?)"
        );
    }

    #[test]
    fn test_exists_condition() {
        let schema = schema();
        let sub = Query::from_type("EmailAddress")
            .table_alias("e")
            .select_raw("1")
            .where_raw("`e`.`contactId` = `t`.`id`");
        let query = Query::from_type("Contact").with_deleted().where_exists(sub);
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT `t`.* FROM `contact` `t` WHERE EXISTS (SELECT 1 FROM `email_address` `e` WHERE `e`.`contactId` = `t`.`id`)"
        );
    }

    #[test]
    fn test_relation_joins() {
        let schema = schema();
        let query = Query::from_type("Contact")
            .with_deleted()
            .join_relation("organization.address", JoinKind::Left)
            .where_eq("organization.address.city", "Delft");
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(
            normalized(&compiled),
            "SELECT `t`.* FROM `contact` `t` \
             LEFT JOIN `organization` `organization` ON `organization`.`id` = `t`.`organizationId` \
             LEFT JOIN `address` `organization.address` ON `organization.address`.`id` = `organization`.`addressId` \
             WHERE `organization.address`.`city` = ?"
        );
    }

    #[test]
    fn test_relation_join_soft_delete_in_on_clause() {
        let schema = schema();
        let query = Query::from_type("Contact").join_relation("organization", JoinKind::Inner);
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(
            normalized(&compiled),
            "SELECT `t`.* FROM `contact` `t` \
             INNER JOIN `organization` `organization` ON `organization`.`id` = `t`.`organizationId` AND `organization`.`deleted` != ? \
             WHERE `t`.`deleted` != ?"
        );
        assert_params_in_text_order(&compiled);
    }

    #[test]
    fn test_via_join() {
        let schema = schema();
        let query = Query::from_type("Contact")
            .with_deleted()
            .distinct()
            .join_relation("groups", JoinKind::Inner)
            .where_eq("groups.name", "Friends");
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(
            normalized(&compiled),
            "SELECT DISTINCT `t`.* FROM `contact` `t` \
             INNER JOIN `contact_group` `groups__link` ON `groups__link`.`contactId` = `t`.`id` \
             INNER JOIN `group` `groups` ON `groups`.`id` = `groups__link`.`groupId` \
             WHERE `groups`.`name` = ?"
        );
    }

    #[test]
    fn test_select_joined_relation_columns() {
        let schema = schema();
        let query = Query::from_type("Contact")
            .with_deleted()
            .join_relation_select("organization", JoinKind::Left);
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert!(compiled.sql.starts_with(
            "SELECT `t`.*, `organization`.`id` AS `organization.id`, `organization`.`name` AS `organization.name`"
        ));

        let many = Query::from_type("Contact").join_relation_select("emailAddresses", JoinKind::Left);
        let err = QueryBuilder::new(&schema).select(&many).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSelect);
    }

    #[test]
    fn test_group_having_order_limit() {
        let schema = schema();
        let query = Query::from_type("EmailAddress")
            .select(["contactId"])
            .select_as("id", "firstId")
            .group_by(["contactId"])
            .having(Criteria::new().compare("firstId", Comparator::Gt, 10))
            .order_by(OrderByField::desc("contactId"))
            .limit(5)
            .offset(10)
            .fetch_mode(FetchMode::Rows);
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert_eq!(
            normalized(&compiled),
            "SELECT `t`.`contactId`, `t`.`id` AS `firstId` FROM `email_address` `t` \
             GROUP BY `t`.`contactId` HAVING `firstId` > ? ORDER BY `t`.`contactId` DESC LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn test_raw_condition_with_bindings() {
        let schema = schema();
        let query = Query::from_type("EmailAddress")
            .where_raw("LOWER(`t`.`email`) = :needle")
            .bind("needle", "a@x.com");
        let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
        assert!(compiled.sql.ends_with("WHERE LOWER(`t`.`email`) = :needle"));
        assert_eq!(compiled.params, vec![(":needle".to_string(), Value::from("a@x.com"))]);
    }

    #[test]
    fn test_count() {
        let schema = schema();
        let query = Query::from_type("EmailAddress")
            .where_eq("contactId", 1)
            .order_by(OrderByField::asc("email"));
        let compiled = QueryBuilder::new(&schema).count(&query).unwrap();
        assert_eq!(
            normalized(&compiled),
            "SELECT COUNT(*) AS `count` FROM (SELECT `t`.* FROM `email_address` `t` WHERE `t`.`contactId` = ?) `counted`"
        );
    }

    #[test]
    fn test_write_statements() {
        let schema = schema();
        let builder = QueryBuilder::new(&schema);

        let mut values = IndexMap::new();
        values.insert("contactId".to_string(), Value::Int(1));
        values.insert("email".to_string(), Value::from("a@x.com"));
        let insert = builder.insert("email_address", &values).unwrap();
        assert_eq!(normalized(&insert), "INSERT INTO `email_address` (`contactId`, `email`) VALUES (?, ?)");

        let mut keys = IndexMap::new();
        keys.insert("id".to_string(), Value::Int(9));
        let update = builder.update("email_address", &values, &keys).unwrap();
        assert_eq!(
            normalized(&update),
            "UPDATE `email_address` SET `contactId` = ?, `email` = ? WHERE `id` = ?"
        );
        assert_eq!(update.params[2].1, Value::Int(9));

        let delete = builder
            .delete("contact_group", &Criteria::new().eq("contactId", 1).eq("groupId", 2))
            .unwrap();
        assert_eq!(normalized(&delete), "DELETE FROM `contact_group` WHERE `contactId` = ? AND `groupId` = ?");

        assert!(builder.delete("contact_group", &Criteria::new()).is_err());
    }

    #[test]
    fn test_query_without_record_type() {
        let schema = schema();
        let err = QueryBuilder::new(&schema).select(&Query::new()).unwrap_err();
        assert!(err.is_invalid_usage());
    }
}
