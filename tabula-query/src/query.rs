//! Select parameters.
//!
//! A [`Query`] only describes a select. It is compiled by
//! [`QueryBuilder`](crate::QueryBuilder) and executed by a
//! [`Store`](crate::Store). Cloning deep-copies joins and criteria.
//!
//! ```rust
//! use tabula_query::{Comparator, JoinKind, OrderByField, Query};
//!
//! let query = Query::from_type("Contact")
//!     .filter("name", Comparator::Like, "A%")
//!     .join_relation("emailAddresses", JoinKind::Left)
//!     .order_by(OrderByField::asc("name"))
//!     .limit(10);
//! assert!(query.relation_is_joined("emailAddresses"));
//! ```

use indexmap::IndexMap;

use crate::criteria::{Comparator, Condition, Criteria, Operand};
use crate::error::QueryResult;
use crate::types::{FetchMode, JoinKind, OrderByField, SelectItem};
use crate::value::Value;

/// Alias of the primary table unless [`Query::table_alias`] says otherwise.
pub const DEFAULT_ALIAS: &str = "t";

/// One join.
#[derive(Debug, Clone, PartialEq)]
pub enum Join {
    /// A join against an arbitrary table.
    Table {
        /// Table name.
        table: String,
        /// Alias used in conditions.
        alias: String,
        /// ON condition.
        on: Criteria,
        /// Join type.
        kind: JoinKind,
    },
    /// A join following a declared relation. Nested relations use a
    /// dot-separated path, which doubles as the alias.
    Relation {
        /// Relation path, e.g. `organization` or `organization.address`.
        path: String,
        /// Join type.
        kind: JoinKind,
        /// Add the target's columns to the select list as `path.column`.
        select: bool,
    },
}

impl Join {
    /// Alias this join introduces.
    pub fn alias(&self) -> &str {
        match self {
            Self::Table { alias, .. } => alias,
            Self::Relation { path, .. } => path,
        }
    }
}

/// Select parameters for one record type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub(crate) record_type: Option<String>,
    pub(crate) alias: Option<String>,
    pub(crate) select: Vec<SelectItem>,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<Join>,
    pub(crate) criteria: Criteria,
    pub(crate) group_by: Vec<String>,
    pub(crate) having: Criteria,
    pub(crate) order_by: Vec<OrderByField>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) with_deleted: bool,
    pub(crate) skip_permissions: bool,
    pub(crate) fetch_mode: FetchMode,
    pub(crate) bindings: Vec<(String, Value)>,
}

impl Query {
    /// Create an empty query. The record type is filled in by the session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a query over a record type.
    pub fn from_type(record_type: impl Into<String>) -> Self {
        Self {
            record_type: Some(record_type.into()),
            ..Self::default()
        }
    }

    /// Set the record type.
    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Select columns. Replaces the default `alias.*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select
            .extend(columns.into_iter().map(|c| SelectItem::Column(c.into())));
        self
    }

    /// Select a column under an output name.
    pub fn select_as(mut self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select.push(SelectItem::Aliased {
            column: column.into(),
            alias: alias.into(),
        });
        self
    }

    /// Select a raw expression.
    pub fn select_raw(mut self, expression: impl Into<String>) -> Self {
        self.select.push(SelectItem::Raw(expression.into()));
        self
    }

    /// SELECT DISTINCT.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Alias of the primary table.
    pub fn table_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// AND `column <op> operand`.
    pub fn filter(mut self, column: impl Into<String>, comparator: Comparator, operand: impl Into<Operand>) -> Self {
        self.criteria = self.criteria.compare(column, comparator, operand);
        self
    }

    /// AND `column = value`.
    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.filter(column, Comparator::Eq, value)
    }

    /// AND a group of conditions.
    pub fn and_where(mut self, criteria: Criteria) -> Self {
        self.criteria = if self.criteria.is_empty() {
            criteria
        } else {
            self.criteria.and_group(criteria)
        };
        self
    }

    /// OR a group of conditions.
    pub fn or_where(mut self, criteria: Criteria) -> Self {
        self.criteria = if self.criteria.is_empty() {
            criteria
        } else {
            self.criteria.or_group(criteria)
        };
        self
    }

    /// AND the shorthand map form, see [`Criteria::from_map`].
    pub fn where_map(self, map: IndexMap<String, Value>) -> QueryResult<Self> {
        Ok(self.and_where(Criteria::from_map(map)?))
    }

    /// AND literal SQL.
    pub fn where_raw(mut self, sql: impl Into<String>) -> Self {
        self.criteria = self.criteria.raw(sql);
        self
    }

    /// AND `EXISTS (subquery)`.
    pub fn where_exists(mut self, subquery: Query) -> Self {
        self.criteria = self.criteria.exists(subquery);
        self
    }

    /// AND a prepared condition.
    pub fn where_condition(mut self, condition: Condition) -> Self {
        self.criteria = self.criteria.and(condition);
        self
    }

    /// AND a condition outside everything filtered so far. Existing criteria
    /// are grouped first so an earlier OR cannot escape the constraint.
    pub fn constrain(mut self, condition: Condition) -> Self {
        self.criteria = std::mem::take(&mut self.criteria).grouped().and(condition);
        self
    }

    /// Join an arbitrary table.
    pub fn join(mut self, table: impl Into<String>, alias: impl Into<String>, on: Criteria, kind: JoinKind) -> Self {
        self.joins.push(Join::Table {
            table: table.into(),
            alias: alias.into(),
            on,
            kind,
        });
        self
    }

    /// Join a relation by path. Re-joining a path replaces the earlier join;
    /// missing parent paths are joined with the same kind.
    pub fn join_relation(self, path: impl Into<String>, kind: JoinKind) -> Self {
        self.push_relation_join(path.into(), kind, false)
    }

    /// Join a to-one relation and select its columns, so hydrated records come
    /// back with that relation already loaded.
    pub fn join_relation_select(self, path: impl Into<String>, kind: JoinKind) -> Self {
        self.push_relation_join(path.into(), kind, true)
    }

    fn push_relation_join(mut self, path: String, kind: JoinKind, select: bool) -> Self {
        let mut prefix = String::new();
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            if !self.relation_is_joined(&prefix) {
                self.joins.push(Join::Relation {
                    path: prefix.clone(),
                    kind,
                    select: false,
                });
            }
        }
        self.joins
            .retain(|j| !matches!(j, Join::Relation { path: p, .. } if *p == path));
        self.joins.push(Join::Relation { path, kind, select });
        self
    }

    /// Whether a relation path is already joined.
    pub fn relation_is_joined(&self, path: &str) -> bool {
        self.joins
            .iter()
            .any(|j| matches!(j, Join::Relation { path: p, .. } if p == path))
    }

    /// GROUP BY columns.
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    /// AND a HAVING group.
    pub fn having(mut self, criteria: Criteria) -> Self {
        self.having = if self.having.is_empty() {
            criteria
        } else {
            self.having.and_group(criteria)
        };
        self
    }

    /// Add an ORDER BY column.
    pub fn order_by(mut self, field: OrderByField) -> Self {
        self.order_by.push(field);
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Include soft-deleted rows.
    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    /// Do not apply the record type's permission constraints.
    pub fn skip_permissions(mut self) -> Self {
        self.skip_permissions = true;
        self
    }

    /// Fetch raw rows or hydrated records.
    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    /// Bind a named parameter referenced from raw SQL.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let name = if name.starts_with(':') { name } else { format!(":{}", name) };
        self.bindings.push((name, value.into()));
        self
    }

    // ============== Accessors ==============

    /// Target record type.
    pub fn get_record_type(&self) -> Option<&str> {
        self.record_type.as_deref()
    }

    /// Effective alias of the primary table.
    pub fn get_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(DEFAULT_ALIAS)
    }

    /// WHERE criteria.
    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Joins in order.
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Whether soft-deleted rows are included.
    pub fn includes_deleted(&self) -> bool {
        self.with_deleted
    }

    /// Whether permission constraints are skipped.
    pub fn skips_permissions(&self) -> bool {
        self.skip_permissions
    }

    /// Requested fetch mode.
    pub fn get_fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    /// Limit, if set.
    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_join_relation_adds_parents() {
        let query = Query::from_type("Contact").join_relation("organization.address", JoinKind::Left);
        let aliases: Vec<&str> = query.joins().iter().map(Join::alias).collect();
        assert_eq!(aliases, vec!["organization", "organization.address"]);
    }

    #[test]
    fn test_join_relation_replaces_same_path() {
        let query = Query::from_type("Contact")
            .join_relation("organization", JoinKind::Inner)
            .join_relation("organization", JoinKind::Left);
        assert_eq!(query.joins().len(), 1);
        assert!(matches!(query.joins()[0], Join::Relation { kind: JoinKind::Left, .. }));
    }

    #[test]
    fn test_clone_is_deep() {
        let base = Query::from_type("Contact").where_eq("name", "a");
        let child = base.clone().where_eq("id", 1).join_relation("organization", JoinKind::Inner);
        assert_eq!(base.criteria().len(), 1);
        assert!(base.joins().is_empty());
        assert_eq!(child.criteria().len(), 2);
    }

    #[test]
    fn test_and_or_where() {
        let query = Query::new()
            .where_eq("a", 1)
            .or_where(Criteria::new().eq("b", 2).eq("c", 3));
        assert_eq!(query.criteria().len(), 2);
    }

    #[test]
    fn test_bind_prefixes_colon() {
        let query = Query::new().bind("user", 3);
        assert_eq!(query.bindings[0].0, ":user");
    }

    #[test]
    fn test_default_alias() {
        assert_eq!(Query::new().get_alias(), "t");
        assert_eq!(Query::new().table_alias("c").get_alias(), "c");
    }
}
