//! Common types used in query building.

use std::borrow::Cow;
use std::fmt;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Null handling in sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullsOrder {
    /// Nulls appear first in the results.
    First,
    /// Nulls appear last in the results.
    Last,
}

impl NullsOrder {
    /// Get the SQL clause for this null order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::First => "NULLS FIRST",
            Self::Last => "NULLS LAST",
        }
    }
}

/// Ordering on a single column.
///
/// The column is a reference resolved by the compiler like any other column
/// (`name`, `alias.name` or `relation.path.name`). Raw expressions are copied
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByField {
    /// The column reference or raw expression.
    pub column: Cow<'static, str>,
    /// The sort order.
    pub order: SortOrder,
    /// Null handling (optional).
    pub nulls: Option<NullsOrder>,
    /// Copy `column` into the SQL without resolving it.
    pub raw: bool,
}

impl OrderByField {
    /// Create a new order by field.
    pub fn new(column: impl Into<Cow<'static, str>>, order: SortOrder) -> Self {
        Self {
            column: column.into(),
            order,
            nulls: None,
            raw: false,
        }
    }

    /// Create an ascending order.
    pub fn asc(column: impl Into<Cow<'static, str>>) -> Self {
        Self::new(column, SortOrder::Asc)
    }

    /// Create a descending order.
    pub fn desc(column: impl Into<Cow<'static, str>>) -> Self {
        Self::new(column, SortOrder::Desc)
    }

    /// Order by a raw SQL expression.
    pub fn raw(expression: impl Into<Cow<'static, str>>, order: SortOrder) -> Self {
        Self {
            raw: true,
            ..Self::new(expression, order)
        }
    }

    /// Set null handling.
    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }

    /// Write the clause for an already resolved column expression.
    ///
    /// ```rust
    /// use tabula_query::OrderByField;
    ///
    /// let field = OrderByField::desc("createdAt");
    /// let mut buffer = String::from("ORDER BY ");
    /// field.write_sql("`t`.`createdAt`", &mut buffer);
    /// assert_eq!(buffer, "ORDER BY `t`.`createdAt` DESC");
    /// ```
    #[inline]
    pub fn write_sql(&self, column_sql: &str, buffer: &mut String) {
        buffer.push_str(column_sql);
        buffer.push(' ');
        buffer.push_str(self.order.as_sql());
        if let Some(nulls) = self.nulls {
            buffer.push(' ');
            buffer.push_str(nulls.as_sql());
        }
    }
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectItem {
    /// A column reference, resolved like a WHERE column.
    Column(String),
    /// A column reference with an output alias.
    Aliased {
        /// Column reference.
        column: String,
        /// Output name.
        alias: String,
    },
    /// A raw expression, copied verbatim.
    Raw(String),
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinKind {
    /// INNER JOIN.
    #[default]
    Inner,
    /// LEFT JOIN.
    Left,
    /// RIGHT JOIN.
    Right,
}

impl JoinKind {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

/// How a [`Store`](crate::Store) materializes rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Hydrate records of the query's record type.
    #[default]
    Records,
    /// Return raw rows.
    Rows,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order() {
        assert_eq!(SortOrder::Asc.as_sql(), "ASC");
        assert_eq!(SortOrder::Desc.to_string(), "DESC");
    }

    #[test]
    fn test_order_by_field_write_sql() {
        let field = OrderByField::asc("name").nulls(NullsOrder::First);
        let mut buffer = String::new();
        field.write_sql("`t`.`name`", &mut buffer);
        assert_eq!(buffer, "`t`.`name` ASC NULLS FIRST");
    }

    #[test]
    fn test_raw_order() {
        let field = OrderByField::raw("RANDOM()", SortOrder::Asc);
        assert!(field.raw);
    }

    #[test]
    fn test_join_kind() {
        assert_eq!(JoinKind::default().as_sql(), "INNER JOIN");
        assert_eq!(JoinKind::Left.as_sql(), "LEFT JOIN");
    }
}
