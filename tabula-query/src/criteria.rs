//! Condition trees for WHERE, HAVING and ON clauses.
//!
//! A [`Criteria`] is an ordered list of `(connective, condition)` pairs. The
//! connective of the first pair is ignored when compiling. Nested groups are
//! parenthesized.
//!
//! ```rust
//! use tabula_query::{Comparator, Criteria};
//!
//! let criteria = Criteria::new()
//!     .eq("status", "active")
//!     .or_group(Criteria::new().compare("age", Comparator::Gte, 18).eq("verified", true));
//! assert_eq!(criteria.len(), 2);
//! ```

use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::query::Query;
use crate::value::Value;

/// How a condition joins the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    /// AND.
    And,
    /// OR.
    Or,
}

impl Connective {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `IS`, only valid with null.
    Is,
    /// `IS NOT`, only valid with null.
    IsNot,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
}

impl Comparator {
    /// Parse an operator token such as `">="` or `"not in"`.
    pub fn parse(token: &str) -> Option<Self> {
        let normalized = token.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        Some(match normalized.as_str() {
            "=" | "==" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "like" => Self::Like,
            "not like" => Self::NotLike,
            "is" => Self::Is,
            "is not" | "not is" => Self::IsNot,
            "in" => Self::In,
            "not in" => Self::NotIn,
            _ => return None,
        })
    }

    /// SQL operator text.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }

    /// Equality-like comparators that accept null and lists.
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Eq | Self::Is | Self::In)
    }

    /// Inequality-like comparators that accept null and lists.
    pub fn is_negative(&self) -> bool {
        matches!(self, Self::NotEq | Self::IsNot | Self::NotIn)
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A bound value. Lists become IN-lists.
    Value(Value),
    /// A sub-select.
    Query(Box<Query>),
}

macro_rules! operand_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(v: $ty) -> Self {
                    Self::Value(v.into())
                }
            }
        )*
    };
}

operand_from_value!(Value, bool, i32, i64, u32, f64, String, &str, Vec<Value>, Vec<i64>, Vec<&str>);

impl From<Query> for Operand {
    fn from(q: Query) -> Self {
        Self::Query(Box::new(q))
    }
}

/// A single condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Literal SQL copied verbatim, with optional named bindings.
    Raw {
        /// SQL text.
        sql: String,
        /// Bindings referenced by name from the text.
        params: Vec<(String, Value)>,
    },
    /// `column <op> operand`.
    Compare {
        /// Column reference, optionally qualified by alias or relation path.
        column: String,
        /// Operator.
        comparator: Comparator,
        /// Right-hand side.
        operand: Operand,
    },
    /// `[NOT] EXISTS (subquery)`.
    Exists {
        /// Compile as NOT EXISTS.
        negated: bool,
        /// The correlated subquery.
        query: Box<Query>,
    },
    /// Parenthesized sub-criteria.
    Group(Criteria),
}

/// Boolean condition tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    items: Vec<(Connective, Condition)>,
}

impl Criteria {
    /// Create empty criteria. Empty criteria are always true.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there are no conditions.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of top-level conditions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Top-level `(connective, condition)` pairs.
    pub fn items(&self) -> &[(Connective, Condition)] {
        &self.items
    }

    /// Append a condition.
    pub fn push(mut self, connective: Connective, condition: Condition) -> Self {
        self.items.push((connective, condition));
        self
    }

    /// AND a condition.
    pub fn and(self, condition: Condition) -> Self {
        self.push(Connective::And, condition)
    }

    /// OR a condition.
    pub fn or(self, condition: Condition) -> Self {
        self.push(Connective::Or, condition)
    }

    /// AND `column = value`.
    pub fn eq(self, column: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.compare(column, Comparator::Eq, value)
    }

    /// AND `column <op> operand`.
    pub fn compare(
        self,
        column: impl Into<String>,
        comparator: Comparator,
        operand: impl Into<Operand>,
    ) -> Self {
        self.and(Condition::Compare {
            column: column.into(),
            comparator,
            operand: operand.into(),
        })
    }

    /// OR `column <op> operand`.
    pub fn or_compare(
        self,
        column: impl Into<String>,
        comparator: Comparator,
        operand: impl Into<Operand>,
    ) -> Self {
        self.or(Condition::Compare {
            column: column.into(),
            comparator,
            operand: operand.into(),
        })
    }

    /// AND literal SQL.
    pub fn raw(self, sql: impl Into<String>) -> Self {
        self.and(Condition::Raw {
            sql: sql.into(),
            params: Vec::new(),
        })
    }

    /// AND a nested group. Empty groups are skipped.
    pub fn and_group(self, group: Criteria) -> Self {
        if group.is_empty() {
            return self;
        }
        self.and(Condition::Group(group))
    }

    /// OR a nested group. Empty groups are skipped.
    pub fn or_group(self, group: Criteria) -> Self {
        if group.is_empty() {
            return self;
        }
        self.or(Condition::Group(group))
    }

    /// AND `EXISTS (query)`.
    pub fn exists(self, query: Query) -> Self {
        self.and(Condition::Exists {
            negated: false,
            query: Box::new(query),
        })
    }

    /// AND `NOT EXISTS (query)`.
    pub fn not_exists(self, query: Query) -> Self {
        self.and(Condition::Exists {
            negated: true,
            query: Box::new(query),
        })
    }

    /// Parse the shorthand map form.
    ///
    /// Keys are a column reference optionally followed by an operator, e.g.
    /// `"age >="` or `"status not in"`. A bare column compares with `=`.
    pub fn from_map(map: IndexMap<String, Value>) -> QueryResult<Self> {
        let mut criteria = Self::new();
        for (key, value) in map {
            let key = key.trim();
            let (column, comparator) = match key.split_once(char::is_whitespace) {
                Some((column, op)) => {
                    let comparator = Comparator::parse(op).ok_or_else(|| {
                        QueryError::invalid_filter(format!("Unknown operator '{}' in condition '{}'", op.trim(), key))
                    })?;
                    (column, comparator)
                }
                None => (key, Comparator::Eq),
            };
            if column.is_empty() {
                return Err(QueryError::invalid_filter("Condition key has no column"));
            }
            criteria = criteria.compare(column, comparator, value);
        }
        Ok(criteria)
    }

    /// Wrap these criteria in a single group so further ANDs bind outside it.
    pub fn grouped(self) -> Self {
        if self.items.len() <= 1 {
            return self;
        }
        Self::new().and(Condition::Group(self))
    }
}
