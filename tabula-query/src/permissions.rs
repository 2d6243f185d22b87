//! Permission models.
//!
//! Every record type carries a [`PermissionsModel`]. It answers whether the
//! acting user may perform an action on a record, and it constrains queries so
//! only readable rows come back.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::criteria::{Comparator, Condition};
use crate::error::{QueryError, QueryResult};
use crate::query::Query;
use crate::record::Record;
use crate::schema::Schema;
use crate::sql::quote_qualified;
use crate::value::Value;

/// What the user wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Read the record.
    Read,
    /// Update or delete the record.
    Write,
    /// Insert the record.
    Create,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Create => "create",
        })
    }
}

/// The acting user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    /// User id, `None` when anonymous.
    pub id: Option<i64>,
    /// Admins bypass permission checks of the built-in models.
    pub admin: bool,
    /// Group ids the user belongs to.
    pub groups: Vec<i64>,
}

impl UserContext {
    /// An anonymous user.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A regular user.
    pub fn user(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// An administrator.
    pub fn admin(id: i64) -> Self {
        Self {
            id: Some(id),
            admin: true,
            groups: Vec::new(),
        }
    }

    /// Set the group memberships.
    pub fn with_groups(mut self, groups: impl IntoIterator<Item = i64>) -> Self {
        self.groups = groups.into_iter().collect();
        self
    }
}

/// Permission predicate for one record type.
pub trait PermissionsModel: Send + Sync {
    /// Whether `user` may perform `action` on `record`.
    fn can(&self, action: Action, record: &Record, user: &UserContext) -> QueryResult<bool>;

    /// Constrain a query to the rows `user` may read.
    fn apply_to_query(&self, _query: &mut Query, _user: &UserContext, _schema: &Schema) -> QueryResult<()> {
        Ok(())
    }

    /// Side effects before a new record is inserted.
    fn before_create(&self, _record: &mut Record, _user: &UserContext) -> QueryResult<()> {
        Ok(())
    }
}

/// Everyone may do everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionsModel for AllowAll {
    fn can(&self, _action: Action, _record: &Record, _user: &UserContext) -> QueryResult<bool> {
        Ok(true)
    }
}

/// Records belong to the user stored in an owner column.
///
/// Anyone signed in may create; only the owner (or an admin) may read and
/// write. New records are stamped with the acting user.
#[derive(Debug, Clone)]
pub struct OwnerPermissions {
    column: String,
}

impl OwnerPermissions {
    /// Use `column` as the owner column.
    pub fn new(column: impl Into<String>) -> Self {
        Self { column: column.into() }
    }
}

impl PermissionsModel for OwnerPermissions {
    fn can(&self, action: Action, record: &Record, user: &UserContext) -> QueryResult<bool> {
        if user.admin {
            return Ok(true);
        }
        let Some(id) = user.id else {
            return Ok(false);
        };
        Ok(match action {
            Action::Create => true,
            Action::Read | Action::Write => record.value(&self.column) == Some(&Value::Int(id)),
        })
    }

    fn apply_to_query(&self, query: &mut Query, user: &UserContext, _schema: &Schema) -> QueryResult<()> {
        if user.admin {
            return Ok(());
        }
        let condition = match user.id {
            Some(id) => Condition::Compare {
                column: format!("{}.{}", query.get_alias(), self.column),
                comparator: Comparator::Eq,
                operand: Value::Int(id).into(),
            },
            None => Condition::Raw {
                sql: "1 = 0".to_string(),
                params: Vec::new(),
            },
        };
        *query = std::mem::take(query).constrain(condition);
        Ok(())
    }

    fn before_create(&self, record: &mut Record, user: &UserContext) -> QueryResult<()> {
        if let Some(id) = user.id {
            if record.value(&self.column).is_none_or(Value::is_null) {
                record.set_value(&self.column, Value::Int(id))?;
            }
        }
        Ok(())
    }
}

/// Delegates to the record reached through a named relation.
///
/// A record is readable when its related record is readable, and writable
/// (or creatable) when its related record is writable. Queries are
/// constrained with a correlated `EXISTS` over the related type, which in turn
/// carries that type's own constraints.
#[derive(Clone)]
pub struct RelayPermissions {
    relation: String,
}

impl RelayPermissions {
    /// Delegate through `relation`.
    pub fn new(relation: impl Into<String>) -> Self {
        Self { relation: relation.into() }
    }
}

impl fmt::Debug for RelayPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayPermissions").field("relation", &self.relation).finish()
    }
}

impl PermissionsModel for RelayPermissions {
    fn can(&self, action: Action, record: &Record, user: &UserContext) -> QueryResult<bool> {
        if user.admin {
            return Ok(true);
        }
        let session = record.session();
        let relation = session.schema().relation(record.record_type(), &self.relation)?;
        if relation.is_via() {
            return Err(QueryError::invalid_usage("Permissions cannot be relayed through a via relation"));
        }

        let mut query = Query::from_type(relation.to_type.as_str()).skip_permissions().limit(1);
        for (local, foreign) in &relation.keys {
            match record.value(local) {
                Some(value) if !value.is_null() => query = query.where_eq(foreign.as_str(), value.clone()),
                _ => return Ok(false),
            }
        }
        let Some(target) = session.find_with(query)?.single()? else {
            trace!(relation = %self.relation, "relay target missing");
            return Ok(false);
        };

        let delegated = match action {
            Action::Read => Action::Read,
            Action::Write | Action::Create => Action::Write,
        };
        let target_entity = session.schema().entity(&relation.to_type)?;
        let target = target.borrow();
        target_entity.permissions().can(delegated, &target, user)
    }

    fn apply_to_query(&self, query: &mut Query, user: &UserContext, schema: &Schema) -> QueryResult<()> {
        if user.admin {
            return Ok(());
        }
        let owner_type = query
            .get_record_type()
            .ok_or_else(|| QueryError::invalid_usage("Query has no record type"))?
            .to_string();
        let relation: Arc<_> = schema.relation(&owner_type, &self.relation)?.clone();
        if relation.is_via() {
            return Err(QueryError::invalid_usage("Permissions cannot be relayed through a via relation"));
        }

        let owner_alias = query.get_alias().to_string();
        let alias = format!("relay_{}", relation.name);
        let mut sub = Query::from_type(relation.to_type.as_str())
            .table_alias(alias.as_str())
            .select_raw("1");
        for (local, foreign) in &relation.keys {
            sub = sub.where_condition(Condition::Raw {
                sql: format!(
                    "{} = {}",
                    quote_qualified(&alias, foreign)?,
                    quote_qualified(&owner_alias, local)?
                ),
                params: Vec::new(),
            });
        }
        schema
            .entity(&relation.to_type)?
            .permissions()
            .apply_to_query(&mut sub, user, schema)?;

        *query = std::mem::take(query).constrain(Condition::Exists {
            negated: false,
            query: Box::new(sub),
        });
        Ok(())
    }
}
