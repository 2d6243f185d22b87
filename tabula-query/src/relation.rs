//! Relation metadata.
//!
//! A [`Relation`] is a named edge from one record type to another. Direction
//! is declared, not inferred: [`Relation::belongs_to`] marks the side that
//! stores the foreign key, every other constructor marks the owning side.
//!
//! ```rust
//! use tabula_query::{DeleteAction, Relation};
//!
//! let emails = Relation::has_many("emailAddresses", "EmailAddress")
//!     .key("id", "contactId")
//!     .on_delete(DeleteAction::Cascade);
//! assert!(emails.is_many());
//! assert!(!emails.is_belongs_to());
//!
//! let groups = Relation::has_many("groups", "Group")
//!     .key("id", "contactId")
//!     .via("ContactGroup", [("groupId", "id")]);
//! assert!(groups.is_via());
//! ```

use indexmap::IndexMap;

/// What happens to related records when the owner is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeleteAction {
    /// Leave related records alone.
    #[default]
    None,
    /// Refuse to delete while related records exist.
    Restrict,
    /// Delete related records first.
    Cascade,
}

/// Which side of the relation holds the foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// This record stores the key of the target. The target is saved first.
    BelongsTo,
    /// The target (or the link row) stores this record's key. The target is
    /// saved after this record.
    Owns,
}

/// Link table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    /// Record type of the link table.
    pub record_type: String,
    /// Link column to target column.
    pub keys: IndexMap<String, String>,
}

/// Metadata for one named relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Relation name, unique among the owner's columns and relations.
    pub name: String,
    /// Owner record type. Filled in when the owner is registered.
    pub from_type: String,
    /// Target record type.
    pub to_type: String,
    /// Owner column to target column, or to link column for via relations.
    pub keys: IndexMap<String, String>,
    /// Whether the relation resolves to a collection.
    pub has_many: bool,
    /// Key ownership.
    pub direction: Direction,
    /// Link table, for many-to-many relations.
    pub via: Option<Via>,
    /// Delete policy.
    pub delete_action: DeleteAction,
}

impl Relation {
    fn new(name: impl Into<String>, to_type: impl Into<String>, has_many: bool, direction: Direction) -> Self {
        Self {
            name: name.into(),
            from_type: String::new(),
            to_type: to_type.into(),
            keys: IndexMap::new(),
            has_many,
            direction,
            via: None,
            delete_action: DeleteAction::None,
        }
    }

    /// This record stores the target's key (many-to-one).
    pub fn belongs_to(name: impl Into<String>, to_type: impl Into<String>) -> Self {
        Self::new(name, to_type, false, Direction::BelongsTo)
    }

    /// The target stores this record's key, at most one target.
    pub fn has_one(name: impl Into<String>, to_type: impl Into<String>) -> Self {
        Self::new(name, to_type, false, Direction::Owns)
    }

    /// The targets store this record's key.
    pub fn has_many(name: impl Into<String>, to_type: impl Into<String>) -> Self {
        Self::new(name, to_type, true, Direction::Owns)
    }

    /// Add a key pair: owner column to target (or link) column.
    pub fn key(mut self, local: impl Into<String>, foreign: impl Into<String>) -> Self {
        self.keys.insert(local.into(), foreign.into());
        self
    }

    /// Route through a link table. `keys` maps link columns to target columns.
    pub fn via<L, F>(mut self, record_type: impl Into<String>, keys: impl IntoIterator<Item = (L, F)>) -> Self
    where
        L: Into<String>,
        F: Into<String>,
    {
        self.direction = Direction::Owns;
        self.via = Some(Via {
            record_type: record_type.into(),
            keys: keys.into_iter().map(|(l, f)| (l.into(), f.into())).collect(),
        });
        self
    }

    /// Set the delete policy.
    pub fn on_delete(mut self, action: DeleteAction) -> Self {
        self.delete_action = action;
        self
    }

    pub(crate) fn bind_owner(mut self, from_type: &str) -> Self {
        self.from_type = from_type.to_string();
        self
    }

    /// The owner stores the key.
    pub fn is_belongs_to(&self) -> bool {
        self.direction == Direction::BelongsTo
    }

    /// Routed through a link table.
    pub fn is_via(&self) -> bool {
        self.via.is_some()
    }

    /// Resolves to a collection.
    pub fn is_many(&self) -> bool {
        self.has_many
    }

    /// Whether `other` is this relation seen from the target's side: it points
    /// back at our owner with mirrored keys.
    pub fn is_reverse_of(&self, other: &Relation) -> bool {
        if self.is_via() || other.is_via() {
            return false;
        }
        self.to_type == other.from_type
            && self.from_type == other.to_type
            && self.direction != other.direction
            && self.keys.len() == other.keys.len()
            && self
                .keys
                .iter()
                .all(|(local, foreign)| other.keys.get(foreign) == Some(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let rel = Relation::belongs_to("organization", "Organization").key("organizationId", "id");
        assert!(rel.is_belongs_to());
        assert!(!rel.is_many());
        assert_eq!(rel.keys.get("organizationId"), Some(&"id".to_string()));
        assert_eq!(rel.delete_action, DeleteAction::None);
    }

    #[test]
    fn test_reverse_detection() {
        let emails = Relation::has_many("emailAddresses", "EmailAddress")
            .key("id", "contactId")
            .bind_owner("Contact");
        let contact = Relation::belongs_to("contact", "Contact")
            .key("contactId", "id")
            .bind_owner("EmailAddress");
        let other = Relation::belongs_to("owner", "Contact")
            .key("ownerId", "id")
            .bind_owner("EmailAddress");

        assert!(emails.is_reverse_of(&contact));
        assert!(contact.is_reverse_of(&emails));
        assert!(!emails.is_reverse_of(&other));
    }

    #[test]
    fn test_via_is_never_reversed() {
        let groups = Relation::has_many("groups", "Group")
            .key("id", "contactId")
            .via("ContactGroup", [("groupId", "id")])
            .bind_owner("Contact");
        let back = Relation::belongs_to("contact", "Contact")
            .key("contactId", "id")
            .bind_owner("Group");
        assert!(!groups.is_reverse_of(&back));
    }
}
