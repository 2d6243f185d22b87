//! The schema registry.
//!
//! A [`Schema`] holds every record type's table, relations, permissions,
//! hooks and validators. It is built once by [`SchemaBuilder`], checked for
//! consistency, and shared read-only through an `Arc`.
//!
//! ```rust
//! use tabula_query::{Column, Relation, Schema, EntityDef, Table};
//!
//! let schema = Schema::builder()
//!     .entity(
//!         EntityDef::new("Contact", Table::new("contact").with_columns([
//!             Column::id("id"),
//!             Column::text("name", 100).required(),
//!         ]))
//!         .with_relation(Relation::has_many("emailAddresses", "EmailAddress").key("id", "contactId")),
//!     )
//!     .entity(EntityDef::new("EmailAddress", Table::new("email_address").with_columns([
//!         Column::id("id"),
//!         Column::int("contactId").required(),
//!         Column::text("email", 255),
//!     ])))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.entity("Contact").unwrap().table().name, "contact");
//! ```

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use convert_case::{Case, Casing};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::cache::{CacheBackend, CacheKey, NullCache};
use crate::error::{QueryError, QueryResult};
use crate::hooks::{NoHooks, RecordHooks};
use crate::permissions::{AllowAll, PermissionsModel};
use crate::relation::Relation;
use crate::table::{Column, Table};
use crate::validate::Validator;

/// Registry-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaConfig {
    /// Leading path segments dropped when deriving table names from Rust type
    /// paths. The default drops the crate name.
    pub strip_segments: usize,
    /// Column that marks a row as soft-deleted.
    pub soft_delete_column: String,
    /// Treat negative primary keys in relation payloads as "new".
    pub negative_keys_as_new: bool,
    /// Lifetime of memoized derivations in the cache.
    pub cache_ttl: Option<Duration>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            strip_segments: 1,
            soft_delete_column: "deleted".to_string(),
            negative_keys_as_new: true,
            cache_ttl: Some(Duration::from_secs(3600)),
        }
    }
}

impl SchemaConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `TABULA_STRIP_SEGMENTS` and
    /// `TABULA_NEGATIVE_KEYS_AS_NEW`.
    pub fn from_env() -> QueryResult<Self> {
        let mut config = Self::default();
        if let Ok(value) = env::var("TABULA_STRIP_SEGMENTS") {
            config.strip_segments = value.trim().parse().map_err(|_| {
                QueryError::configuration(format!("TABULA_STRIP_SEGMENTS must be a number, got '{}'", value))
            })?;
        }
        if let Ok(value) = env::var("TABULA_NEGATIVE_KEYS_AS_NEW") {
            config.negative_keys_as_new = matches!(value.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        Ok(config)
    }

    /// Set the number of stripped path segments.
    pub fn strip_segments(mut self, count: usize) -> Self {
        self.strip_segments = count;
        self
    }

    /// Set the soft-delete column.
    pub fn soft_delete_column(mut self, column: impl Into<String>) -> Self {
        self.soft_delete_column = column.into();
        self
    }

    /// Set whether negative keys mean "new".
    pub fn negative_keys_as_new(mut self, enabled: bool) -> Self {
        self.negative_keys_as_new = enabled;
        self
    }

    /// Set the memoization TTL.
    pub fn cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

/// Derive a table name from a Rust type path.
///
/// Drops `strip` leading segments, any `model` module segment and a trailing
/// `Model` suffix, then joins the snake-cased segments with `_`.
///
/// ```rust
/// use tabula_query::schema::derive_table_name;
///
/// assert_eq!(derive_table_name("app::addressbook::model::ContactGroup", 1), "addressbook_contact_group");
/// assert_eq!(derive_table_name("app::NoteModel", 1), "note");
/// ```
pub fn derive_table_name(type_path: &str, strip: usize) -> String {
    let path = type_path.split('<').next().unwrap_or(type_path);
    let segments: Vec<&str> = path.split("::").filter(|s| !s.is_empty()).collect();
    let start = strip.min(segments.len().saturating_sub(1));
    let last = segments.len().saturating_sub(1);

    let name = segments
        .iter()
        .enumerate()
        .skip(start)
        .filter(|(_, s)| !s.eq_ignore_ascii_case("model") && !s.eq_ignore_ascii_case("models"))
        .map(|(i, s)| {
            let s = if i == last && s.len() > 5 {
                s.strip_suffix("Model").unwrap_or(s)
            } else {
                s
            };
            s.to_case(Case::Snake)
        })
        .collect::<Vec<_>>()
        .join("_");

    if name.is_empty() {
        segments.last().map(|s| s.to_case(Case::Snake)).unwrap_or_default()
    } else {
        name
    }
}

/// A record type definition.
#[derive(Clone)]
pub struct EntityDef {
    name: String,
    type_path: Option<String>,
    table: Arc<Table>,
    relations: IndexMap<String, Arc<Relation>>,
    permissions: Arc<dyn PermissionsModel>,
    hooks: Arc<dyn RecordHooks>,
    validators: Vec<(String, Arc<dyn Validator>)>,
}

impl EntityDef {
    /// Define a record type over a table.
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            type_path: None,
            table: Arc::new(table),
            relations: IndexMap::new(),
            permissions: Arc::new(AllowAll),
            hooks: Arc::new(NoHooks),
            validators: Vec::new(),
        }
    }

    /// Define a record type from a [`Model`] implementation.
    pub fn from_model<M: Model>() -> Self {
        let table = Table::new(M::table_name().unwrap_or_default()).with_columns(M::columns());
        let mut def = Self::new(M::NAME, table)
            .with_permissions(M::permissions())
            .with_hooks(M::hooks());
        def.type_path = Some(std::any::type_name::<M>().to_string());
        for relation in M::relations() {
            def = def.with_relation(relation);
        }
        for (column, validator) in M::validators() {
            def = def.with_validator(column, validator);
        }
        def
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: Relation) -> Self {
        let relation = relation.bind_owner(&self.name);
        self.relations.insert(relation.name.clone(), Arc::new(relation));
        self
    }

    /// Set the permissions model.
    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionsModel>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Set the lifecycle hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn RecordHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Add a validator for a column.
    pub fn with_validator(mut self, column: impl Into<String>, validator: Arc<dyn Validator>) -> Self {
        self.validators.push((column.into(), validator));
        self
    }

    /// Record type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table metadata.
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Relations by name.
    pub fn relations(&self) -> &IndexMap<String, Arc<Relation>> {
        &self.relations
    }

    /// Look up a relation.
    pub fn relation(&self, name: &str) -> Option<&Arc<Relation>> {
        self.relations.get(name)
    }

    /// Permissions model.
    pub fn permissions(&self) -> &Arc<dyn PermissionsModel> {
        &self.permissions
    }

    /// Lifecycle hooks.
    pub fn hooks(&self) -> &Arc<dyn RecordHooks> {
        &self.hooks
    }

    /// Declared validators.
    pub fn validators(&self) -> &[(String, Arc<dyn Validator>)] {
        &self.validators
    }
}

impl fmt::Debug for EntityDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDef")
            .field("name", &self.name)
            .field("table", &self.table.name)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A Rust type that declares a record type.
///
/// ```rust
/// use tabula_query::{Column, Model, Relation};
///
/// struct Contact;
///
/// impl Model for Contact {
///     const NAME: &'static str = "Contact";
///
///     fn columns() -> Vec<Column> {
///         vec![Column::id("id"), Column::text("name", 100).required()]
///     }
///
///     fn relations() -> Vec<Relation> {
///         vec![Relation::has_many("emailAddresses", "EmailAddress").key("id", "contactId")]
///     }
/// }
/// ```
pub trait Model: 'static {
    /// Record type name used in queries and relations.
    const NAME: &'static str;

    /// Column metadata.
    fn columns() -> Vec<Column>;

    /// Declared relations.
    fn relations() -> Vec<Relation> {
        Vec::new()
    }

    /// Explicit table name. Derived from the type path when `None`.
    fn table_name() -> Option<String> {
        None
    }

    /// Permissions model.
    fn permissions() -> Arc<dyn PermissionsModel> {
        Arc::new(AllowAll)
    }

    /// Lifecycle hooks.
    fn hooks() -> Arc<dyn RecordHooks> {
        Arc::new(NoHooks)
    }

    /// Column validators.
    fn validators() -> Vec<(String, Arc<dyn Validator>)> {
        Vec::new()
    }
}

/// Immutable registry of record types.
pub struct Schema {
    config: SchemaConfig,
    entities: IndexMap<String, Arc<EntityDef>>,
}

impl Schema {
    /// Start building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Registry settings.
    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// Look up a record type.
    pub fn entity(&self, name: &str) -> QueryResult<&Arc<EntityDef>> {
        self.entities
            .get(name)
            .ok_or_else(|| QueryError::unknown_type(name))
    }

    /// Look up a relation of a record type.
    pub fn relation(&self, record_type: &str, name: &str) -> QueryResult<&Arc<Relation>> {
        self.entity(record_type)?
            .relation(name)
            .ok_or_else(|| QueryError::unknown_relation(record_type, name))
    }

    /// All record types in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityDef>> {
        self.entities.values()
    }

    /// Whether the record type has a soft-delete column.
    pub fn is_soft_deletable(&self, entity: &EntityDef) -> bool {
        entity.table.has_column(&self.config.soft_delete_column)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("config", &self.config)
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Schema`].
pub struct SchemaBuilder {
    config: SchemaConfig,
    cache: Arc<dyn CacheBackend>,
    entities: Vec<EntityDef>,
}

impl SchemaBuilder {
    /// Create a builder with the default configuration and no cache.
    pub fn new() -> Self {
        Self {
            config: SchemaConfig::default(),
            cache: Arc::new(NullCache),
            entities: Vec::new(),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: SchemaConfig) -> Self {
        self.config = config;
        self
    }

    /// Memoize derivations in `cache`.
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = cache;
        self
    }

    /// Register a record type.
    pub fn entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Register a [`Model`].
    pub fn model<M: Model>(self) -> Self {
        self.entity(EntityDef::from_model::<M>())
    }

    fn table_name_for(&self, type_path: &str) -> String {
        let key = CacheKey::table_name(&format!("{}#{}", type_path, self.config.strip_segments));
        match self.cache.get(&key) {
            Ok(Some(serde_json::Value::String(name))) => return name,
            Ok(_) => {}
            Err(e) => warn!(error = %e, "table name cache lookup failed"),
        }
        let name = derive_table_name(type_path, self.config.strip_segments);
        if let Err(e) = self.cache.set(&key, serde_json::Value::String(name.clone()), self.config.cache_ttl) {
            warn!(error = %e, "table name cache store failed");
        }
        name
    }

    /// Resolve derived names, check consistency and freeze the registry.
    pub fn build(self) -> QueryResult<Schema> {
        let mut entities: IndexMap<String, Arc<EntityDef>> = IndexMap::new();
        for mut entity in self.entities.iter().cloned() {
            if entity.table.name.is_empty() {
                let type_path = entity.type_path.clone().ok_or_else(|| {
                    QueryError::configuration(format!("Record type '{}' has no table name", entity.name))
                })?;
                let mut table = (*entity.table).clone();
                table.name = self.table_name_for(&type_path);
                entity.table = Arc::new(table);
            }
            if entities.contains_key(&entity.name) {
                return Err(QueryError::configuration(format!(
                    "Record type '{}' is registered twice",
                    entity.name
                )));
            }
            debug!(entity = %entity.name, table = %entity.table.name, "registered record type");
            entities.insert(entity.name.clone(), Arc::new(entity));
        }

        for entity in entities.values() {
            check_entity(entity, &entities)?;
        }

        Ok(Schema {
            config: self.config,
            entities,
        })
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_entity(entity: &EntityDef, entities: &IndexMap<String, Arc<EntityDef>>) -> QueryResult<()> {
    let table = &entity.table;
    if table.primary_key().is_empty() {
        return Err(QueryError::configuration(format!("Record type '{}' has no primary key", entity.name)));
    }
    for (column, _) in &entity.validators {
        if !table.has_column(column) {
            return Err(QueryError::unknown_column(&entity.name, column));
        }
    }

    for relation in entity.relations.values() {
        let context = |msg: String| {
            QueryError::configuration(msg)
                .with_model(&entity.name)
                .with_field(&relation.name)
        };
        if table.has_column(&relation.name) {
            return Err(context(format!(
                "Relation '{}' collides with a column of the same name",
                relation.name
            )));
        }
        if relation.keys.is_empty() {
            return Err(context(format!("Relation '{}' has no keys", relation.name)));
        }
        let target = entities
            .get(&relation.to_type)
            .ok_or_else(|| QueryError::unknown_type(&relation.to_type).with_field(&relation.name))?;

        let key_side = match &relation.via {
            Some(via) => {
                let link = entities
                    .get(&via.record_type)
                    .ok_or_else(|| QueryError::unknown_type(&via.record_type).with_field(&relation.name))?;
                for (link_column, target_column) in &via.keys {
                    if !link.table.has_column(link_column) {
                        return Err(QueryError::unknown_column(&via.record_type, link_column));
                    }
                    if !target.table.has_column(target_column) {
                        return Err(QueryError::unknown_column(&relation.to_type, target_column));
                    }
                }
                link
            }
            None => target,
        };
        for (local, foreign) in &relation.keys {
            if !table.has_column(local) {
                return Err(QueryError::unknown_column(&entity.name, local));
            }
            if !key_side.table.has_column(foreign) {
                return Err(QueryError::unknown_column(&key_side.name, foreign));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use pretty_assertions::assert_eq;

    struct Note;

    impl Model for Note {
        const NAME: &'static str = "Note";

        fn columns() -> Vec<Column> {
            vec![Column::id("id"), Column::text("title", 50)]
        }
    }

    #[test]
    fn test_derive_table_name() {
        assert_eq!(derive_table_name("app::notes::model::Note", 1), "notes_note");
        assert_eq!(derive_table_name("app::ContactModel", 1), "contact");
        assert_eq!(derive_table_name("app::calendar::CalendarEvent", 2), "calendar_event");
        assert_eq!(derive_table_name("Model", 5), "model");
    }

    #[test]
    fn test_model_table_name_is_derived_and_cached() {
        let cache = Arc::new(MemoryCache::default());
        let schema = Schema::builder().cache(cache.clone()).model::<Note>().build().unwrap();
        let table = &schema.entity("Note").unwrap().table().name;
        assert_eq!(table, &derive_table_name(std::any::type_name::<Note>(), 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unknown_relation_target() {
        let err = Schema::builder()
            .entity(
                EntityDef::new("A", Table::new("a").column(Column::id("id")))
                    .with_relation(Relation::has_many("bs", "B").key("id", "aId")),
            )
            .build()
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::UnknownRecordType);
    }

    #[test]
    fn test_relation_column_collision() {
        let err = Schema::builder()
            .entity(
                EntityDef::new("A", Table::new("a").with_columns([Column::id("id"), Column::int("self")]))
                    .with_relation(Relation::belongs_to("self", "A").key("self", "id")),
            )
            .build()
            .unwrap_err();
        assert!(err.message.contains("collides"));
    }

    #[test]
    fn test_missing_key_column() {
        let err = Schema::builder()
            .entity(
                EntityDef::new("A", Table::new("a").column(Column::id("id")))
                    .with_relation(Relation::belongs_to("parent", "A").key("parentId", "id")),
            )
            .build()
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::UnknownProperty);
    }

    #[test]
    fn test_schema_config_builder() {
        let config = SchemaConfig::new().strip_segments(2).negative_keys_as_new(false);
        assert_eq!(config.strip_segments, 2);
        assert!(!config.negative_keys_as_new);
        assert_eq!(config.soft_delete_column, "deleted");
    }
}
