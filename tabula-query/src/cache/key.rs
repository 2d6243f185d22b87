//! Cache key construction.

use std::fmt::{self, Display};

/// A namespaced cache key, rendered as `tabula:{namespace}:{identifier}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    prefix: String,
    namespace: String,
    identifier: String,
}

impl CacheKey {
    /// Create a key with the default `tabula` prefix.
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::with_prefix("tabula", namespace, identifier)
    }

    /// Create a key with a custom prefix.
    pub fn with_prefix(
        prefix: impl Into<String>,
        namespace: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            namespace: namespace.into(),
            identifier: identifier.into(),
        }
    }

    /// Key for a derived table name.
    pub fn table_name(type_name: &str) -> Self {
        Self::new("table_name", type_name)
    }

    /// Key for one record of a record type.
    pub fn record<I: Display>(record_type: &str, id: I) -> Self {
        Self::new(record_type, format!("id:{}", id))
    }

    /// The rendered key.
    pub fn as_str(&self) -> String {
        format!("{}:{}:{}", self.prefix, self.namespace, self.identifier)
    }

    /// The namespace segment.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The identifier segment.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.prefix, self.namespace, self.identifier)
    }
}
