//! Per-record-type lifecycle hooks.

use crate::error::QueryResult;
use crate::record::Record;

/// Extension points called during save and delete.
///
/// Registered once per record type on the schema. Every method has a no-op
/// default.
pub trait RecordHooks: Send + Sync {
    /// Runs before validation. Returning `Ok(false)` aborts the save without
    /// touching storage.
    fn before_save(&self, _record: &mut Record) -> QueryResult<bool> {
        Ok(true)
    }

    /// Runs before restrict checks and cascades. Returning `Ok(false)` aborts
    /// the delete.
    fn before_delete(&self, _record: &mut Record, _hard: bool) -> QueryResult<bool> {
        Ok(true)
    }

    /// Runs once the outermost save committed.
    fn after_commit(&self, _record: &Record) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl RecordHooks for NoHooks {}
