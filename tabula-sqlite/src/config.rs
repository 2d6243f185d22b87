//! SQLite configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{SqliteError, SqliteResult};

/// Environment variable read by [`SqliteConfig::from_env`].
pub const DATABASE_URL_VAR: &str = "TABULA_DATABASE_URL";

/// SQLite database configuration.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database path (or ":memory:" for in-memory).
    pub path: DatabasePath,
    /// Enforce foreign keys.
    pub foreign_keys: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u32>,
    /// Synchronous mode.
    pub synchronous: SynchronousMode,
    /// Journal mode.
    pub journal_mode: JournalMode,
}

/// Database path configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabasePath {
    /// In-memory database.
    #[default]
    Memory,
    /// File-based database.
    File(PathBuf),
}

impl DatabasePath {
    /// Check if this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

/// SQLite synchronous mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SynchronousMode {
    /// Synchronous OFF - Fastest but unsafe.
    Off,
    /// Synchronous NORMAL - Good balance.
    #[default]
    Normal,
    /// Synchronous FULL - Safe but slower.
    Full,
}

impl SynchronousMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }

    fn parse(value: &str) -> SqliteResult<Self> {
        match value.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "normal" => Ok(Self::Normal),
            "full" => Ok(Self::Full),
            other => Err(SqliteError::config(format!("unknown synchronous mode '{}'", other))),
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JournalMode {
    /// DELETE - Default mode, deletes journal after transaction.
    #[default]
    Delete,
    /// TRUNCATE - Truncates journal instead of deleting.
    Truncate,
    /// MEMORY - Keep journal in memory.
    Memory,
    /// WAL - Write-Ahead Logging.
    Wal,
}

impl JournalMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
        }
    }

    fn parse(value: &str) -> SqliteResult<Self> {
        match value.to_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "truncate" => Ok(Self::Truncate),
            "memory" => Ok(Self::Memory),
            "wal" => Ok(Self::Wal),
            other => Err(SqliteError::config(format!("unknown journal mode '{}'", other))),
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: DatabasePath::Memory,
            foreign_keys: true,
            busy_timeout_ms: Some(5000),
            synchronous: SynchronousMode::Normal,
            journal_mode: JournalMode::Delete,
        }
    }
}

impl SqliteConfig {
    /// Create a new configuration for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a new configuration for a file-based database.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: DatabasePath::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Parse a SQLite URL into configuration.
    ///
    /// Supported formats:
    /// - `sqlite::memory:` - In-memory database
    /// - `sqlite://path/to/db.sqlite` - File-based database
    /// - `sqlite:///absolute/path/db.sqlite` - Absolute path
    /// - `file:path/to/db.sqlite` - Alternative format
    ///
    /// Options follow a `?`: `foreign_keys`, `busy_timeout`, `synchronous`
    /// and `journal_mode`.
    pub fn from_url(url: impl AsRef<str>) -> SqliteResult<Self> {
        let url = url.as_ref().trim();
        let (location, options) = match url.split_once('?') {
            Some((location, options)) => (location, Some(options)),
            None => (url, None),
        };

        let mut config = if location == "sqlite::memory:" || location == ":memory:" {
            Self::memory()
        } else if let Some(path) = location.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(SqliteError::config("database path is required"));
            }
            Self::file(path)
        } else if let Some(path) = location.strip_prefix("sqlite:") {
            if path == ":memory:" {
                Self::memory()
            } else if path.is_empty() {
                return Err(SqliteError::config("database path is required"));
            } else {
                Self::file(path)
            }
        } else if let Some(path) = location.strip_prefix("file:") {
            if path.is_empty() {
                return Err(SqliteError::config("database path is required"));
            }
            Self::file(path)
        } else {
            return Err(SqliteError::config(format!("unsupported database url '{}'", url)));
        };

        for pair in options.into_iter().flat_map(|o| o.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| SqliteError::config(format!("option '{}' has no value", pair)))?;
            match key {
                "mode" if value == "memory" => config.path = DatabasePath::Memory,
                "foreign_keys" => config.foreign_keys = matches!(value, "true" | "1" | "on"),
                "busy_timeout" => {
                    let ms = value
                        .parse()
                        .map_err(|_| SqliteError::config(format!("invalid busy_timeout '{}'", value)))?;
                    config.busy_timeout_ms = Some(ms);
                }
                "synchronous" => config.synchronous = SynchronousMode::parse(value)?,
                "journal_mode" => config.journal_mode = JournalMode::parse(value)?,
                other => debug!(option = other, "ignoring unknown sqlite option"),
            }
        }

        Ok(config)
    }

    /// Read the URL from `TABULA_DATABASE_URL`, falling back to an in-memory
    /// database when it is unset.
    pub fn from_env() -> SqliteResult<Self> {
        match env::var(DATABASE_URL_VAR) {
            Ok(url) => Self::from_url(url),
            Err(_) => Ok(Self::memory()),
        }
    }

    /// Enable or disable foreign keys.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout in milliseconds.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Set the synchronous mode.
    pub fn synchronous(mut self, mode: SynchronousMode) -> Self {
        self.synchronous = mode;
        self
    }

    /// Set the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Open a connection and apply the pragmas.
    pub(crate) fn open(&self) -> SqliteResult<rusqlite::Connection> {
        let conn = match &self.path {
            DatabasePath::Memory => rusqlite::Connection::open_in_memory()?,
            DatabasePath::File(path) => rusqlite::Connection::open(path)?,
        };
        self.apply(&conn)?;
        Ok(conn)
    }

    fn apply(&self, conn: &rusqlite::Connection) -> SqliteResult<()> {
        conn.pragma_update(None, "foreign_keys", self.foreign_keys)?;
        conn.pragma_update(None, "synchronous", self.synchronous.as_pragma())?;
        if let Some(ms) = self.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(u64::from(ms)))?;
        }
        if !self.path.is_memory() {
            let mode: String = conn.pragma_update_and_check(None, "journal_mode", self.journal_mode.as_pragma(), |row| {
                row.get(0)
            })?;
            debug!(journal_mode = %mode, "journal mode set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_config_from_url_memory() {
        assert!(SqliteConfig::from_url("sqlite::memory:").unwrap().path.is_memory());
        assert!(SqliteConfig::from_url(":memory:").unwrap().path.is_memory());
        assert!(SqliteConfig::from_url("sqlite://./x.db?mode=memory").unwrap().path.is_memory());
    }

    #[test]
    fn test_config_from_url_file() {
        let config = SqliteConfig::from_url("sqlite://./test.db").unwrap();
        assert_eq!(config.path, DatabasePath::File(PathBuf::from("./test.db")));

        let config = SqliteConfig::from_url("file:data/app.sqlite").unwrap();
        assert_eq!(config.path, DatabasePath::File(PathBuf::from("data/app.sqlite")));
    }

    #[test]
    fn test_config_from_url_with_options() {
        let config =
            SqliteConfig::from_url("sqlite://./test.db?foreign_keys=false&busy_timeout=10000&journal_mode=wal")
                .unwrap();

        assert!(!config.foreign_keys);
        assert_eq!(config.busy_timeout_ms, Some(10000));
        assert_eq!(config.journal_mode, JournalMode::Wal);
    }

    #[test]
    fn test_config_from_url_rejects_bad_input() {
        assert!(SqliteConfig::from_url("sqlite://").is_err());
        assert!(SqliteConfig::from_url("postgres://localhost/db").is_err());
        assert!(SqliteConfig::from_url("sqlite://./x.db?busy_timeout=soon").is_err());
        assert!(SqliteConfig::from_url("sqlite://./x.db?journal_mode=sideways").is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = SqliteConfig::memory()
            .foreign_keys(false)
            .busy_timeout(3000)
            .synchronous(SynchronousMode::Full)
            .journal_mode(JournalMode::Memory);

        assert!(!config.foreign_keys);
        assert_eq!(config.busy_timeout_ms, Some(3000));
        assert_eq!(config.synchronous, SynchronousMode::Full);
        assert_eq!(config.journal_mode, JournalMode::Memory);
    }

    #[test]
    fn test_open_applies_pragmas() {
        let conn = SqliteConfig::memory().open().unwrap();
        let enabled: i64 = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0)).unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_open_file_with_wal() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig::file(dir.path().join("app.db")).journal_mode(JournalMode::Wal);
        let conn = config.open().unwrap();
        let mode: String = conn.pragma_query_value(None, "journal_mode", |row| row.get(0)).unwrap();
        assert_eq!(mode, "wal");
    }
}
