//! SQLite connection wrapper.

use tabula_query::error::QueryResult;
use tabula_query::{Connection, Params, Row};
use tracing::{debug, trace};

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};
use crate::types::{from_sqlite, to_sqlite};

/// A [`Connection`] over one `rusqlite` connection.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open a connection as described by `config`.
    pub fn open(config: &SqliteConfig) -> SqliteResult<Self> {
        debug!(path = ?config.path, "opening sqlite database");
        Ok(Self { conn: config.open()? })
    }

    /// Open a fresh in-memory database.
    pub fn open_in_memory() -> SqliteResult<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open the database named by `TABULA_DATABASE_URL`.
    pub fn from_env() -> SqliteResult<Self> {
        Self::open(&SqliteConfig::from_env()?)
    }

    /// Wrap an already opened connection.
    pub fn from_rusqlite(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Run several statements without parameters, e.g. schema setup.
    pub fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        debug!(sql = %sql, "executing batch");
        Ok(self.conn.execute_batch(sql)?)
    }

    /// Get the inner connection.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn prepare<'c>(conn: &'c rusqlite::Connection, sql: &str, params: &Params) -> SqliteResult<rusqlite::Statement<'c>> {
        let mut stmt = conn.prepare(sql)?;
        for (name, value) in params {
            match stmt.parameter_index(name)? {
                Some(index) => stmt.raw_bind_parameter(index, to_sqlite(value)?)?,
                None => trace!(param = %name, "parameter not referenced by statement"),
            }
        }
        Ok(stmt)
    }

    fn query_rows(&self, sql: &str, params: &Params) -> SqliteResult<Vec<Row>> {
        let mut stmt = Self::prepare(&self.conn, sql, params)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Row::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                values.insert(column.clone(), from_sqlite(row.get_ref(index)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn execute_statement(&self, sql: &str, params: &Params) -> SqliteResult<u64> {
        let mut stmt = Self::prepare(&self.conn, sql, params)?;
        let changed = stmt.raw_execute()?;
        Ok(changed as u64)
    }

    fn transaction_statement(&self, sql: &str) -> SqliteResult<()> {
        debug!(statement = sql, "transaction");
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &Params) -> QueryResult<Vec<Row>> {
        let rows = self.query_rows(sql, params)?;
        trace!(rows = rows.len(), "query returned");
        Ok(rows)
    }

    fn execute(&mut self, sql: &str, params: &Params) -> QueryResult<u64> {
        Ok(self.execute_statement(sql, params)?)
    }

    fn last_insert_id(&mut self) -> QueryResult<Option<i64>> {
        let id = self.conn.last_insert_rowid();
        Ok((id != 0).then_some(id))
    }

    fn begin_transaction(&mut self) -> QueryResult<()> {
        if self.in_transaction() {
            return Err(SqliteError::transaction("a transaction is already open").into());
        }
        Ok(self.transaction_statement("BEGIN")?)
    }

    fn commit(&mut self) -> QueryResult<()> {
        if !self.in_transaction() {
            return Err(SqliteError::transaction("no transaction to commit").into());
        }
        Ok(self.transaction_statement("COMMIT")?)
    }

    fn roll_back(&mut self) -> QueryResult<()> {
        if !self.in_transaction() {
            return Err(SqliteError::transaction("no transaction to roll back").into());
        }
        Ok(self.transaction_statement("ROLLBACK")?)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.conn.path())
            .field("in_transaction", &!self.conn.is_autocommit())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tabula_query::Value;

    use super::*;

    fn setup() -> SqliteConnection {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE note (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, done INTEGER)")
            .unwrap();
        conn
    }

    fn params(values: &[(&str, Value)]) -> Params {
        values.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_named_parameters() {
        let mut conn = setup();
        let changed = conn
            .execute(
                "INSERT INTO note (title, done) VALUES (:p1, :p2)",
                &params(&[(":p1", Value::from("a")), (":p2", Value::Bool(true))]),
            )
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(conn.last_insert_id().unwrap(), Some(1));

        let rows = conn
            .query("SELECT id, title, done FROM note WHERE title = :p9", &params(&[(":p9", Value::from("a"))]))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], Value::from("a"));
        assert_eq!(rows[0]["done"], Value::Int(1));
    }

    #[test]
    fn test_transactions() {
        let mut conn = setup();
        assert!(!conn.in_transaction());
        conn.begin_transaction().unwrap();
        assert!(conn.in_transaction());
        assert!(conn.begin_transaction().is_err());

        conn.execute("INSERT INTO note (title) VALUES (:p1)", &params(&[(":p1", Value::from("x"))]))
            .unwrap();
        conn.roll_back().unwrap();
        assert!(!conn.in_transaction());

        let rows = conn.query("SELECT COUNT(*) AS count FROM note", &Params::new()).unwrap();
        assert_eq!(rows[0]["count"], Value::Int(0));
        assert!(conn.commit().is_err());
    }

    #[test]
    fn test_statement_error() {
        let mut conn = setup();
        let err = conn
            .execute("INSERT INTO note (title) VALUES (:p1)", &params(&[(":p1", Value::Null)]))
            .unwrap_err();
        assert!(err.message.contains("NOT NULL"));
    }

    #[test]
    fn test_no_insert_id_before_insert() {
        let mut conn = setup();
        assert_eq!(conn.last_insert_id().unwrap(), None);
    }
}
