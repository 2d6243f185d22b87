//! The database command interface.
//!
//! The core never talks to a driver directly. Everything it needs from the
//! database goes through [`Connection`]: run a statement, read the generated
//! key and drive one transaction.

use crate::error::QueryResult;
use crate::value::{Params, Row};

/// A synchronous database connection.
pub trait Connection {
    /// Run a statement that returns rows.
    fn query(&mut self, sql: &str, params: &Params) -> QueryResult<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &Params) -> QueryResult<u64>;

    /// Key generated by the last insert, if the driver reports one.
    fn last_insert_id(&mut self) -> QueryResult<Option<i64>>;

    /// Begin a transaction.
    fn begin_transaction(&mut self) -> QueryResult<()>;

    /// Commit the current transaction.
    fn commit(&mut self) -> QueryResult<()>;

    /// Roll back the current transaction.
    fn roll_back(&mut self) -> QueryResult<()>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted connection that records every call.

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::error::QueryError;

    /// Shared view of what a [`RecordingConnection`] saw.
    #[derive(Debug, Default)]
    pub(crate) struct Recording {
        pub(crate) log: Vec<String>,
        pub(crate) results: VecDeque<Vec<Row>>,
        pub(crate) fail_on: Option<String>,
        pub(crate) next_id: i64,
        pub(crate) in_transaction: bool,
    }

    impl Recording {
        /// Logged statements, with transaction markers, in call order.
        pub(crate) fn statements(&self) -> Vec<String> {
            self.log.clone()
        }
    }

    /// Answers queries from a queue and hands out increasing insert ids.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingConnection {
        pub(crate) state: Rc<RefCell<Recording>>,
    }

    impl RecordingConnection {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queue the rows returned by the next query.
        pub(crate) fn push_result(&self, rows: Vec<Row>) {
            self.state.borrow_mut().results.push_back(rows);
        }

        /// Fail every statement containing `needle`.
        pub(crate) fn fail_on(&self, needle: &str) {
            self.state.borrow_mut().fail_on = Some(needle.to_string());
        }

        fn check(&self, sql: &str) -> QueryResult<()> {
            let state = self.state.borrow();
            match &state.fail_on {
                Some(needle) if sql.contains(needle.as_str()) => {
                    Err(QueryError::statement_failed("scripted failure", sql))
                }
                _ => Ok(()),
            }
        }
    }

    impl Connection for RecordingConnection {
        fn query(&mut self, sql: &str, _params: &Params) -> QueryResult<Vec<Row>> {
            self.check(sql)?;
            let mut state = self.state.borrow_mut();
            state.log.push(sql.to_string());
            Ok(state.results.pop_front().unwrap_or_default())
        }

        fn execute(&mut self, sql: &str, _params: &Params) -> QueryResult<u64> {
            self.check(sql)?;
            let mut state = self.state.borrow_mut();
            state.log.push(sql.to_string());
            state.next_id += 1;
            Ok(1)
        }

        fn last_insert_id(&mut self) -> QueryResult<Option<i64>> {
            Ok(Some(self.state.borrow().next_id))
        }

        fn begin_transaction(&mut self) -> QueryResult<()> {
            let mut state = self.state.borrow_mut();
            state.in_transaction = true;
            state.log.push("BEGIN".to_string());
            Ok(())
        }

        fn commit(&mut self) -> QueryResult<()> {
            let mut state = self.state.borrow_mut();
            state.in_transaction = false;
            state.log.push("COMMIT".to_string());
            Ok(())
        }

        fn roll_back(&mut self) -> QueryResult<()> {
            let mut state = self.state.borrow_mut();
            state.in_transaction = false;
            state.log.push("ROLLBACK".to_string());
            Ok(())
        }

        fn in_transaction(&self) -> bool {
            self.state.borrow().in_transaction
        }
    }
}
