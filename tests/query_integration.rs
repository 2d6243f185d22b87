//! Integration tests for the public query API.
//!
//! These drive the crate through its root re-exports with a hand-written
//! [`Connection`], so no database driver is involved.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use tabula::prelude::*;
use tabula::{CompiledQuery, ErrorCode, Params, QueryBuilder, Row};

/// Logs every call and answers queries from a script.
#[derive(Clone, Default)]
struct ScriptedConnection {
    log: Rc<RefCell<Vec<String>>>,
    results: Rc<RefCell<VecDeque<Vec<Row>>>>,
    next_id: Rc<RefCell<i64>>,
    open: bool,
}

impl ScriptedConnection {
    fn push_rows(&self, rows: Vec<Row>) {
        self.results.borrow_mut().push_back(rows);
    }

    fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl Connection for ScriptedConnection {
    fn query(&mut self, sql: &str, _params: &Params) -> QueryResult<Vec<Row>> {
        self.log.borrow_mut().push(sql.to_string());
        Ok(self.results.borrow_mut().pop_front().unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, _params: &Params) -> QueryResult<u64> {
        self.log.borrow_mut().push(sql.to_string());
        Ok(1)
    }

    fn last_insert_id(&mut self) -> QueryResult<Option<i64>> {
        let mut id = self.next_id.borrow_mut();
        *id += 1;
        Ok(Some(*id))
    }

    fn begin_transaction(&mut self) -> QueryResult<()> {
        self.open = true;
        self.log.borrow_mut().push("BEGIN".into());
        Ok(())
    }

    fn commit(&mut self) -> QueryResult<()> {
        self.open = false;
        self.log.borrow_mut().push("COMMIT".into());
        Ok(())
    }

    fn roll_back(&mut self) -> QueryResult<()> {
        self.open = false;
        self.log.borrow_mut().push("ROLLBACK".into());
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.open
    }
}

fn schema() -> Arc<Schema> {
    let schema = Schema::builder()
        .entity(EntityDef::new(
            "Note",
            Table::new("note").with_columns([
                Column::id("id"),
                Column::text("body", 200).required(),
                Column::int("priority").default(0),
            ]),
        ))
        .build()
        .unwrap();
    Arc::new(schema)
}

fn note_row(id: i64, body: &str) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), Value::Int(id));
    row.insert("body".into(), Value::from(body));
    row.insert("priority".into(), Value::Int(0));
    row
}

#[test]
fn test_map_conditions() {
    let schema = schema();
    let mut map = IndexMap::new();
    map.insert("priority >=".to_string(), Value::Int(2));
    map.insert("body not like".to_string(), Value::from("draft%"));
    map.insert("id".to_string(), Value::from(vec![1i64, 2]));

    let query = Query::from_type("Note").where_map(map).unwrap();
    let compiled = QueryBuilder::new(&schema).select(&query).unwrap();
    let sql = compiled.sql.clone();
    assert!(sql.starts_with("SELECT `t`.* FROM `note` `t` WHERE `t`.`priority` >= :p"));
    assert!(sql.contains("`t`.`body` NOT LIKE :p"));
    assert!(sql.contains("`t`.`id` IN (:p"));
    assert_eq!(compiled.params.len(), 4);
}

#[test]
fn test_unknown_map_operator() {
    let mut map = IndexMap::new();
    map.insert("priority ~".to_string(), Value::Int(2));
    let err = Criteria::from_map(map).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidFilter);
}

#[test]
fn test_empty_in_list() {
    let schema = schema();
    let query = Query::from_type("Note").where_eq("id", Vec::<i64>::new());
    let err = QueryBuilder::new(&schema).select(&query).unwrap_err();
    assert_eq!(err.code, ErrorCode::EmptyInList);
}

#[test]
fn test_count_wraps_select() {
    let schema = schema();
    let query = Query::from_type("Note")
        .where_eq("priority", 1)
        .order_by(OrderByField::asc("body"));
    let compiled = QueryBuilder::new(&schema).count(&query).unwrap();
    assert!(compiled.sql.starts_with("SELECT COUNT(*) AS `count` FROM (SELECT `t`.* FROM `note` `t`"));
    assert!(compiled.sql.ends_with(") `counted`"));
    assert!(!compiled.sql.contains("ORDER BY"));
}

#[test]
fn test_save_through_custom_connection() {
    let connection = ScriptedConnection::default();
    let session = Session::new(schema(), connection.clone(), UserContext::anonymous());

    let note = session.create("Note").unwrap();
    assert!(note.is_new());
    note.set("body", "hello").unwrap();
    assert!(note.save().unwrap());

    assert_eq!(note.get("id").unwrap(), Value::Int(1));
    assert!(!note.is_new());
    assert!(!note.is_modified());

    let log = connection.log();
    assert_eq!(log.first().map(String::as_str), Some("BEGIN"));
    assert!(log[1].starts_with("INSERT INTO `note`"));
    assert_eq!(log.last().map(String::as_str), Some("COMMIT"));
    assert!(!session.in_transaction());
}

#[test]
fn test_invalid_record_is_not_written() {
    let connection = ScriptedConnection::default();
    let session = Session::new(schema(), connection.clone(), UserContext::anonymous());

    let note = session.create("Note").unwrap();
    assert!(!note.save().unwrap());
    assert!(note.errors().get("body").is_some());
    assert!(!connection.log().iter().any(|sql| sql.starts_with("INSERT")));
}

#[test]
fn test_loaded_records_hydrate_from_rows() {
    let connection = ScriptedConnection::default();
    connection.push_rows(vec![note_row(3, "first"), note_row(4, "second")]);
    let session = Session::new(schema(), connection.clone(), UserContext::anonymous());

    let notes = session.find("Note").unwrap().all().unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[1].get("body").unwrap(), Value::from("second"));
    assert!(!notes[0].is_new());
    assert!(!notes[0].is_modified());
}

#[test]
fn test_raw_statement_through_session() {
    let connection = ScriptedConnection::default();
    let session = Session::new(schema(), connection.clone(), UserContext::anonymous());

    let compiled = CompiledQuery {
        sql: "DELETE FROM `note`".into(),
        params: Vec::new(),
    };
    assert_eq!(session.execute(&compiled).unwrap(), 1);
    assert_eq!(connection.log(), vec!["DELETE FROM `note`".to_string()]);
}

#[test]
fn test_row_without_key_hydrates_as_new() {
    let connection = ScriptedConnection::default();
    let mut row = Row::new();
    row.insert("body".into(), Value::from("orphan"));
    row.insert("priority".into(), Value::Int(2));
    connection.push_rows(vec![row]);
    let session = Session::new(schema(), connection.clone(), UserContext::anonymous());

    let query = Query::from_type("Note").select(["body", "priority"]);
    let notes = session.find_with(query).unwrap().all().unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].is_new());
    assert_eq!(
        notes[0].to_json(),
        serde_json::json!({ "id": null, "body": "orphan", "priority": 2 })
    );

    // Saving inserts a fresh row instead of updating one keyed by NULL.
    assert!(notes[0].save().unwrap());
    let log = connection.log();
    assert!(log.iter().any(|sql| sql.starts_with("INSERT INTO `note`")));
    assert!(!log.iter().any(|sql| sql.starts_with("UPDATE")));
    assert_eq!(notes[0].get("id").unwrap(), Value::Int(1));
}
