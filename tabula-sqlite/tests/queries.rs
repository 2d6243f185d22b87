//! Compiled queries executed against SQLite.

mod common;

use pretty_assertions::assert_eq;
use tabula_query::{Comparator, Criteria, ErrorCode, FetchMode, OrderByField, Query, Value};

use common::{contact, id, session};

#[test]
fn test_empty_in_list_is_rejected() {
    let session = session();
    contact(&session, "Alice");

    let store = session
        .find_with(Query::from_type("Contact").where_eq("id", Vec::<i64>::new()))
        .unwrap();
    let err = store.all().unwrap_err();
    assert_eq!(err.code, ErrorCode::EmptyInList);
}

#[test]
fn test_in_list_and_negation() {
    let session = session();
    let alice = contact(&session, "Alice");
    let bob = contact(&session, "Bob");
    contact(&session, "Carol");

    let picked = session
        .find_with(Query::from_type("Contact").where_eq("id", vec![id(&alice), id(&bob)]))
        .unwrap();
    assert_eq!(picked.count().unwrap(), 2);

    let others = session
        .find_with(Query::from_type("Contact").filter("name", Comparator::NotIn, vec!["Alice", "Bob"]))
        .unwrap()
        .all()
        .unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].get("name").unwrap(), Value::from("Carol"));
}

#[test]
fn test_null_comparison() {
    let session = session();
    contact(&session, "Alice");

    let unaffiliated = session
        .find_with(Query::from_type("Contact").where_eq("organizationId", Value::Null))
        .unwrap();
    assert_eq!(unaffiliated.count().unwrap(), 1);

    let bad = session
        .find_with(Query::from_type("Contact").filter("organizationId", Comparator::Gt, Value::Null))
        .unwrap();
    assert_eq!(bad.count().unwrap_err().code, ErrorCode::InvalidFilter);
}

#[test]
fn test_order_limit_offset() {
    let session = session();
    for name in ["Dave", "Alice", "Carol", "Bob"] {
        contact(&session, name);
    }

    let page = session
        .find_with(
            Query::from_type("Contact")
                .order_by(OrderByField::asc("name"))
                .limit(2)
                .offset(1),
        )
        .unwrap()
        .all()
        .unwrap();
    let names: Vec<Value> = page.iter().map(|r| r.get("name").unwrap()).collect();
    assert_eq!(names, vec![Value::from("Bob"), Value::from("Carol")]);

    let tail = session
        .find_with(Query::from_type("Contact").order_by(OrderByField::asc("name")).offset(3))
        .unwrap()
        .all()
        .unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].get("name").unwrap(), Value::from("Dave"));
}

#[test]
fn test_or_groups() {
    let session = session();
    for name in ["Alice", "Bob", "Carol"] {
        contact(&session, name);
    }

    let query = Query::from_type("Contact").and_where(
        Criteria::new()
            .eq("name", "Alice")
            .or_compare("name", Comparator::Like, "C%"),
    );
    assert_eq!(session.find_with(query).unwrap().count().unwrap(), 2);
}

#[test]
fn test_subquery_operand() {
    let session = session();
    let alice = contact(&session, "Alice");
    contact(&session, "Bob");
    let email = session.create("EmailAddress").unwrap();
    email.set("contactId", id(&alice)).unwrap();
    email.set("email", "a@x.com").unwrap();
    assert!(email.save().unwrap());

    let with_email = Query::from_type("EmailAddress").select(["contactId"]);
    let contacts = session
        .find_with(Query::from_type("Contact").filter("id", Comparator::In, with_email))
        .unwrap()
        .all()
        .unwrap();
    assert_eq!(contacts.len(), 1);
    assert!(contacts[0].same_record(&alice));
}

#[test]
fn test_rows_mode_with_grouping() {
    let session = session();
    let alice = session.create("Contact").unwrap();
    alice
        .set_json(&serde_json::json!({
            "name": "Alice",
            "emailAddresses": [{ "email": "a@x.com" }, { "email": "b@x.com" }]
        }))
        .unwrap();
    assert!(alice.save().unwrap());

    let query = Query::from_type("EmailAddress")
        .select(["contactId"])
        .select_raw("COUNT(*) AS `emails`")
        .group_by(["contactId"])
        .fetch_mode(FetchMode::Rows);
    let store = session.find_with(query).unwrap();
    assert!(store.all().unwrap_err().is_invalid_usage());

    let rows = store.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["contactId"], Value::Int(id(&alice)));
    assert_eq!(rows[0]["emails"], Value::Int(2));
}

#[test]
fn test_unknown_column_is_rejected() {
    let session = session();
    let store = session
        .find_with(Query::from_type("Contact").where_eq("nickname", "x"))
        .unwrap();
    assert_eq!(store.count().unwrap_err().code, ErrorCode::UnknownProperty);
}
