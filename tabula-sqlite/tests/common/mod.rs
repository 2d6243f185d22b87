//! Shared fixtures: an address-book schema on an in-memory database.

#![allow(dead_code)]

use std::rc::Rc;
use std::sync::Arc;

use tabula_query::{
    Column, DeleteAction, EntityDef, OwnerPermissions, RecordRef, Relation, RelayPermissions, Schema, Session, Table,
    UserContext, Value,
};
use tabula_sqlite::SqliteConnection;

const DDL: &str = r#"
CREATE TABLE organization (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
CREATE TABLE contact (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    organizationId INTEGER REFERENCES organization(id),
    deleted INTEGER NOT NULL DEFAULT 0,
    createdAt TEXT,
    modifiedAt TEXT
);
CREATE TABLE email_address (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contactId INTEGER NOT NULL REFERENCES contact(id),
    email TEXT NOT NULL
);
CREATE TABLE phone (
    contactId INTEGER NOT NULL REFERENCES contact(id),
    kind TEXT NOT NULL,
    number TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (contactId, kind)
);
CREATE TABLE tag (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL UNIQUE
);
CREATE TABLE contact_tag (
    contactId INTEGER NOT NULL REFERENCES contact(id),
    tagId INTEGER NOT NULL REFERENCES tag(id),
    PRIMARY KEY (contactId, tagId)
);
CREATE TABLE category (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    parentId INTEGER
);
CREATE TABLE notebook (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    ownerId INTEGER
);
CREATE TABLE page (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    notebookId INTEGER NOT NULL REFERENCES notebook(id),
    body TEXT
);
"#;

pub fn schema() -> Schema {
    Schema::builder()
        .entity(
            EntityDef::new(
                "Organization",
                Table::new("organization").with_columns([Column::id("id"), Column::text("name", 100).required()]),
            )
            .with_relation(
                Relation::has_many("contacts", "Contact")
                    .key("id", "organizationId")
                    .on_delete(DeleteAction::Restrict),
            ),
        )
        .entity(
            EntityDef::new(
                "Contact",
                Table::new("contact").with_columns([
                    Column::id("id"),
                    Column::text("name", 100).required(),
                    Column::int("organizationId"),
                    Column::bool("deleted").default(false),
                    Column::datetime("createdAt"),
                    Column::datetime("modifiedAt"),
                ]),
            )
            .with_relation(Relation::belongs_to("organization", "Organization").key("organizationId", "id"))
            .with_relation(
                Relation::has_many("emailAddresses", "EmailAddress")
                    .key("id", "contactId")
                    .on_delete(DeleteAction::Cascade),
            )
            .with_relation(
                Relation::has_many("phones", "Phone")
                    .key("id", "contactId")
                    .on_delete(DeleteAction::Cascade),
            )
            .with_relation(
                Relation::has_many("tags", "Tag")
                    .key("id", "contactId")
                    .via("ContactTag", [("tagId", "id")])
                    .on_delete(DeleteAction::Cascade),
            ),
        )
        .entity(
            EntityDef::new(
                "EmailAddress",
                Table::new("email_address").with_columns([
                    Column::id("id"),
                    Column::int("contactId").required(),
                    Column::text("email", 255).required(),
                ]),
            )
            .with_relation(Relation::belongs_to("contact", "Contact").key("contactId", "id")),
        )
        .entity(
            EntityDef::new(
                "Phone",
                Table::new("phone").with_columns([
                    Column::int("contactId").primary().required(),
                    Column::text("kind", 20).primary().required(),
                    Column::text("number", 30).required(),
                    Column::bool("deleted").default(false),
                ]),
            )
            .with_relation(Relation::belongs_to("contact", "Contact").key("contactId", "id")),
        )
        .entity(EntityDef::new(
            "Tag",
            Table::new("tag").with_columns([Column::id("id"), Column::text("label", 50).required().unique("label")]),
        ))
        .entity(EntityDef::new(
            "ContactTag",
            Table::new("contact_tag").with_columns([
                Column::int("contactId").primary().required(),
                Column::int("tagId").primary().required(),
            ]),
        ))
        .entity(
            EntityDef::new(
                "Category",
                Table::new("category").with_columns([
                    Column::id("id"),
                    Column::text("name", 100).required(),
                    Column::int("parentId"),
                ]),
            )
            .with_relation(
                Relation::has_many("children", "Category")
                    .key("id", "parentId")
                    .on_delete(DeleteAction::Cascade),
            ),
        )
        .entity(
            EntityDef::new(
                "Notebook",
                Table::new("notebook").with_columns([
                    Column::id("id"),
                    Column::text("title", 100).required(),
                    Column::int("ownerId"),
                ]),
            )
            .with_permissions(Arc::new(OwnerPermissions::new("ownerId"))),
        )
        .entity(
            EntityDef::new(
                "Page",
                Table::new("page").with_columns([
                    Column::id("id"),
                    Column::int("notebookId").required(),
                    Column::text("body", 1000),
                ]),
            )
            .with_relation(Relation::belongs_to("notebook", "Notebook").key("notebookId", "id"))
            .with_permissions(Arc::new(RelayPermissions::new("notebook"))),
        )
        .build()
        .expect("fixture schema is valid")
}

pub fn connection() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().expect("in-memory database");
    conn.execute_batch(DDL).expect("fixture tables");
    conn
}

pub fn session() -> Rc<Session> {
    session_as(UserContext::user(1))
}

pub fn session_as(user: UserContext) -> Rc<Session> {
    Session::new(Arc::new(schema()), connection(), user)
}

/// Insert a contact through the ORM and return it.
pub fn contact(session: &Rc<Session>, name: &str) -> RecordRef {
    let record = session.create("Contact").unwrap();
    record.set("name", name).unwrap();
    assert!(record.save().unwrap());
    record
}

pub fn id(record: &RecordRef) -> i64 {
    match record.get("id").unwrap() {
        Value::Int(id) => id,
        other => panic!("record has no id: {other:?}"),
    }
}

/// Number of rows in a table, regardless of soft deletes or permissions.
pub fn count_rows(session: &Rc<Session>, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) AS count FROM {table}");
    session
        .query_rows(&tabula_query::CompiledQuery { sql, params: Vec::new() })
        .unwrap()[0]["count"]
        .as_i64()
        .unwrap()
}

/// A session on a database file, so several users can share it.
pub fn file_session(path: &std::path::Path, user: UserContext, create: bool) -> Rc<Session> {
    let conn = SqliteConnection::open(&tabula_sqlite::SqliteConfig::file(path)).expect("file database");
    if create {
        conn.execute_batch(DDL).expect("fixture tables");
    }
    Session::new(Arc::new(schema()), conn, user)
}
