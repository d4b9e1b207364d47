//! Back-references, cascades and restricts across tables.

use hashrec_core::{
    CoreError, CorruptionPolicy, FieldType, ForeignKeyAction, ForeignKeyViolation, Record, Schema,
    Settings, Value,
};
use hashrec_testkit::prelude::*;
use std::sync::Arc;

struct Tables {
    author: Arc<Schema>,
    book: Arc<Schema>,
    chapter: Arc<Schema>,
}

fn tables(ctx: &TestContext, book_action: ForeignKeyAction, chapter_action: ForeignKeyAction) -> Tables {
    let author = Schema::builder("Author")
        .db(1)
        .field("id", FieldType::Int)
        .field("name", FieldType::Str)
        .settings(Arc::clone(&ctx.settings))
        .build()
        .unwrap();
    let book = Schema::builder("Book")
        .db(2)
        .field("id", FieldType::Int)
        .reference("author", &author)
        .action("author", book_action)
        .settings(Arc::clone(&ctx.settings))
        .build()
        .unwrap();
    let chapter = Schema::builder("Chapter")
        .db(2)
        .field("id", FieldType::Int)
        .reference("book", &book)
        .action("book", chapter_action)
        .settings(Arc::clone(&ctx.settings))
        .build()
        .unwrap();
    Tables {
        author,
        book,
        chapter,
    }
}

fn add(ctx: &TestContext, schema: &Arc<Schema>, fields: &[(&str, Value)]) -> Record {
    let mut builder = Record::builder(schema);
    for (name, value) in fields {
        builder = builder.set(*name, value.clone());
    }
    let mut record = builder.build().unwrap();
    ctx.db.add(&mut record, false).unwrap();
    record
}

#[test]
fn link_fields_take_the_target_id_type() {
    let ctx = TestContext::new();
    let t = tables(&ctx, ForeignKeyAction::Cascade, ForeignKeyAction::Cascade);
    assert_eq!(t.book.field("author").unwrap().field_type(), FieldType::Int);
    assert!(t.book.field("author").unwrap().is_link());
    assert_eq!(t.book.links()[0].target().table(), "author");
}

#[test]
fn referenced_records_list_their_referencers() {
    let ctx = TestContext::new();
    let t = tables(&ctx, ForeignKeyAction::Cascade, ForeignKeyAction::Cascade);
    add(&ctx, &t.author, &[("name", Value::from("ann"))]);
    let b0 = add(&ctx, &t.book, &[("author", Value::from(0))]);
    let b1 = add(&ctx, &t.book, &[("author", Value::from(0))]);

    let authors = ctx.db.get(&t.author, CorruptionPolicy::Flag).unwrap();
    let ann = authors.first(None).unwrap().unwrap();
    assert!(ann.is_valid());
    let refs = ann.back_references();
    assert_eq!(refs.len(), 2);
    let entry = &refs[&b1.key().unwrap()];
    assert_eq!(entry.action, "cascade");
    assert_eq!(entry.db, 2);
    assert_eq!(entry.table, "book");
    assert_eq!(entry.id, "1");
    assert_eq!(entry.id_field, "id");
    assert!(refs.contains_key(&b0.key().unwrap()));
}

#[test]
fn cascade_reaches_every_level() {
    init_test_tracing();
    let ctx = TestContext::new();
    let t = tables(&ctx, ForeignKeyAction::Cascade, ForeignKeyAction::Cascade);
    let ann = add(&ctx, &t.author, &[("name", Value::from("ann"))]);
    add(&ctx, &t.author, &[("name", Value::from("bob"))]);
    add(&ctx, &t.book, &[("author", Value::from(0))]);
    add(&ctx, &t.book, &[("author", Value::from(1))]);
    add(&ctx, &t.chapter, &[("book", Value::from(0))]);
    add(&ctx, &t.chapter, &[("book", Value::from(0))]);
    add(&ctx, &t.chapter, &[("book", Value::from(1))]);

    ctx.db.delete(&ann, &[], false).unwrap();

    assert_eq!(ctx.raw_keys(1), vec!["hashrec:author:1"]);
    assert_eq!(ctx.raw_keys(2), vec!["hashrec:book:1", "hashrec:chapter:2"]);
}

#[test]
fn restrict_deep_in_the_chain_blocks_everything() {
    let ctx = TestContext::new();
    let t = tables(&ctx, ForeignKeyAction::Cascade, ForeignKeyAction::Restrict);
    let ann = add(&ctx, &t.author, &[("name", Value::from("ann"))]);
    add(&ctx, &t.book, &[("author", Value::from(0))]);
    add(&ctx, &t.chapter, &[("book", Value::from(0))]);

    let err = ctx.db.delete(&ann, &[], false).unwrap_err();
    match err {
        CoreError::ForeignKey(ForeignKeyViolation::Restricted {
            table,
            referencing_table,
            ..
        }) => {
            assert_eq!(table, "book");
            assert_eq!(referencing_table, "chapter");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ctx.raw_keys(1).len(), 1);
    assert_eq!(ctx.raw_keys(2).len(), 2);
}

#[test]
fn restrict_lifts_once_every_referencer_is_gone() {
    let ctx = TestContext::new();
    let t = tables(&ctx, ForeignKeyAction::Restrict, ForeignKeyAction::Cascade);
    let ann = add(&ctx, &t.author, &[("name", Value::from("ann"))]);
    let mut first = add(&ctx, &t.book, &[("author", Value::from(0))]);
    let mut second = add(&ctx, &t.book, &[("author", Value::from(0))]);

    ctx.db.delete_record(&mut first, false).unwrap();
    assert!(ctx.db.delete(&ann, &[], false).is_err());

    ctx.db.delete_record(&mut second, false).unwrap();
    ctx.db.delete(&ann, &[], false).unwrap();
    assert!(ctx.raw_keys(1).is_empty());
}

#[test]
fn moving_a_book_to_another_author() {
    let ctx = TestContext::new();
    let t = tables(&ctx, ForeignKeyAction::Cascade, ForeignKeyAction::Cascade);
    let ann = add(&ctx, &t.author, &[("name", Value::from("ann"))]);
    add(&ctx, &t.author, &[("name", Value::from("bob"))]);
    let mut book = add(&ctx, &t.book, &[("author", Value::from(0))]);

    book.set("author", 1).unwrap();
    ctx.db.add(&mut book, true).unwrap();

    let authors = ctx.db.get(&t.author, CorruptionPolicy::Flag).unwrap();
    assert!(authors.records()[0].back_references().is_empty());
    assert_eq!(authors.records()[1].back_references().len(), 1);

    ctx.db.delete(&ann, &[], false).unwrap();
    assert_eq!(ctx.raw_keys(2), vec!["hashrec:book:0"]);
}

#[test]
fn deleting_several_ids() {
    let ctx = TestContext::new();
    let t = tables(&ctx, ForeignKeyAction::Cascade, ForeignKeyAction::Cascade);
    for name in ["a", "b", "c"] {
        add(&ctx, &t.author, &[("name", Value::from(name))]);
    }
    ctx.db
        .delete(&t.author, &[Value::from(0), Value::from("2"), Value::from(7)], true)
        .unwrap();
    assert_eq!(ctx.raw_keys(1), vec!["hashrec:author:1"]);
}

#[test]
fn links_must_point_at_existing_records() {
    let ctx = TestContext::new();
    let t = tables(&ctx, ForeignKeyAction::Cascade, ForeignKeyAction::Cascade);
    let mut orphan = Record::builder(&t.book)
        .set("author", 3)
        .build()
        .unwrap();
    let err = ctx.db.add(&mut orphan, false).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ForeignKey(ForeignKeyViolation::ReferencedRecordMissing { .. })
    ));
    assert!(ctx.raw_keys(2).is_empty());
    assert_eq!(orphan.id(), None);

    assert!(matches!(
        Record::builder(&t.book).build(),
        Err(CoreError::ForeignKey(ForeignKeyViolation::MissingReference { .. }))
    ));
}

#[test]
fn schema_level_checks() {
    let ctx = TestContext::new();
    let t = tables(&ctx, ForeignKeyAction::Cascade, ForeignKeyAction::Cascade);

    let no_action = Schema::builder("Review")
        .db(3)
        .field("id", FieldType::Int)
        .reference("book", &t.book)
        .settings(Arc::clone(&ctx.settings))
        .build();
    assert!(matches!(
        no_action,
        Err(CoreError::ForeignKey(ForeignKeyViolation::MissingAction { .. }))
    ));

    let stray_action = Schema::builder("Review")
        .db(3)
        .field("id", FieldType::Int)
        .action("book", ForeignKeyAction::Cascade)
        .settings(Arc::clone(&ctx.settings))
        .build();
    assert!(matches!(
        stray_action,
        Err(CoreError::ForeignKey(ForeignKeyViolation::UndeclaredAction { .. }))
    ));

    let elsewhere = Arc::new(Settings::new().testing(true).port(6380));
    let mismatch = Schema::builder("Review")
        .db(3)
        .field("id", FieldType::Int)
        .reference("book", &t.book)
        .action("book", ForeignKeyAction::Cascade)
        .settings(elsewhere)
        .build();
    match mismatch {
        Err(CoreError::ForeignKey(ForeignKeyViolation::ConnectionMismatch { differences, .. })) => {
            assert_eq!(differences, "port");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
