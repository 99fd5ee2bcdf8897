use std::fs;

use taint_query_core::db::{DbError, SymbolTable};
use tempfile::tempdir;

#[test]
fn get_or_insert_assigns_dense_ids_and_is_idempotent() {
    let mut table = SymbolTable::new();
    assert_eq!(table.get_or_insert("/src/main.c"), 0);
    assert_eq!(table.get_or_insert("argv"), 1);
    assert_eq!(table.get_or_insert("(buf)"), 2);

    // Existing keys keep their id and do not grow the table.
    assert_eq!(table.get_or_insert("argv"), 1);
    assert_eq!(table.len(), 3);
    assert_eq!(table.get("(buf)"), Some(2));
    assert_eq!(table.get("missing"), None);
}

#[test]
fn save_then_load_preserves_every_mapping() {
    let tmp = tempdir().expect("tempdir");
    let db_path = tmp.path().join("symbols.db");

    let mut table = SymbolTable::new();
    for key in ["/src/a.c", "p", "(s).field", "weird\tkey\nwith\\escapes"] {
        table.get_or_insert(key);
    }
    table.save(&db_path).expect("save table");

    let loaded = SymbolTable::load(&db_path).expect("load table");
    assert_eq!(loaded, table);
    assert_eq!(loaded.get("weird\tkey\nwith\\escapes"), Some(3));

    // New keys continue after the persisted ones.
    let mut loaded = loaded;
    assert_eq!(loaded.get_or_insert("fresh"), 4);
}

#[test]
fn listing_is_ordered_by_id_with_escaped_keys() {
    let mut table = SymbolTable::new();
    table.get_or_insert("b");
    table.get_or_insert("a\tb");
    assert_eq!(table.to_listing(), "0\tb\n1\ta\\tb\n");
    assert_eq!(table.entries(), vec![(0, "b"), (1, "a\tb")]);
}

#[test]
fn missing_or_empty_database_loads_as_empty_table() {
    let tmp = tempdir().expect("tempdir");

    let missing = SymbolTable::load(&tmp.path().join("nope.db")).expect("missing db is fine");
    assert!(missing.is_empty());

    let empty_path = tmp.path().join("empty.db");
    fs::write(&empty_path, "").expect("write empty db");
    let empty = SymbolTable::load(&empty_path).expect("empty db is fine");
    assert!(empty.is_empty());
}

#[test]
fn malformed_database_reports_the_offending_line() {
    let tmp = tempdir().expect("tempdir");
    let db_path = tmp.path().join("bad.db");

    fs::write(&db_path, "0\tfoo\nnot-a-record\n").expect("write db");
    match SymbolTable::load(&db_path) {
        Err(DbError::Malformed { line, reason, .. }) => {
            assert_eq!(line, 2);
            assert!(reason.contains("tab"), "unexpected reason: {reason}");
        }
        other => panic!("expected Malformed, got {other:?}"),
    }

    fs::write(&db_path, "0\tfoo\n0\tbar\n").expect("write db");
    assert!(matches!(SymbolTable::load(&db_path), Err(DbError::Malformed { line: 2, .. })));

    fs::write(&db_path, "0\tfoo\n1\tfoo\n").expect("write db");
    assert!(matches!(SymbolTable::load(&db_path), Err(DbError::Malformed { line: 2, .. })));

    // Ids must be dense so the next assigned id is never already taken.
    fs::write(&db_path, "0\tfoo\n5\tbar\n").expect("write db");
    assert!(matches!(SymbolTable::load(&db_path), Err(DbError::Malformed { line: 2, .. })));

    fs::write(&db_path, "0\tbad\\q\n").expect("write db");
    assert!(matches!(SymbolTable::load(&db_path), Err(DbError::Malformed { line: 1, .. })));
}

#[test]
fn blank_lines_are_ignored() {
    let tmp = tempdir().expect("tempdir");
    let db_path = tmp.path().join("blank.db");
    fs::write(&db_path, "\n1\tb\n\n0\ta\n").expect("write db");

    let table = SymbolTable::load(&db_path).expect("load");
    assert_eq!(table.get("a"), Some(0));
    assert_eq!(table.get("b"), Some(1));
}

#[test]
fn save_fails_when_directory_is_missing() {
    let tmp = tempdir().expect("tempdir");
    let db_path = tmp.path().join("no-such-dir").join("symbols.db");
    let err = SymbolTable::new().save(&db_path).unwrap_err();
    assert!(matches!(err, DbError::Io { .. }));
}

#[test]
fn non_utf8_database_is_rejected_and_left_intact() {
    let tmp = tempdir().expect("tempdir");
    let db_path = tmp.path().join("latin1.db");
    let body = b"0\t/src/a.c\n1\tcaf\xe9\n";
    fs::write(&db_path, body).expect("write db");

    match SymbolTable::load(&db_path) {
        Err(DbError::Malformed { line, reason, .. }) => {
            assert_eq!(line, 2);
            assert!(reason.contains("UTF-8"), "unexpected reason: {reason}");
        }
        other => panic!("expected Malformed, got {other:?}"),
    }
    assert_eq!(fs::read(&db_path).expect("read db"), body.to_vec());
}
