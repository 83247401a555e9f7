// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use fieldbase::config::{Config, RootManager, RootRule};
use fieldbase::schema::{Request, Rule, Schema};
use fieldbase::{CancellationToken, Fdb, Key, Result};
use regex::Regex;
use test_log::test;

fn three_level_fdb(root: &std::path::Path) -> Fdb {
    let schema = Schema::new(vec![Rule::new(["a", "b"], ["c", "d"], ["e", "f"])]);
    let rule = RootRule {
        pattern: Regex::new(".*").unwrap(),
        path: root.to_path_buf(),
        writable: true,
        visitable: true,
        min_free_bytes: None,
    };
    Fdb::new(schema, Config::new(RootManager::new(vec![rule])))
}

fn full_key() -> Key {
    let mut key = Key::new();
    key.set("a", "1");
    key.set("b", "2");
    key.set("c", "3");
    key.set("d", "4");
    key.set("e", "5");
    key.set("f", "6");
    key
}

#[test]
fn archive_then_flush_then_retrieve_returns_same_bytes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fdb = three_level_fdb(dir.path());

    let mut db_key = Key::new();
    db_key.set("a", "1");
    db_key.set("b", "2");

    let mut archiver = fdb.create(&db_key, b"schema-bytes".to_vec())?;
    archiver.archive(&full_key(), b"hello", None, None)?;
    archiver.flush()?;

    let request = Request::new()
        .with("a", vec!["1".into()])
        .with("b", vec!["2".into()])
        .with("c", vec!["3".into()])
        .with("d", vec!["4".into()])
        .with("e", vec!["5".into()])
        .with("f", vec!["6".into()]);

    let found: Vec<_> = fdb.list(&request, CancellationToken::default())?.collect::<Result<Vec<_>>>()?;
    assert_eq!(1, found.len());
    assert_eq!(Some("4"), found[0].full_key.get("d"));

    let field = fdb.retrieve_one(archiver.catalogue(), archiver.store(), &full_key())?;
    assert_eq!(b"hello".as_slice(), field.bytes.as_slice());

    let retrieved: Vec<_> = fdb.retrieve(&request, CancellationToken::default())?.collect::<Result<Vec<_>>>()?;
    assert_eq!(1, retrieved.len());
    assert_eq!(b"hello".as_slice(), retrieved[0].bytes.as_slice());

    Ok(())
}
