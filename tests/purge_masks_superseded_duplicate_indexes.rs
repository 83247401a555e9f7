// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use fieldbase::config::{Config, RootManager, RootRule};
use fieldbase::schema::{Request, Rule, Schema};
use fieldbase::{CancellationToken, Fdb, Key, Result};
use regex::Regex;
use test_log::test;

fn fdb(root: &std::path::Path) -> Fdb {
    let schema = Schema::new(vec![Rule::new(["class"], ["date"], ["param"])]);
    let rule = RootRule {
        pattern: Regex::new(".*").unwrap(),
        path: root.to_path_buf(),
        writable: true,
        visitable: true,
        min_free_bytes: None,
    };
    Fdb::new(schema, Config::new(RootManager::new(vec![rule])))
}

fn full_key(date: &str) -> Key {
    let mut key = Key::new();
    key.set("class", "od");
    key.set("date", date);
    key.set("param", "130");
    key
}

#[test]
fn purge_reclaims_every_generation_but_the_newest_reachable_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fdb = fdb(dir.path());

    let mut db_key = Key::new();
    db_key.set("class", "od");

    // The same field-key ("param=130") re-archived under three distinct
    // index-keys, one flush per generation: each index is wholly made up of
    // a fingerprint some later index also carries, so only the last one
    // archived stays reachable.
    let mut archiver = fdb.create(&db_key, b"schema-bytes".to_vec())?;
    archiver.archive(&full_key("20260101"), b"gen-1", None, None)?;
    archiver.flush()?;
    archiver.archive(&full_key("20260102"), b"gen-2", None, None)?;
    archiver.flush()?;
    archiver.archive(&full_key("20260103"), b"gen-3", None, None)?;
    archiver.flush()?;

    let all_generations = Request::new()
        .with("class", vec!["od".into()])
        .with("date", vec!["20260101".into(), "20260102".into(), "20260103".into()])
        .with("param", vec!["130".into()]);
    let before: Vec<_> = fdb.list(&all_generations, CancellationToken::default())?.collect::<Result<Vec<_>>>()?;
    assert_eq!(3, before.len());

    let dry_run = fdb.purge(&db_key, false)?;
    assert_eq!(2, dry_run.masked_indexes);
    assert_eq!(2, dry_run.deleted_data_uris);

    let committed = fdb.purge(&db_key, true)?;
    assert_eq!(2, committed.masked_indexes);
    assert_eq!(2, committed.deleted_data_uris);

    let after: Vec<_> = fdb.list(&all_generations, CancellationToken::default())?.collect::<Result<Vec<_>>>()?;
    assert_eq!(1, after.len());
    assert_eq!(Some("20260103"), after[0].full_key.get("date"));

    let newest = Request::new()
        .with("class", vec!["od".into()])
        .with("date", vec!["20260103".into()])
        .with("param", vec!["130".into()]);
    let retrieved: Vec<_> = fdb.retrieve(&newest, CancellationToken::default())?.collect::<Result<Vec<_>>>()?;
    assert_eq!(1, retrieved.len());
    assert_eq!(b"gen-3".as_slice(), retrieved[0].bytes.as_slice());

    let oldest = Request::new()
        .with("class", vec!["od".into()])
        .with("date", vec!["20260101".into()])
        .with("param", vec!["130".into()]);
    let gone: Vec<_> = fdb.retrieve(&oldest, CancellationToken::default())?.collect::<Result<Vec<_>>>()?;
    assert!(gone.is_empty());

    Ok(())
}
