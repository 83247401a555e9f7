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

fn full_key(d: &str, e: &str, f: &str) -> Key {
    let mut key = Key::new();
    key.set("a", "1");
    key.set("b", "2");
    key.set("c", "3");
    key.set("d", d);
    key.set("e", e);
    key.set("f", f);
    key
}

#[test]
fn wipe_of_one_index_leaves_sibling_index_and_metadata_intact() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fdb = three_level_fdb(dir.path());

    let mut db_key = Key::new();
    db_key.set("a", "1");
    db_key.set("b", "2");

    let mut archiver = fdb.create(&db_key, b"schema-bytes".to_vec())?;
    archiver.archive(&full_key("4", "5", "6"), b"one", None, None)?;
    archiver.archive(&full_key("4", "7", "8"), b"two", None, None)?;
    archiver.archive(&full_key("9", "5", "6"), b"three", None, None)?;
    archiver.archive(&full_key("9", "7", "8"), b"four", None, None)?;
    archiver.flush()?;

    let index_request = Request::new().with("c", vec!["3".into()]).with("d", vec!["4".into()]);
    let report = fdb.wipe(&db_key, &index_request, true, false)?;

    assert!(report.is_partial);
    assert_eq!(1, report.masked_indexes);
    assert_eq!(1, report.deleted_data_uris);
    assert_eq!(0, report.deleted_metadata_paths);

    assert!(dir.path().join("toc").exists());
    assert!(dir.path().join("schema").exists());

    let wiped_request = Request::new()
        .with("a", vec!["1".into()])
        .with("b", vec!["2".into()])
        .with("c", vec!["3".into()])
        .with("d", vec!["4".into()])
        .with("e", vec!["5".into(), "7".into()])
        .with("f", vec!["6".into(), "8".into()]);
    let wiped: Vec<_> = fdb.list(&wiped_request, CancellationToken::default())?.collect::<Result<Vec<_>>>()?;
    assert!(wiped.is_empty());

    let surviving_request = Request::new()
        .with("a", vec!["1".into()])
        .with("b", vec!["2".into()])
        .with("c", vec!["3".into()])
        .with("d", vec!["9".into()])
        .with("e", vec!["5".into(), "7".into()])
        .with("f", vec!["6".into(), "8".into()]);
    let surviving: Vec<_> = fdb.list(&surviving_request, CancellationToken::default())?.collect::<Result<Vec<_>>>()?;
    assert_eq!(2, surviving.len());

    Ok(())
}
