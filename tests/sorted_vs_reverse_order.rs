// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use fieldbase::toc::record::IndexPayload;
use fieldbase::toc::TocLog;
use fieldbase::Result;
use test_log::test;

fn index(tag: &str) -> IndexPayload {
    IndexPayload {
        path: "index.dat".into(),
        offset: 0,
        index_type: 1,
        blob: tag.as_bytes().to_vec(),
    }
}

/// `load_indexes(false)` is for a reader that wants the newest entry for a
/// key first; `load_indexes(true)` is for a writer consolidating a sub-TOC,
/// which wants sequential-read locality over raw recency.
#[test]
fn unsorted_is_newest_first_sorted_is_by_file_then_offset() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = TocLog::create(dir.path(), "db", b"schema")?;

    log.add_index(&index("a"))?;
    log.add_index(&index("b"))?;
    log.add_index(&index("c"))?;

    let reverse = log.load_indexes(false)?;
    let reverse_blobs: Vec<_> = reverse.iter().map(|l| l.payload.blob.clone()).collect();
    assert_eq!(vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()], reverse_blobs);

    let sorted = log.load_indexes(true)?;
    let sorted_blobs: Vec<_> = sorted.iter().map(|l| l.payload.blob.clone()).collect();
    assert_eq!(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()], sorted_blobs);

    let offsets: Vec<u64> = sorted.iter().map(|l| l.offset).collect();
    let mut ascending = offsets.clone();
    ascending.sort_unstable();
    assert_eq!(ascending, offsets);

    Ok(())
}
