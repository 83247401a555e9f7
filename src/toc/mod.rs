// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The append-only table-of-contents log: the source of truth a
//! [`crate::catalogue::Catalogue`] reconstructs its in-memory state from.

pub mod record;

use crate::file::{self, SCHEMA_FILE_NAME, TOC_FILE_NAME};
use crate::serde::{Deserializable, Serializable};
use crate::Result;
use record::{ClearPayload, IndexPayload, InitPayload, Record, SubTocPayload, Tag, RECORD_SIZE_DEFAULT};
use std::path::{Path, PathBuf};

/// An `INDEX` record, resolved to the file (by name) and byte offset that
/// identify it for masking purposes, read back from `load_indexes`.
#[derive(Clone, Debug)]
pub struct LoadedIndex {
    pub file: String,
    pub offset: u64,
    pub payload: IndexPayload,
}

#[derive(Clone, Debug)]
enum Entry {
    Index {
        file: String,
        offset: u64,
        seq: u64,
        guard: Vec<(String, u64)>,
        payload: IndexPayload,
    },
    SubTocRef {
        file: String,
        offset: u64,
        seq: u64,
        guard: Vec<(String, u64)>,
    },
    Clear {
        payload: ClearPayload,
        seq: u64,
    },
}

/// Handle onto one DB's TOC log (and, transitively, its sub-TOCs).
pub struct TocLog {
    root: PathBuf,
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

impl TocLog {
    /// Creates a fresh DB directory: copies the schema bytes atomically and
    /// writes a `toc` file containing a single `INIT` record.
    pub fn create(root: &Path, db_key: &str, schema_bytes: &[u8]) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        file::rewrite_atomic(&root.join(SCHEMA_FILE_NAME), schema_bytes)?;

        let log = Self {
            root: root.to_path_buf(),
        };

        let init = InitPayload {
            db_key: db_key.to_string(),
            is_sub_toc: false,
            parent_key: None,
        };
        log.append_primary(Tag::Init, &init)?;

        log::debug!("created TOC for {db_key} at {}", root.display());
        Ok(log)
    }

    /// Creates a sub-TOC file owned by a single writer, under the same DB
    /// directory, for lock-free concurrent archiving (§ sub-TOC protocol).
    pub fn create_sub_toc(root: &Path, db_key: &str, suffix: &str) -> Result<(Self, String)> {
        let name = file::sub_toc_name(suffix);
        let path = root.join(&name);

        let init = InitPayload {
            db_key: db_key.to_string(),
            is_sub_toc: true,
            parent_key: None,
        };

        let mut payload_bytes = Vec::new();
        init.serialize(&mut payload_bytes)?;
        let record = Record::new(Tag::Init, payload_bytes);
        file::append_atomic(&path, &record.encode_padded()?)?;

        Ok((
            Self {
                root: root.to_path_buf(),
            },
            name,
        ))
    }

    /// Opens an existing DB directory without touching it.
    #[must_use]
    pub fn open(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn primary_path(&self) -> PathBuf {
        self.root.join(TOC_FILE_NAME)
    }

    fn append_primary<P: Serializable>(&self, tag: Tag, payload: &P) -> Result<u64> {
        self.append_to(&self.primary_path(), tag, payload)
    }

    /// Appends one record to `path`, returning the byte offset it was
    /// written at (its identity for later `mask` calls).
    fn append_to<P: Serializable>(&self, path: &Path, tag: Tag, payload: &P) -> Result<u64> {
        let mut bytes = Vec::new();
        payload.serialize(&mut bytes)?;
        let record = Record::new(tag, bytes);

        let offset = if file::exists(path) {
            std::fs::metadata(path)?.len()
        } else {
            0
        };

        file::append_atomic(path, &record.encode_padded()?)?;
        Ok(offset)
    }

    /// Appends one `INDEX` record to the primary TOC, returning its offset.
    pub fn add_index(&self, payload: &IndexPayload) -> Result<u64> {
        self.append_primary(Tag::Index, payload)
    }

    /// Appends one `INDEX` record to a named sub-TOC file.
    pub fn add_index_to(&self, sub_toc_file: &str, payload: &IndexPayload) -> Result<u64> {
        self.append_to(&self.root.join(sub_toc_file), Tag::Index, payload)
    }

    /// Masks a specific prior `INDEX` or `SUB_TOC` record.
    pub fn mask(&self, path: &str, offset: u64) -> Result<()> {
        self.append_primary(
            Tag::Clear,
            &ClearPayload {
                path: path.to_string(),
                offset,
            },
        )?;
        Ok(())
    }

    /// Masks every record written before this point.
    pub fn mask_all(&self) -> Result<()> {
        self.append_primary(Tag::Clear, &ClearPayload::mask_all())?;
        Ok(())
    }

    /// References a sibling sub-TOC file from the primary TOC, returning
    /// the offset of the `SUB_TOC` reference record itself.
    pub fn add_sub_toc(&self, sub_toc_file: &str) -> Result<u64> {
        self.append_primary(
            Tag::SubToc,
            &SubTocPayload {
                path: sub_toc_file.to_string(),
            },
        )
    }

    /// Consolidates a sub-TOC: copies `payloads` into the primary TOC as
    /// fresh `INDEX` records, then masks the `SUB_TOC` reference so future
    /// readers stop descending into it, flattening history without loss.
    ///
    /// The `SUB_TOC` reference record being masked lives in the *primary*
    /// TOC, not in `sub_toc_file` itself — `scan`'s guard chain records
    /// `(referencing file, reference offset)`, so the mask must match that
    /// pair, not the referenced file's own name.
    pub fn consolidate_sub_toc(
        &self,
        sub_toc_file: &str,
        sub_toc_ref_offset: u64,
        payloads: &[IndexPayload],
    ) -> Result<()> {
        for payload in payloads {
            self.add_index(payload)?;
        }
        self.mask(TOC_FILE_NAME, sub_toc_ref_offset)?;
        log::debug!("consolidated sub-TOC {sub_toc_file} ({} entries) into primary", payloads.len());
        Ok(())
    }

    fn read_records(path: &Path) -> Result<Vec<(u64, Record)>> {
        if !file::exists(path) {
            return Ok(Vec::new());
        }

        let bytes = std::fs::read(path)?;
        let mut out = Vec::new();
        let mut offset = 0u64;

        while (offset as usize + RECORD_SIZE_DEFAULT) <= bytes.len() {
            let slot = &bytes[offset as usize..offset as usize + RECORD_SIZE_DEFAULT];
            out.push((offset, Record::decode(slot)?));
            offset += RECORD_SIZE_DEFAULT as u64;
        }

        Ok(out)
    }

    fn scan(
        &self,
        file_name: &str,
        guard: Vec<(String, u64)>,
        seq: &mut u64,
        out: &mut Vec<Entry>,
    ) -> Result<()> {
        let path = self.root.join(file_name);
        for (offset, record) in Self::read_records(&path)? {
            let this_seq = *seq;
            *seq += 1;

            match record.header.tag {
                Tag::Init => {}
                Tag::Index => {
                    let payload = IndexPayload::deserialize(&mut record.payload.as_slice())?;
                    out.push(Entry::Index {
                        file: file_name.to_string(),
                        offset,
                        seq: this_seq,
                        guard: guard.clone(),
                        payload,
                    });
                }
                Tag::Clear => {
                    let payload = ClearPayload::deserialize(&mut record.payload.as_slice())?;
                    out.push(Entry::Clear {
                        payload,
                        seq: this_seq,
                    });
                }
                Tag::SubToc => {
                    let payload = SubTocPayload::deserialize(&mut record.payload.as_slice())?;
                    out.push(Entry::SubTocRef {
                        file: file_name.to_string(),
                        offset,
                        seq: this_seq,
                        guard: guard.clone(),
                    });

                    let mut nested_guard = guard.clone();
                    nested_guard.push((file_name.to_string(), offset));
                    self.scan(&payload.path, nested_guard, seq, out)?;
                }
            }
        }
        Ok(())
    }

    /// Reconstructs the set of currently-live `INDEX` records, following
    /// `SUB_TOC` splices and applying the masked-set computation. Returned
    /// in reverse insertion order unless `sorted` is set, in which case the
    /// result is ordered by `(file, offset)` for sequential-read locality.
    pub fn load_indexes(&self, sorted: bool) -> Result<Vec<LoadedIndex>> {
        let mut entries = Vec::new();
        let mut seq = 0u64;
        self.scan(TOC_FILE_NAME, Vec::new(), &mut seq, &mut entries)?;

        let mut masked: std::collections::HashSet<(String, u64)> =
            std::collections::HashSet::default();
        let mut mask_all_before: Vec<u64> = Vec::new();

        for entry in &entries {
            if let Entry::Clear { payload, seq } = entry {
                if payload.is_mask_all() {
                    mask_all_before.push(*seq);
                } else {
                    masked.insert((basename(&payload.path), payload.offset));
                }
            }
        }

        let is_masked = |file: &str, offset: u64, seq: u64, guard: &[(String, u64)]| -> bool {
            if masked.contains(&(basename(file), offset)) {
                return true;
            }
            if mask_all_before.iter().any(|&clear_seq| clear_seq > seq) {
                return true;
            }
            for (gfile, goffset) in guard {
                if masked.contains(&(basename(gfile), *goffset)) {
                    return true;
                }
            }
            false
        };

        let mut result: Vec<LoadedIndex> = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Index {
                    file,
                    offset,
                    seq,
                    guard,
                    payload,
                } if !is_masked(&file, offset, seq, &guard) => Some(LoadedIndex {
                    file,
                    offset,
                    payload,
                }),
                _ => None,
            })
            .collect();

        if sorted {
            result.sort_by(|a, b| a.file.cmp(&b.file).then(a.offset.cmp(&b.offset)));
        } else {
            result.reverse();
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn sample_index(tag: &str) -> IndexPayload {
        IndexPayload {
            path: "index.dat".into(),
            offset: 0,
            index_type: 1,
            blob: tag.as_bytes().to_vec(),
        }
    }

    #[test]
    fn create_and_load_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = TocLog::create(dir.path(), "class=od,stream=oper", b"schema-bytes")?;
        assert!(log.load_indexes(false)?.is_empty());
        Ok(())
    }

    #[test]
    fn add_index_is_visible_in_reverse_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = TocLog::create(dir.path(), "db", b"schema")?;

        log.add_index(&sample_index("first"))?;
        log.add_index(&sample_index("second"))?;

        let loaded = log.load_indexes(false)?;
        assert_eq!(2, loaded.len());
        assert_eq!(b"second".to_vec(), loaded[0].payload.blob);
        assert_eq!(b"first".to_vec(), loaded[1].payload.blob);
        Ok(())
    }

    #[test]
    fn clear_masks_specific_record() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = TocLog::create(dir.path(), "db", b"schema")?;

        log.add_index(&sample_index("keep"))?;
        // Second INDEX record lives at offset 2 * RECORD_SIZE_DEFAULT (INIT, INDEX, then this one).
        log.add_index(&sample_index("drop"))?;
        log.mask(TOC_FILE_NAME, 2 * RECORD_SIZE_DEFAULT as u64)?;

        let loaded = log.load_indexes(false)?;
        assert_eq!(1, loaded.len());
        assert_eq!(b"keep".to_vec(), loaded[0].payload.blob);
        Ok(())
    }

    #[test]
    fn mask_all_hides_every_prior_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = TocLog::create(dir.path(), "db", b"schema")?;

        log.add_index(&sample_index("old"))?;
        log.mask_all()?;
        log.add_index(&sample_index("new"))?;

        let loaded = log.load_indexes(false)?;
        assert_eq!(1, loaded.len());
        assert_eq!(b"new".to_vec(), loaded[0].payload.blob);
        Ok(())
    }

    #[test]
    fn sub_toc_records_are_spliced_in() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = TocLog::create(dir.path(), "db", b"schema")?;

        let (sub_log, sub_name) = TocLog::create_sub_toc(dir.path(), "db", "w1")?;
        sub_log.add_index_to(&sub_name, &sample_index("from-subtoc"))?;
        log.add_sub_toc(&sub_name)?;

        let loaded = log.load_indexes(false)?;
        assert_eq!(1, loaded.len());
        assert_eq!(b"from-subtoc".to_vec(), loaded[0].payload.blob);
        Ok(())
    }

    #[test]
    fn consolidate_hides_sub_toc_after_copying_entries() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = TocLog::create(dir.path(), "db", b"schema")?;

        let (sub_log, sub_name) = TocLog::create_sub_toc(dir.path(), "db", "w1")?;
        sub_log.add_index_to(&sub_name, &sample_index("a"))?;
        sub_log.add_index_to(&sub_name, &sample_index("b"))?;
        log.add_sub_toc(&sub_name)?;

        // The SUB_TOC reference record is the second record in the primary
        // TOC (after INIT), at offset 1 * RECORD_SIZE_DEFAULT.
        log.consolidate_sub_toc(
            &sub_name,
            RECORD_SIZE_DEFAULT as u64,
            &[sample_index("a"), sample_index("b")],
        )?;

        let loaded = log.load_indexes(false)?;
        let blobs: Vec<_> = loaded.iter().map(|l| l.payload.blob.clone()).collect();
        assert_eq!(2, blobs.len());
        assert!(blobs.contains(&b"a".to_vec()));
        assert!(blobs.contains(&b"b".to_vec()));
        Ok(())
    }
}
