// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The local, TOC-backed [`Catalogue`] implementation: one DB directory,
//! one append-only log, an in-memory map of live [`Index`]es reconstructed
//! from it on open.

use super::index::{Index, IndexLocation};
use super::{Catalogue, IndexEntry};
use crate::field::{Details, Field};
use crate::file::{SCHEMA_FILE_NAME, TOC_FILE_NAME};
use crate::key::Key;
use crate::location::{FieldLocation, RemapKey};
use crate::serde::{Deserializable, Serializable};
use crate::toc::record::IndexPayload;
use crate::toc::TocLog;
use crate::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

pub struct LocalCatalogue {
    db_key: Key,
    root: PathBuf,
    toc: TocLog,
    live: FxHashMap<String, (Key, IndexLocation, Index)>,
    dirty: FxHashSet<String>,
}

impl LocalCatalogue {
    pub fn create(root: &Path, db_key: Key, schema_bytes: &[u8]) -> Result<Self> {
        let toc = TocLog::create(root, &db_key.to_string(), schema_bytes)?;
        Ok(Self {
            db_key,
            root: root.to_path_buf(),
            toc,
            live: FxHashMap::default(),
            dirty: FxHashSet::default(),
        })
    }

    pub fn open(root: &Path, db_key: Key) -> Result<Self> {
        let toc = TocLog::open(root);
        let mut live = FxHashMap::default();

        for loaded in toc.load_indexes(false)? {
            if live.contains_key(&loaded.payload.path) {
                continue;
            }

            let index = Index::deserialize(&mut loaded.payload.blob.as_slice())?;
            let index_key = parse_canonical(&loaded.payload.path);
            live.insert(
                loaded.payload.path.clone(),
                (
                    index_key,
                    IndexLocation {
                        file: loaded.file,
                        offset: loaded.offset,
                    },
                    index,
                ),
            );
        }

        Ok(Self {
            db_key,
            root: root.to_path_buf(),
            toc,
            live,
            dirty: FxHashSet::default(),
        })
    }
}

/// Index keys round-trip through their canonical `name=value,...` string:
/// parsed back into a [`Key`] purely for display/listing purposes (the
/// authoritative lookup path always re-derives the canonical string from a
/// freshly matched key rather than parsing this back).
fn parse_canonical(canonical: &str) -> Key {
    canonical
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Catalogue for LocalCatalogue {
    fn db_key(&self) -> &Key {
        &self.db_key
    }

    fn select_index(&mut self, index_key: &Key) -> Result<()> {
        let canonical = index_key.to_string();
        self.live.entry(canonical).or_insert_with(|| {
            (index_key.clone(), IndexLocation { file: String::new(), offset: 0 }, Index::new(1))
        });
        Ok(())
    }

    fn put(
        &mut self,
        index_key: &Key,
        fingerprint: &str,
        field_key: &Key,
        location: FieldLocation,
        details: Details,
    ) -> Result<()> {
        self.select_index(index_key)?;
        let canonical = index_key.to_string();

        let (_, _, index) = self
            .live
            .get_mut(&canonical)
            .expect("select_index just inserted this entry");
        index.put(fingerprint, field_key, &location, details);

        self.dirty.insert(canonical);
        log::trace!("catalogue: put {fingerprint} into index {index_key}");
        Ok(())
    }

    fn get(
        &self,
        index_key: &Key,
        fingerprint: &str,
        remap_key: RemapKey,
    ) -> Result<Option<Field>> {
        let canonical = index_key.to_string();
        Ok(self
            .live
            .get(&canonical)
            .and_then(|(_, _, index)| index.get(fingerprint, remap_key)))
    }

    fn flush(&mut self) -> Result<()> {
        let dirty: Vec<String> = self.dirty.drain().collect();

        for canonical in dirty {
            let Some((index_key, location, index)) = self.live.get(&canonical) else {
                continue;
            };

            if !location.file.is_empty() {
                self.toc.mask(&location.file, location.offset)?;
            }

            let mut blob = Vec::new();
            index.serialize(&mut blob)?;

            let payload = IndexPayload {
                path: canonical.clone(),
                offset: 0,
                index_type: index.index_type(),
                blob,
            };

            let new_offset = self.toc.add_index(&payload)?;
            log::debug!("catalogue: flushed index {index_key} at offset {new_offset}");

            if let Some(entry) = self.live.get_mut(&canonical) {
                entry.1 = IndexLocation {
                    file: TOC_FILE_NAME.to_string(),
                    offset: new_offset,
                };
            }
        }

        Ok(())
    }

    fn mask_index(&mut self, index_key: &Key) -> Result<()> {
        let canonical = index_key.to_string();
        self.dirty.remove(&canonical);

        if let Some((_, location, _)) = self.live.remove(&canonical) {
            if !location.file.is_empty() {
                self.toc.mask(&location.file, location.offset)?;
            }
        }

        Ok(())
    }

    fn mask_all(&mut self) -> Result<()> {
        self.toc.mask_all()?;
        self.live.clear();
        self.dirty.clear();
        Ok(())
    }

    fn visit(&self) -> Vec<IndexEntry<'_>> {
        self.live
            .values()
            .map(|(index_key, location, index)| IndexEntry {
                index_key: index_key.clone(),
                location: location.clone(),
                index,
            })
            .collect()
    }

    /// The primary TOC, the schema copy, and every sibling sub-TOC file
    /// (named `toc.<suffix>` alongside the primary log).
    fn metadata_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.root.join(TOC_FILE_NAME), self.root.join(SCHEMA_FILE_NAME)];

        if let Ok(entries) = std::fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with("toc.") {
                    paths.push(entry.path());
                }
            }
        }

        paths
    }
}
