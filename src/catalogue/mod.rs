// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The [`Catalogue`] trait and its backends: per-DB metadata storage
//! mapping `(index_key, field_key)` to a [`FieldLocation`].

pub mod axis;
pub mod index;
pub mod local;

use crate::field::{Details, Field};
use crate::key::Key;
use crate::location::{FieldLocation, RemapKey};
use crate::Result;
use enum_dispatch::enum_dispatch;
use index::{Index, IndexLocation};

/// One live `(index_key, Index)` pair, as returned by [`Catalogue::visit`]
/// for list/wipe/purge to walk without needing to know backend internals.
pub struct IndexEntry<'a> {
    pub index_key: Key,
    pub location: IndexLocation,
    pub index: &'a Index,
}

#[enum_dispatch]
pub trait Catalogue {
    /// The db-key this Catalogue instance is open for.
    fn db_key(&self) -> &Key;

    /// Ensures an Index exists in memory for `index_key`, creating an
    /// empty one if this is the first field archived under it.
    fn select_index(&mut self, index_key: &Key) -> Result<()>;

    /// Records `field_key -> location` under `index_key`'s Index.
    fn put(
        &mut self,
        index_key: &Key,
        fingerprint: &str,
        field_key: &Key,
        location: FieldLocation,
        details: Details,
    ) -> Result<()>;

    /// Looks up a single field.
    fn get(
        &self,
        index_key: &Key,
        fingerprint: &str,
        remap_key: RemapKey,
    ) -> Result<Option<Field>>;

    /// Persists all indexes touched since the last flush, masking their
    /// previous on-disk generation first (store-before-catalogue ordering
    /// is enforced by the archive pipeline, not here).
    fn flush(&mut self) -> Result<()>;

    /// Masks a specific index (used by wipe/purge).
    fn mask_index(&mut self, index_key: &Key) -> Result<()>;

    /// Masks everything: used by a full wipe.
    fn mask_all(&mut self) -> Result<()>;

    /// Lists every currently-live index, newest declaration first.
    fn visit(&self) -> Vec<IndexEntry<'_>>;

    /// All metadata file paths owned by this DB (TOC, schema, sub-TOCs) —
    /// used by the wipe coordinator to account for non-data files.
    fn metadata_paths(&self) -> Vec<std::path::PathBuf>;
}

#[enum_dispatch(Catalogue)]
pub enum AnyCatalogue {
    Local(local::LocalCatalogue),
}
