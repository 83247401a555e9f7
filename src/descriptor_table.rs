// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use quick_cache::{sync::Cache as QuickCache, UnitWeighter};
use std::{fs::File, path::PathBuf, sync::Arc};

type Item = Arc<File>;

/// Caches read-only file descriptors for index and data files.
///
/// Distinct from the local store's `DataHandlePool` (`store::local`), which
/// owns the *write* handles used by an active archive session: this table
/// is purely a read-side LRU, shared process-wide, and safe to evict from at
/// any time since the writer side owns durability.
pub struct DescriptorTable {
    inner: QuickCache<PathBuf, Item, UnitWeighter, rustc_hash::FxBuildHasher>,
}

impl DescriptorTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        use quick_cache::sync::DefaultLifecycle;

        #[allow(clippy::default_trait_access)]
        let quick_cache = QuickCache::with(
            1_000,
            capacity as u64,
            UnitWeighter,
            Default::default(),
            DefaultLifecycle::default(),
        );

        Self { inner: quick_cache }
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    #[must_use]
    pub fn access(&self, path: &PathBuf) -> Option<Arc<File>> {
        self.inner.get(path)
    }

    pub fn insert(&self, path: PathBuf, item: Item) {
        self.inner.insert(path, item);
    }

    pub fn remove(&self, path: &PathBuf) {
        self.inner.remove(path);
    }
}
