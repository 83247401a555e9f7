// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Capability-gated stub for the fabric-attached-memory backend. Real
//! FAM/RDMA-region attach is host- and hardware-specific and out of scope
//! here; this variant exists so the backend set stays complete and every
//! call site handles it uniformly through [`crate::Error::Unsupported`]
//! rather than a special-cased panic.

use super::Store;
use crate::key::Key;
use crate::location::FieldLocation;
use crate::slice::Slice;
use crate::{Error, Result};

#[derive(Default)]
pub struct FamStore {
    region: String,
}

impl FamStore {
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

impl Store for FamStore {
    fn archive(&mut self, _index_key: &Key, _bytes: &[u8]) -> Result<FieldLocation> {
        Err(Error::Unsupported("FAM store: archive not available in this build"))
    }

    fn retrieve(&self, _location: &FieldLocation) -> Result<Slice> {
        Err(Error::Unsupported("FAM store: retrieve not available in this build"))
    }

    fn flush(&mut self) -> Result<u64> {
        Err(Error::Unsupported("FAM store: flush not available in this build"))
    }

    fn remove(&mut self, _uri: &str, _doit: bool) -> Result<()> {
        Err(Error::Unsupported("FAM store: remove not available in this build"))
    }

    fn uri_belongs(&self, uri: &str) -> bool {
        uri.starts_with(&format!("fam://{}/", self.region))
    }

    fn collocated_data_uris(&self) -> Result<Vec<String>> {
        Err(Error::Unsupported("FAM store: enumeration not available in this build"))
    }
}
