// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Capability-gated stub for the remote-RPC store backend. The wire
//! protocol of a split-deployment remote store is out of scope (§1
//! Out of scope); this variant keeps the backend enum complete while every
//! method reports [`crate::Error::Unsupported`].

use super::Store;
use crate::key::Key;
use crate::location::FieldLocation;
use crate::slice::Slice;
use crate::{Error, Result};

#[derive(Default)]
pub struct RemoteStore {
    endpoint: String,
}

impl RemoteStore {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Store for RemoteStore {
    fn archive(&mut self, _index_key: &Key, _bytes: &[u8]) -> Result<FieldLocation> {
        Err(Error::Unsupported("remote store: archive not available in this build"))
    }

    fn retrieve(&self, _location: &FieldLocation) -> Result<Slice> {
        Err(Error::Unsupported("remote store: retrieve not available in this build"))
    }

    fn flush(&mut self) -> Result<u64> {
        Err(Error::Unsupported("remote store: flush not available in this build"))
    }

    fn remove(&mut self, _uri: &str, _doit: bool) -> Result<()> {
        Err(Error::Unsupported("remote store: remove not available in this build"))
    }

    fn uri_belongs(&self, uri: &str) -> bool {
        uri.starts_with(&format!("remote://{}/", self.endpoint))
    }

    fn collocated_data_uris(&self) -> Result<Vec<String>> {
        Err(Error::Unsupported("remote store: enumeration not available in this build"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_is_gated() {
        let store = RemoteStore::new("host:7654");
        let location = FieldLocation::Remote {
            endpoint: "host:7654".into(),
            opaque_id: "abc".into(),
            length: 1,
            remap_key: None,
        };
        assert!(matches!(store.retrieve(&location), Err(Error::Unsupported(_))));
    }
}
