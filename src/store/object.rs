// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The object-bucket [`Store`] backend, built on the `object_store` crate
//! so any of its providers (S3, GCS, Azure, local, in-memory) works behind
//! the same synchronous [`Store`] contract.

use super::Store;
use crate::key::Key;
use crate::location::FieldLocation;
use crate::slice::Slice;
use crate::Result;
use futures::executor::block_on;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore as _, PutPayload};
use std::sync::Arc;

pub struct ObjectStoreBackend {
    bucket: String,
    prefix: String,
    inner: Arc<dyn object_store::ObjectStore>,
    bytes_written: u64,
}

impl ObjectStoreBackend {
    #[must_use]
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>, inner: Arc<dyn object_store::ObjectStore>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            inner,
            bytes_written: 0,
        }
    }

    fn object_path(&self, index_key: &Key) -> ObjectPath {
        ObjectPath::from(format!("{}/{}.dat", self.prefix, index_key))
    }
}

impl Store for ObjectStoreBackend {
    fn archive(&mut self, index_key: &Key, bytes: &[u8]) -> Result<FieldLocation> {
        let path = self.object_path(index_key);
        let len = bytes.len() as u64;

        block_on(self.inner.put(&path, PutPayload::from(bytes.to_vec())))?;
        self.bytes_written += len;

        log::trace!("object store: archived {len} bytes to {path}");

        Ok(FieldLocation::ObjectStore {
            bucket: self.bucket.clone(),
            object: path.to_string(),
            offset: 0,
            length: len,
            remap_key: None,
        })
    }

    fn retrieve(&self, location: &FieldLocation) -> Result<Slice> {
        let FieldLocation::ObjectStore { object, offset, length, .. } = location else {
            return Err(crate::Error::Unsupported(
                "object store cannot resolve a non-object-store location",
            ));
        };

        let path = ObjectPath::from(object.as_str());
        let range = *offset..*offset + *length;
        let result = block_on(self.inner.get_range(&path, range))?;

        Ok(Slice::from(result.to_vec()))
    }

    fn flush(&mut self) -> Result<u64> {
        // object_store's `put` is durable on return; nothing buffered here.
        Ok(self.bytes_written)
    }

    fn remove(&mut self, uri: &str, doit: bool) -> Result<()> {
        let Some(object) = uri.strip_prefix("object://").and_then(|rest| rest.split_once('/')) else {
            return Ok(());
        };

        if doit {
            let path = ObjectPath::from(object.1);
            block_on(self.inner.delete(&path))?;
            log::debug!("object store: removed {uri}");
        } else {
            log::info!("object store: would remove {uri} (doit=false)");
        }
        Ok(())
    }

    fn uri_belongs(&self, uri: &str) -> bool {
        uri.strip_prefix("object://")
            .map(|rest| rest.starts_with(&format!("{}/{}", self.bucket, self.prefix)))
            .unwrap_or(false)
    }

    fn collocated_data_uris(&self) -> Result<Vec<String>> {
        let prefix = ObjectPath::from(self.prefix.as_str());
        let listing = block_on(async {
            use futures::StreamExt;
            self.inner
                .list(Some(&prefix))
                .map(|meta| meta.map(|m| m.location.to_string()))
                .collect::<Vec<_>>()
                .await
        });

        let mut uris = Vec::new();
        for item in listing {
            let location = item?;
            uris.push(format!("object://{}/{location}", self.bucket));
        }
        Ok(uris)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use test_log::test;

    #[test]
    fn archive_then_retrieve_round_trips() -> Result<()> {
        let mut store = ObjectStoreBackend::new("bucket", "db", Arc::new(InMemory::new()));

        let mut index_key = Key::new();
        index_key.set("date", "20260101");

        let location = store.archive(&index_key, b"weather bytes")?;
        let bytes = store.retrieve(&location)?;
        assert_eq!(b"weather bytes".as_slice(), bytes.as_slice());
        Ok(())
    }

    #[test]
    fn uri_belongs_checks_bucket_and_prefix() {
        let store = ObjectStoreBackend::new("bucket", "db", Arc::new(InMemory::new()));
        assert!(store.uri_belongs("object://bucket/db/foo.dat"));
        assert!(!store.uri_belongs("object://other/db/foo.dat"));
    }
}
