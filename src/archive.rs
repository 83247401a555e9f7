// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The archive pipeline: schema-driven decomposition of a full key,
//! store-then-catalogue write, and the store-before-catalogue flush
//! barrier.

use crate::catalogue::Catalogue;
use crate::field::Details;
use crate::key::Key;
use crate::location::FieldLocation;
use crate::schema::Schema;
use crate::store::Store;
use crate::{Error, Result};

/// Invoked after a field's bytes are durably written and its location is
/// known, so producers can compute sidecar files from the same payload.
pub type ArchiveCallback<'a> = &'a mut dyn FnMut(&[u8], u64, &FieldLocation);

/// Binds one DB's [`Catalogue`] and [`Store`] under a shared [`Schema`] for
/// a single archive session. Exclusively owned by its writer, per the
/// ownership contract: `Store`/`Catalogue` are not meant to be archived
/// into concurrently from two `Archiver`s.
pub struct Archiver<C: Catalogue, S: Store> {
    schema: Schema,
    catalogue: C,
    store: S,
}

impl<C: Catalogue, S: Store> Archiver<C, S> {
    pub fn new(schema: Schema, catalogue: C, store: S) -> Self {
        Self {
            schema,
            catalogue,
            store,
        }
    }

    #[must_use]
    pub fn catalogue(&self) -> &C {
        &self.catalogue
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Archives `bytes` under `full_key`, with an optional per-field
    /// callback and opaque details attached to the field.
    pub fn archive(
        &mut self,
        full_key: &Key,
        bytes: &[u8],
        details: Details,
        mut callback: Option<ArchiveCallback<'_>>,
    ) -> Result<FieldLocation> {
        let (db_key, index_key, field_key) = self.schema.match_level(full_key)?;

        if db_key != *self.catalogue.db_key() {
            return Err(Error::Conflict(format!(
                "archive target db-key {db_key} does not match bound catalogue db-key {}",
                self.catalogue.db_key()
            )));
        }

        self.catalogue.select_index(&index_key)?;

        let location = self.store.archive(&index_key, bytes)?;
        let fingerprint = field_key.to_string();

        self.catalogue
            .put(&index_key, &fingerprint, &field_key, location.clone(), details)?;

        if let Some(callback) = callback.as_mut() {
            callback(bytes, bytes.len() as u64, &location);
        }

        log::debug!("archived {} bytes under {full_key}", bytes.len());
        Ok(location)
    }

    /// Durability barrier: store first, then catalogue, so a crash never
    /// leaves a dangling index entry pointing at unwritten bytes.
    pub fn flush(&mut self) -> Result<()> {
        let bytes_written = self.store.flush()?;
        self.catalogue.flush()?;
        log::debug!("flushed archiver, {bytes_written} bytes durable");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::local::LocalCatalogue;
    use crate::schema::Rule;
    use crate::store::local::LocalStore;
    use test_log::test;

    fn schema() -> Schema {
        Schema::new(vec![Rule::new(
            ["class", "expver", "stream"],
            ["date", "time"],
            ["param"],
        )])
    }

    fn full_key() -> Key {
        let mut key = Key::new();
        key.set("class", "od");
        key.set("expver", "0001");
        key.set("stream", "oper");
        key.set("date", "20260101");
        key.set("time", "1200");
        key.set("param", "130");
        key
    }

    #[test]
    fn archive_then_retrieve_via_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut db_key = Key::new();
        db_key.set("class", "od");
        db_key.set("expver", "0001");
        db_key.set("stream", "oper");

        let catalogue = LocalCatalogue::create(dir.path(), db_key, b"schema")?;
        let store = LocalStore::new(dir.path().to_path_buf(), 8);
        let mut archiver = Archiver::new(schema(), catalogue, store);

        let location = archiver.archive(&full_key(), b"grib-bytes", None, None)?;
        archiver.flush()?;

        let bytes = archiver.store().retrieve(&location)?;
        assert_eq!(b"grib-bytes".as_slice(), bytes.as_slice());
        Ok(())
    }

    #[test]
    fn archive_rejects_mismatched_db_key() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut wrong_db_key = Key::new();
        wrong_db_key.set("class", "rd");

        let catalogue = LocalCatalogue::create(dir.path(), wrong_db_key, b"schema")?;
        let store = LocalStore::new(dir.path().to_path_buf(), 8);
        let mut archiver = Archiver::new(schema(), catalogue, store);

        assert!(matches!(
            archiver.archive(&full_key(), b"x", None, None),
            Err(Error::Conflict(_))
        ));
        Ok(())
    }

    #[test]
    fn callback_observes_written_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut db_key = Key::new();
        db_key.set("class", "od");
        db_key.set("expver", "0001");
        db_key.set("stream", "oper");

        let catalogue = LocalCatalogue::create(dir.path(), db_key, b"schema")?;
        let store = LocalStore::new(dir.path().to_path_buf(), 8);
        let mut archiver = Archiver::new(schema(), catalogue, store);

        let mut seen_len = 0u64;
        let mut callback = |_bytes: &[u8], len: u64, _loc: &FieldLocation| {
            seen_len = len;
        };

        archiver.archive(&full_key(), b"payload", None, Some(&mut callback))?;
        assert_eq!(7, seen_len);
        Ok(())
    }
}
