// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Retrieval: resolves every [`crate::list::ListEntry`] a listing
//! produces into actual bytes, opening each field's owning [`Store`] on
//! demand.

use crate::catalogue::Catalogue;
use crate::key::Key;
use crate::list::{list, CancellationToken, ListEntry};
use crate::schema::{Request, Schema};
use crate::slice::Slice;
use crate::store::Store;
use crate::{Error, Result};

/// A retrieved field: its full key, opaque details, and bytes.
pub struct RetrievedField {
    pub full_key: Key,
    pub bytes: Slice,
}

/// Lazily retrieves every field an expanded request matches. `open_store`
/// is consulted once per resolved field's backend-agnostic location — a
/// real implementation typically caches one `Store` per db-key the same
/// way `open_catalogue` does.
pub fn retrieve<C, OC, S, OS>(
    schema: &Schema,
    request: &Request,
    mut open_catalogue: OC,
    mut open_store: OS,
    cancel: CancellationToken,
) -> Result<impl Iterator<Item = Result<RetrievedField>>>
where
    C: Catalogue,
    OC: FnMut(&Key) -> Result<Option<C>>,
    S: Store,
    OS: FnMut(&Key) -> Result<S>,
{
    let listing = list(
        schema,
        request,
        move |db_key| open_catalogue(db_key),
        cancel,
    )?;

    Ok(listing.map(move |entry: Result<ListEntry>| {
        let entry = entry?;
        let store = open_store(&entry.full_key)?;
        let bytes = store.retrieve(&entry.field.location)?;
        Ok(RetrievedField {
            full_key: entry.full_key,
            bytes,
        })
    }))
}

/// Retrieves the single field named by a fully-specified key, or
/// `Error::NotFound` if it has never been archived.
pub fn retrieve_one<C, S>(
    schema: &Schema,
    catalogue: &C,
    store: &S,
    full_key: &Key,
) -> Result<RetrievedField>
where
    C: Catalogue,
    S: Store,
{
    let (_, index_key, field_key) = schema.match_level(full_key)?;
    let fingerprint = field_key.to_string();

    let field = catalogue
        .get(&index_key, &fingerprint, None)?
        .ok_or_else(|| Error::NotFound(full_key.to_string()))?;

    let bytes = store.retrieve(&field.location)?;
    Ok(RetrievedField {
        full_key: full_key.clone(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::local::LocalCatalogue;
    use crate::schema::Rule;
    use crate::store::local::LocalStore;
    use test_log::test;

    fn schema() -> Schema {
        Schema::new(vec![Rule::new(["class"], ["date"], ["param"])])
    }

    #[test]
    fn retrieve_one_returns_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut db_key = Key::new();
        db_key.set("class", "od");

        let mut cat = LocalCatalogue::create(dir.path(), db_key, b"schema")?;
        let mut store = LocalStore::new(dir.path().to_path_buf(), 8);

        let mut index_key = Key::new();
        index_key.set("date", "20260101");
        let location = store.archive(&index_key, b"field-bytes")?;

        let mut field_key = Key::new();
        field_key.set("param", "130");
        cat.put(&index_key, "param=130", &field_key, location, None)?;
        cat.flush()?;

        let mut full_key = Key::new();
        full_key.set("class", "od");
        full_key.set("date", "20260101");
        full_key.set("param", "130");

        let retrieved = retrieve_one(&schema(), &cat, &store, &full_key)?;
        assert_eq!(b"field-bytes".as_slice(), retrieved.bytes.as_slice());
        Ok(())
    }

    #[test]
    fn retrieve_one_reports_not_found() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut db_key = Key::new();
        db_key.set("class", "od");

        let cat = LocalCatalogue::create(dir.path(), db_key, b"schema")?;
        let store = LocalStore::new(dir.path().to_path_buf(), 8);

        let mut full_key = Key::new();
        full_key.set("class", "od");
        full_key.set("date", "20260101");
        full_key.set("param", "999");

        assert!(matches!(
            retrieve_one(&schema(), &cat, &store, &full_key),
            Err(Error::NotFound(_))
        ));
        Ok(())
    }
}
