// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`Field`], [`FieldRef`], and [`UriStore`]: the B-tree value types and the
//! per-Index `id <-> uri` table that keeps them compact.

use crate::location::{FieldLocation, RemapKey};
use rustc_hash::FxHashMap;

/// Opaque per-field metadata, set by the producer's archive callback and
/// carried through unmodified (e.g. checksum, originating host).
pub type Details = Option<String>;

/// A fully materialized field, as returned to a retrieval caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub location: FieldLocation,
    pub timestamp: (i64, i64),
    pub details: Details,
}

/// The value actually stored in an Index's B-tree: a compact reference into
/// the Index's [`UriStore`] plus the byte range and opaque details, so that
/// the B-tree itself never repeats a URI string per field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub uri_id: u32,
    pub offset: u64,
    pub length: u64,
    pub details: Details,
}

impl FieldRef {
    #[must_use]
    pub fn new(uri_id: u32, offset: u64, length: u64, details: Details) -> Self {
        Self {
            uri_id,
            offset,
            length,
            details,
        }
    }
}

/// Assigns a small integer id to each distinct URI an Index has ever
/// archived into, so `FieldRef` entries carry `(id, offset, length)`
/// instead of a repeated full URI string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UriStore {
    by_id: Vec<String>,
    by_uri: FxHashMap<String, u32>,
}

impl UriStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `uri`, assigning a fresh one if not yet known.
    pub fn intern(&mut self, uri: impl Into<String>) -> u32 {
        let uri = uri.into();
        if let Some(&id) = self.by_uri.get(&uri) {
            return id;
        }

        let id = u32::try_from(self.by_id.len()).expect("uri store overflow");
        self.by_id.push(uri.clone());
        self.by_uri.insert(uri, id);
        id
    }

    #[must_use]
    pub fn uri(&self, id: u32) -> Option<&str> {
        self.by_id.get(id as usize).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_id
            .iter()
            .enumerate()
            .map(|(id, uri)| (id as u32, uri.as_str()))
    }

    /// Rebuilds a `FieldLocation` from a `FieldRef`'s compact `(uri_id,
    /// offset, length)`, dispatching on the URI scheme, then applies
    /// `remap_key` if the owning DB is a mount/overlay.
    #[must_use]
    pub fn resolve(&self, field_ref: &FieldRef, remap_key: RemapKey) -> Option<FieldLocation> {
        let uri = self.uri(field_ref.uri_id)?;
        let mut location = parse_uri(uri, field_ref.offset, field_ref.length)?;
        if let Some(remap_key) = remap_key {
            location = location.with_remap_key(remap_key);
        }
        Some(location)
    }
}

fn parse_uri(uri: &str, offset: u64, length: u64) -> Option<FieldLocation> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Some(FieldLocation::LocalFile {
            path: rest.into(),
            offset,
            length,
            remap_key: None,
        });
    }
    if let Some(rest) = uri.strip_prefix("object://") {
        let (bucket, object) = rest.split_once('/')?;
        return Some(FieldLocation::ObjectStore {
            bucket: bucket.to_string(),
            object: object.to_string(),
            offset,
            length,
            remap_key: None,
        });
    }
    if let Some(rest) = uri.strip_prefix("fam://") {
        let (region, object) = rest.split_once('/')?;
        return Some(FieldLocation::Fam {
            region: region.to_string(),
            object: object.to_string(),
            offset,
            length,
            remap_key: None,
        });
    }
    if let Some(rest) = uri.strip_prefix("remote://") {
        let (endpoint, opaque_id) = rest.split_once('/')?;
        return Some(FieldLocation::Remote {
            endpoint: endpoint.to_string(),
            opaque_id: opaque_id.to_string(),
            length,
            remap_key: None,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable_per_uri() {
        let mut store = UriStore::new();
        let a = store.intern("file:///data/a.dat");
        let b = store.intern("file:///data/b.dat");
        let a_again = store.intern("file:///data/a.dat");

        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_eq!(2, store.len());
    }

    #[test]
    fn resolve_round_trips_local_file() {
        let mut store = UriStore::new();
        let id = store.intern("file:///data/a.dat");
        let field_ref = FieldRef::new(id, 10, 20, None);

        let location = store.resolve(&field_ref, None).unwrap();
        match location {
            FieldLocation::LocalFile {
                path,
                offset,
                length,
                ..
            } => {
                assert_eq!(std::path::Path::new("/data/a.dat"), path);
                assert_eq!(10, offset);
                assert_eq!(20, length);
            }
            other => panic!("unexpected location: {other:?}"),
        }
    }
}
