// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`Index`]: one `(db-key, index-key)` level's field lookup table — a
//! B-tree keyed by canonical fingerprint, a [`UriStore`], and an [`Axes`]
//! aggregator, serialized wholesale into a single `INDEX` TOC record.

use crate::catalogue::axis::Axes;
use crate::field::{Details, Field, FieldRef, UriStore};
use crate::key::Key;
use crate::location::{FieldLocation, RemapKey};
use crate::serde::{DeserializeError, Deserializable, SerializeError, Serializable};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

/// `(path, offset)` of the `INDEX` TOC record this Index was (or will be)
/// materialized from — the identity used by the wipe/purge CLEAR protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexLocation {
    pub file: String,
    pub offset: u64,
}

/// In-memory state of one Index. The B-tree is the authoritative "file":
/// there is no separate on-disk paged structure, only this map serialized
/// into its INDEX record on every flush.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    index_type: u8,
    uri_store: UriStore,
    btree: BTreeMap<String, FieldRef>,
    axes: Axes,
}

impl Index {
    #[must_use]
    pub fn new(index_type: u8) -> Self {
        Self {
            index_type,
            uri_store: UriStore::new(),
            btree: BTreeMap::new(),
            axes: Axes::new(),
        }
    }

    #[must_use]
    pub fn index_type(&self) -> u8 {
        self.index_type
    }

    #[must_use]
    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.btree.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.btree.is_empty()
    }

    /// Writes `field_key -> location` under `fingerprint`. Returns `true`
    /// if an existing fingerprint entry was replaced.
    pub fn put(
        &mut self,
        fingerprint: &str,
        field_key: &Key,
        location: &FieldLocation,
        details: Details,
    ) -> bool {
        let uri_id = self.uri_store.intern(location.uri());
        let field_ref = FieldRef::new(uri_id, location_offset(location), location.length(), details);

        self.axes.observe(field_key);
        self.btree.insert(fingerprint.to_string(), field_ref).is_some()
    }

    #[must_use]
    pub fn get(&self, fingerprint: &str, remap_key: RemapKey) -> Option<Field> {
        let field_ref = self.btree.get(fingerprint)?;
        let location = self.uri_store.resolve(field_ref, remap_key)?;
        Some(Field {
            location,
            timestamp: (0, 0),
            details: field_ref.details.clone(),
        })
    }

    #[must_use]
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.btree.contains_key(fingerprint)
    }

    /// Streams every `(fingerprint, FieldRef)` pair, in fingerprint order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &FieldRef)> {
        self.btree.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn uri_store(&self) -> &UriStore {
        &self.uri_store
    }

    /// Resets bookkeeping for a fresh write generation. The B-tree/Axes
    /// accumulated so far are kept (appending continues the same logical
    /// index); a subsequent flush serializes the whole thing into a new
    /// `INDEX` record, and the caller is responsible for masking the
    /// record this Index previously occupied.
    pub fn reopen(self) -> Self {
        self
    }
}

fn location_offset(location: &FieldLocation) -> u64 {
    match location {
        FieldLocation::LocalFile { offset, .. }
        | FieldLocation::ObjectStore { offset, .. }
        | FieldLocation::Fam { offset, .. } => *offset,
        FieldLocation::Remote { .. } => 0,
    }
}

impl Serializable for Index {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), SerializeError> {
        writer.write_u8_varint(self.index_type)?;

        writer.write_u32_varint(self.uri_store.len() as u32)?;
        for (_, uri) in self.uri_store.iter() {
            write_str(writer, uri)?;
        }

        self.axes.serialize(writer)?;

        writer.write_u32_varint(self.btree.len() as u32)?;
        for (fingerprint, field_ref) in &self.btree {
            write_str(writer, fingerprint)?;
            writer.write_u32_varint(field_ref.uri_id)?;
            writer.write_u64_varint(field_ref.offset)?;
            writer.write_u64_varint(field_ref.length)?;
            match &field_ref.details {
                Some(details) => {
                    writer.write_u8_varint(1)?;
                    write_str(writer, details)?;
                }
                None => {
                    writer.write_u8_varint(0)?;
                }
            }
        }

        Ok(())
    }
}

impl Deserializable for Index {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError>
    where
        Self: Sized,
    {
        let index_type = reader.read_u8_varint()?;

        let uri_count = reader.read_u32_varint()?;
        let mut uri_store = UriStore::new();
        for _ in 0..uri_count {
            uri_store.intern(read_str(reader)?);
        }

        let axes = Axes::deserialize(reader)?;

        let entry_count = reader.read_u32_varint()?;
        let mut btree = BTreeMap::new();
        for _ in 0..entry_count {
            let fingerprint = read_str(reader)?;
            let uri_id = reader.read_u32_varint()?;
            let offset = reader.read_u64_varint()?;
            let length = reader.read_u64_varint()?;
            let details = if reader.read_u8_varint()? != 0 {
                Some(read_str(reader)?)
            } else {
                None
            };
            btree.insert(fingerprint, FieldRef::new(uri_id, offset, length, details));
        }

        Ok(Self {
            index_type,
            uri_store,
            btree,
            axes,
        })
    }
}

fn write_str<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    w.write_u32_varint(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_str<R: Read>(r: &mut R) -> std::io::Result<String> {
    let len = r.read_u32_varint()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_location() -> FieldLocation {
        FieldLocation::LocalFile {
            path: "/data/od/oper/130.dat".into(),
            offset: 1024,
            length: 512,
            remap_key: None,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut index = Index::new(1);
        let mut field_key = Key::new();
        field_key.set("param", "130");

        let replaced = index.put("param=130", &field_key, &sample_location(), None);
        assert!(!replaced);

        let field = index.get("param=130", None).unwrap();
        assert_eq!(512, field.location.length());
    }

    #[test]
    fn put_replaces_existing_fingerprint() {
        let mut index = Index::new(1);
        let mut field_key = Key::new();
        field_key.set("param", "130");

        index.put("param=130", &field_key, &sample_location(), None);
        let replaced = index.put("param=130", &field_key, &sample_location(), None);
        assert!(replaced);
        assert_eq!(1, index.len());
    }

    #[test]
    fn serialize_round_trips() {
        let mut index = Index::new(7);
        let mut field_key = Key::new();
        field_key.set("param", "130");
        index.put("param=130", &field_key, &sample_location(), Some("chk=1".into()));

        let mut buf = Vec::new();
        index.serialize(&mut buf).unwrap();

        let decoded = Index::deserialize(&mut buf.as_slice()).unwrap();
        assert_eq!(index, decoded);
    }
}
