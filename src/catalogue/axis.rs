// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`Axes`]: per-Index, per-key-name aggregation of the distinct values
//! archived so far, used to answer "what values of `param` exist in this
//! index" without a full B-tree scan.

use crate::key::Key;
use crate::serde::{DeserializeError, Deserializable, SerializeError, Serializable};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Axes {
    by_name: FxHashMap<String, BTreeSet<String>>,
}

impl Axes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every `(name, value)` pair of `key` to its matching axis.
    pub fn observe(&mut self, key: &Key) {
        for (name, value) in key.pairs() {
            self.by_name
                .entry(name.clone())
                .or_default()
                .insert(value.clone());
        }
    }

    #[must_use]
    pub fn values(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.by_name.get(name)
    }

    #[must_use]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

impl Serializable for Axes {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), SerializeError> {
        let mut names: Vec<&String> = self.by_name.keys().collect();
        names.sort();

        writer.write_u32_varint(names.len() as u32)?;
        for name in names {
            write_str(writer, name)?;
            let values = &self.by_name[name];
            writer.write_u32_varint(values.len() as u32)?;
            for value in values {
                write_str(writer, value)?;
            }
        }
        Ok(())
    }
}

impl Deserializable for Axes {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError>
    where
        Self: Sized,
    {
        let name_count = reader.read_u32_varint()?;
        let mut by_name = FxHashMap::default();

        for _ in 0..name_count {
            let name = read_str(reader)?;
            let value_count = reader.read_u32_varint()?;
            let mut values = BTreeSet::new();
            for _ in 0..value_count {
                values.insert(read_str(reader)?);
            }
            by_name.insert(name, values);
        }

        Ok(Self { by_name })
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

    #[test]
    fn observe_accumulates_distinct_values() {
        let mut axes = Axes::new();
        let mut k1 = Key::new();
        k1.set("param", "130");
        let mut k2 = Key::new();
        k2.set("param", "130");
        let mut k3 = Key::new();
        k3.set("param", "131");

        axes.observe(&k1);
        axes.observe(&k2);
        axes.observe(&k3);

        let values = axes.values("param").unwrap();
        assert_eq!(2, values.len());
        assert!(values.contains("130"));
        assert!(values.contains("131"));
    }

    #[test]
    fn round_trips_through_serialize() {
        let mut axes = Axes::new();
        let mut key = Key::new();
        key.set("levelist", "500");
        key.set("param", "130");
        axes.observe(&key);

        let mut buf = Vec::new();
        axes.serialize(&mut buf).unwrap();

        let decoded = Axes::deserialize(&mut buf.as_slice()).unwrap();
        assert_eq!(axes, decoded);
    }
}
