// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! On-disk layout of a single TOC record: a fixed 96-byte header followed
//! by a tag-specific payload, the whole thing padded to the record round
//! size so that a reader can seek record-by-record without re-parsing.

use crate::serde::{DeserializeError, Serializable};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

/// Every record on disk is padded to this many bytes. A writer must
/// complete a record in a single `write` call that stays within this
/// bound, so that POSIX `O_APPEND` gives atomicity for free.
pub const RECORD_SIZE_DEFAULT: usize = 1024;

pub const HEADER_SIZE: usize = 96;

const HOSTNAME_LEN: usize = 64;

/// Discriminates a TOC record's payload shape.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tag {
    Init = 1,
    Index = 2,
    Clear = 3,
    SubToc = 4,
}

impl Tag {
    fn from_u8(value: u8) -> crate::Result<Self> {
        match value {
            1 => Ok(Self::Init),
            2 => Ok(Self::Index),
            3 => Ok(Self::Clear),
            4 => Ok(Self::SubToc),
            other => Err(DeserializeError::InvalidTag(("toc::Tag", other)).into()),
        }
    }
}

/// Fixed-width record header, written before every payload.
#[derive(Clone, Debug)]
pub struct RecordHeader {
    pub tag: Tag,
    pub version: u8,
    pub fdb_version: u16,
    pub tv_sec: u64,
    pub tv_usec: u32,
    pub gid: u32,
    pub uid: u32,
    pub hostname: [u8; HOSTNAME_LEN],
    /// Length of the payload that follows, in bytes (excludes padding).
    pub size: u64,
}

impl RecordHeader {
    #[must_use]
    pub fn new(tag: Tag, size: u64) -> Self {
        let now = crate::time::unix_timestamp();
        let hostname = hostname_bytes();

        Self {
            tag,
            version: 1,
            fdb_version: 1,
            tv_sec: now.as_secs(),
            tv_usec: now.subsec_micros(),
            gid: 0,
            uid: 0,
            hostname,
            size,
        }
    }

    fn encode(&self, buf: &mut [u8; HEADER_SIZE]) {
        buf[0] = self.tag as u8;
        buf[1] = self.version;
        LittleEndian::write_u16(&mut buf[2..4], self.fdb_version);
        LittleEndian::write_u64(&mut buf[4..12], self.tv_sec);
        LittleEndian::write_u32(&mut buf[12..16], self.tv_usec);
        LittleEndian::write_u32(&mut buf[16..20], self.gid);
        LittleEndian::write_u32(&mut buf[20..24], self.uid);
        buf[24..24 + HOSTNAME_LEN].copy_from_slice(&self.hostname);
        LittleEndian::write_u64(&mut buf[24 + HOSTNAME_LEN..32 + HOSTNAME_LEN], self.size);
    }

    fn decode(buf: &[u8; HEADER_SIZE]) -> crate::Result<Self> {
        let tag = Tag::from_u8(buf[0])?;
        let version = buf[1];
        let fdb_version = LittleEndian::read_u16(&buf[2..4]);
        let tv_sec = LittleEndian::read_u64(&buf[4..12]);
        let tv_usec = LittleEndian::read_u32(&buf[12..16]);
        let gid = LittleEndian::read_u32(&buf[16..20]);
        let uid = LittleEndian::read_u32(&buf[20..24]);

        let mut hostname = [0u8; HOSTNAME_LEN];
        hostname.copy_from_slice(&buf[24..24 + HOSTNAME_LEN]);

        let size = LittleEndian::read_u64(&buf[24 + HOSTNAME_LEN..32 + HOSTNAME_LEN]);

        Ok(Self {
            tag,
            version,
            fdb_version,
            tv_sec,
            tv_usec,
            gid,
            uid,
            hostname,
            size,
        })
    }
}

fn hostname_bytes() -> [u8; HOSTNAME_LEN] {
    let mut buf = [0u8; HOSTNAME_LEN];
    let name = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into());
    let bytes = name.as_bytes();
    let n = bytes.len().min(HOSTNAME_LEN);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

/// A fully decoded record: header plus the tag-specific payload bytes
/// (already stripped of trailing padding).
#[derive(Clone, Debug)]
pub struct Record {
    pub header: RecordHeader,
    pub payload: Vec<u8>,
}

impl Record {
    #[must_use]
    pub fn new(tag: Tag, payload: Vec<u8>) -> Self {
        let header = RecordHeader::new(tag, payload.len() as u64);
        Self { header, payload }
    }

    /// Encodes this record into exactly `RECORD_SIZE_DEFAULT` bytes,
    /// suitable for a single atomic `write`/`append` call.
    pub fn encode_padded(&self) -> crate::Result<Vec<u8>> {
        let total = HEADER_SIZE + self.payload.len();
        if total > RECORD_SIZE_DEFAULT {
            return Err(crate::Error::Serialize(
                crate::serde::SerializeError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "record payload exceeds record round size",
                )),
            ));
        }

        let mut out = vec![0u8; RECORD_SIZE_DEFAULT];
        let mut header_buf = [0u8; HEADER_SIZE];
        self.header.encode(&mut header_buf);
        out[..HEADER_SIZE].copy_from_slice(&header_buf);
        out[HEADER_SIZE..HEADER_SIZE + self.payload.len()].copy_from_slice(&self.payload);

        Ok(out)
    }

    /// Decodes one `RECORD_SIZE_DEFAULT`-byte slot.
    pub fn decode(buf: &[u8]) -> crate::Result<Self> {
        if buf.len() < RECORD_SIZE_DEFAULT {
            return Err(
                DeserializeError::InvalidHeader("short TOC record slot").into(),
            );
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        header_buf.copy_from_slice(&buf[..HEADER_SIZE]);
        let header = RecordHeader::decode(&header_buf)?;

        let size = header.size as usize;
        if HEADER_SIZE + size > RECORD_SIZE_DEFAULT {
            return Err(DeserializeError::InvalidHeader("record size overruns slot").into());
        }

        let payload = buf[HEADER_SIZE..HEADER_SIZE + size].to_vec();
        Ok(Self { header, payload })
    }
}

fn write_string<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    w.write_u32_varint(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_string<R: Read>(r: &mut R) -> std::io::Result<String> {
    let len = r.read_u32_varint()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Payload of an `INIT` record: the DB-key's canonical string, whether this
/// TOC is a sub-TOC, and an optional parent DB-key for mount/overlay DBs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitPayload {
    pub db_key: String,
    pub is_sub_toc: bool,
    pub parent_key: Option<String>,
}

impl Serializable for InitPayload {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), crate::serde::SerializeError> {
        write_string(writer, &self.db_key)?;
        writer.write_u8_varint(u8::from(self.is_sub_toc))?;
        match &self.parent_key {
            Some(parent) => {
                writer.write_u8_varint(1)?;
                write_string(writer, parent)?;
            }
            None => {
                writer.write_u8_varint(0)?;
            }
        }
        Ok(())
    }
}

impl crate::serde::Deserializable for InitPayload {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError>
    where
        Self: Sized,
    {
        let db_key = read_string(reader)?;
        let is_sub_toc = reader.read_u8_varint()? != 0;
        let parent_key = if reader.read_u8_varint()? != 0 {
            Some(read_string(reader)?)
        } else {
            None
        };
        Ok(Self {
            db_key,
            is_sub_toc,
            parent_key,
        })
    }
}

/// Payload of an `INDEX` record: where the Index lives, plus its inline
/// serialized contents (type tag, UriStore, Axes, B-tree metadata).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexPayload {
    pub path: String,
    pub offset: u64,
    pub index_type: u8,
    pub blob: Vec<u8>,
}

impl Serializable for IndexPayload {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), crate::serde::SerializeError> {
        write_string(writer, &self.path)?;
        writer.write_u64_varint(self.offset)?;
        writer.write_u8_varint(self.index_type)?;
        writer.write_u32_varint(self.blob.len() as u32)?;
        writer.write_all(&self.blob)?;
        Ok(())
    }
}

impl crate::serde::Deserializable for IndexPayload {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError>
    where
        Self: Sized,
    {
        let path = read_string(reader)?;
        let offset = reader.read_u64_varint()?;
        let index_type = reader.read_u8_varint()?;
        let blob_len = reader.read_u32_varint()? as usize;
        let mut blob = vec![0u8; blob_len];
        reader.read_exact(&mut blob)?;
        Ok(Self {
            path,
            offset,
            index_type,
            blob,
        })
    }
}

/// Payload of a `CLEAR` record: the `(path, offset)` of a prior `INDEX` or
/// `SUB_TOC` record to mask. `path == "*"` with `offset == 0` masks
/// everything written before this record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClearPayload {
    pub path: String,
    pub offset: u64,
}

impl ClearPayload {
    pub const MASK_ALL_PATH: &'static str = "*";

    #[must_use]
    pub fn mask_all() -> Self {
        Self {
            path: Self::MASK_ALL_PATH.to_string(),
            offset: 0,
        }
    }

    #[must_use]
    pub fn is_mask_all(&self) -> bool {
        self.path == Self::MASK_ALL_PATH && self.offset == 0
    }
}

impl Serializable for ClearPayload {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), crate::serde::SerializeError> {
        write_string(writer, &self.path)?;
        writer.write_u64_varint(self.offset)?;
        Ok(())
    }
}

impl crate::serde::Deserializable for ClearPayload {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError>
    where
        Self: Sized,
    {
        let path = read_string(reader)?;
        let offset = reader.read_u64_varint()?;
        Ok(Self { path, offset })
    }
}

/// Payload of a `SUB_TOC` record: path to a sibling TOC file whose records
/// are spliced in at this point during a read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubTocPayload {
    pub path: String,
}

impl Serializable for SubTocPayload {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), crate::serde::SerializeError> {
        write_string(writer, &self.path)
    }
}

impl crate::serde::Deserializable for SubTocPayload {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError>
    where
        Self: Sized,
    {
        Ok(Self {
            path: read_string(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serde::Deserializable;

    #[test]
    fn init_payload_round_trips() {
        let payload = InitPayload {
            db_key: "class=od,expver=0001,stream=oper".into(),
            is_sub_toc: false,
            parent_key: Some("class=od,expver=0000,stream=oper".into()),
        };

        let mut buf = Vec::new();
        payload.serialize(&mut buf).unwrap();

        let decoded = InitPayload::deserialize(&mut buf.as_slice()).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn record_round_trips_through_padded_slot() {
        let payload = IndexPayload {
            path: "toc".into(),
            offset: 4096,
            index_type: 1,
            blob: vec![1, 2, 3, 4, 5],
        };

        let mut payload_bytes = Vec::new();
        payload.serialize(&mut payload_bytes).unwrap();

        let record = Record::new(Tag::Index, payload_bytes);
        let encoded = record.encode_padded().unwrap();
        assert_eq!(RECORD_SIZE_DEFAULT, encoded.len());

        let decoded = Record::decode(&encoded).unwrap();
        assert_eq!(Tag::Index, decoded.header.tag);

        let decoded_payload = IndexPayload::deserialize(&mut decoded.payload.as_slice()).unwrap();
        assert_eq!(payload, decoded_payload);
    }

    #[test]
    fn mask_all_sentinel() {
        let clear = ClearPayload::mask_all();
        assert!(clear.is_mask_all());

        let specific = ClearPayload {
            path: "toc.abc123".into(),
            offset: 0,
        };
        assert!(!specific.is_mask_all());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let record = Record::new(Tag::Index, vec![0u8; RECORD_SIZE_DEFAULT]);
        assert!(record.encode_padded().is_err());
    }
}
