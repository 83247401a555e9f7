// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::serde::{DeserializeError, SerializeError};

/// Represents errors that can occur anywhere in the archive.
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Serialize(SerializeError),

    /// Deserialization failed
    Deserialize(DeserializeError),

    /// No schema rule covers the supplied key, or a DB was asked to adopt a
    /// schema different from the one it was created with
    SchemaMismatch(String),

    /// DB, index, or field absent
    NotFound(String),

    /// User mismatch against DB owner under `fdbOnlyCreatorCanWrite`
    AccessDenied(String),

    /// DB is locked for the requested action
    Conflict(String),

    /// Full wipe requested but unrecognised files are present
    UncleanDatabase(Vec<String>),

    /// TOC record version not in the supported set
    TocVersionMismatch(u8),

    /// Background iteration was cancelled
    Cancelled,

    /// Capability-gated operation not implemented by this backend
    Unsupported(&'static str),

    /// Object-store backend error
    ObjectStore(object_store::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Serialize(e) => write!(f, "serialize error: {e}"),
            Self::Deserialize(e) => write!(f, "deserialize error: {e}"),
            Self::SchemaMismatch(msg) => write!(f, "schema mismatch: {msg}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::AccessDenied(msg) => write!(f, "access denied: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::UncleanDatabase(files) => {
                write!(f, "unclean database, unrecognised files: {files:?}")
            }
            Self::TocVersionMismatch(v) => write!(f, "unsupported TOC record version {v}"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Unsupported(what) => write!(f, "unsupported: {what}"),
            Self::ObjectStore(e) => write!(f, "object store error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SerializeError> for Error {
    fn from(value: SerializeError) -> Self {
        Self::Serialize(value)
    }
}

impl From<DeserializeError> for Error {
    fn from(value: DeserializeError) -> Self {
        Self::Deserialize(value)
    }
}

impl From<object_store::Error> for Error {
    fn from(value: object_store::Error) -> Self {
        Self::ObjectStore(value)
    }
}

/// Archive-wide result type
pub type Result<T> = std::result::Result<T, Error>;
