// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`FieldLocation`]: the polymorphic, cheap-to-`Clone` descriptor a
//! [`crate::store::Store`] returns from `archive` and a retrieval resolves
//! back into bytes.

use std::path::PathBuf;

/// A key supplied by a mount/overlay DB, annotated onto every location it
/// returns so downstream consumers see remapped coordinates transparently.
pub type RemapKey = Option<String>;

/// Where a field's bytes live, and how to read them back.
///
/// Plain value type, not a reference-counted pointer: cloning a
/// `FieldLocation` is as cheap as cloning a couple of strings and integers,
/// so the same descriptor can be handed to multiple in-flight retrievals
/// without synchronization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldLocation {
    LocalFile {
        path: PathBuf,
        offset: u64,
        length: u64,
        remap_key: RemapKey,
    },
    ObjectStore {
        bucket: String,
        object: String,
        offset: u64,
        length: u64,
        remap_key: RemapKey,
    },
    Fam {
        region: String,
        object: String,
        offset: u64,
        length: u64,
        remap_key: RemapKey,
    },
    Remote {
        endpoint: String,
        opaque_id: String,
        length: u64,
        remap_key: RemapKey,
    },
}

impl FieldLocation {
    #[must_use]
    pub fn length(&self) -> u64 {
        match self {
            Self::LocalFile { length, .. }
            | Self::ObjectStore { length, .. }
            | Self::Fam { length, .. } => *length,
            Self::Remote { length, .. } => *length,
        }
    }

    #[must_use]
    pub fn remap_key(&self) -> Option<&str> {
        match self {
            Self::LocalFile { remap_key, .. }
            | Self::ObjectStore { remap_key, .. }
            | Self::Fam { remap_key, .. }
            | Self::Remote { remap_key, .. } => remap_key.as_deref(),
        }
    }

    /// Returns a clone of this location annotated with `remap_key`, as done
    /// when a field is read back through a mount/overlay DB.
    #[must_use]
    pub fn with_remap_key(&self, remap_key: impl Into<String>) -> Self {
        let remap_key = Some(remap_key.into());
        match self.clone() {
            Self::LocalFile {
                path,
                offset,
                length,
                ..
            } => Self::LocalFile {
                path,
                offset,
                length,
                remap_key,
            },
            Self::ObjectStore {
                bucket,
                object,
                offset,
                length,
                ..
            } => Self::ObjectStore {
                bucket,
                object,
                offset,
                length,
                remap_key,
            },
            Self::Fam {
                region,
                object,
                offset,
                length,
                ..
            } => Self::Fam {
                region,
                object,
                offset,
                length,
                remap_key,
            },
            Self::Remote {
                endpoint,
                opaque_id,
                length,
                ..
            } => Self::Remote {
                endpoint,
                opaque_id,
                length,
                remap_key,
            },
        }
    }

    /// A string uniquely naming the underlying data object, independent of
    /// offset/length — used for purge's reachable-count bookkeeping and a
    /// store's `uri_belongs` check.
    #[must_use]
    pub fn uri(&self) -> String {
        match self {
            Self::LocalFile { path, .. } => format!("file://{}", path.display()),
            Self::ObjectStore { bucket, object, .. } => format!("object://{bucket}/{object}"),
            Self::Fam { region, object, .. } => format!("fam://{region}/{object}"),
            Self::Remote {
                endpoint,
                opaque_id,
                ..
            } => format!("remote://{endpoint}/{opaque_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_remap_key_preserves_coordinates() {
        let loc = FieldLocation::LocalFile {
            path: PathBuf::from("/data/od/oper/130.dat"),
            offset: 128,
            length: 64,
            remap_key: None,
        };

        let remapped = loc.with_remap_key("expver=xxxx");
        assert_eq!(Some("expver=xxxx"), remapped.remap_key());
        assert_eq!(loc.uri(), remapped.uri());
    }

    #[test]
    fn uri_distinguishes_backends() {
        let local = FieldLocation::LocalFile {
            path: PathBuf::from("/a"),
            offset: 0,
            length: 1,
            remap_key: None,
        };
        let remote = FieldLocation::Remote {
            endpoint: "host:7654".into(),
            opaque_id: "abc".into(),
            length: 1,
            remap_key: None,
        };
        assert_ne!(local.uri(), remote.uri());
    }
}
