// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use byteview::ByteView;

/// A cheaply-clonable, immutable byte buffer.
///
/// Used for payload bytes flowing through `archive`/`retrieve` so that a
/// single read from a `Store` backend can be handed to multiple in-flight
/// consumers without copying (see the Ownership note in the data model:
/// `FieldLocation` and the bytes it resolves to are plain, cheap-to-clone
/// values, not reference-counted pointers into a larger arena).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Slice(ByteView);

impl Slice {
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self(ByteView::from(bytes))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Slice({} bytes)", self.len())
    }
}

impl std::ops::Deref for Slice {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for Slice {
    fn from(value: Vec<u8>) -> Self {
        Self(ByteView::from(value))
    }
}

impl From<&[u8]> for Slice {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl From<ByteView> for Slice {
    fn from(value: ByteView) -> Self {
        Self(value)
    }
}
