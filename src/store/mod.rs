// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The [`Store`] trait and its backends: opaque payload storage, returning
//! a [`FieldLocation`] the catalogue records and a later retrieval
//! resolves back into bytes.

pub mod fam;
pub mod local;
pub mod object;
pub mod remote;

use crate::key::Key;
use crate::location::FieldLocation;
use crate::slice::Slice;
use crate::Result;
use enum_dispatch::enum_dispatch;

#[enum_dispatch]
pub trait Store {
    /// Appends `bytes` under `index_key`'s data area, returning a location
    /// the catalogue can persist and a later retrieval can resolve.
    fn archive(&mut self, index_key: &Key, bytes: &[u8]) -> Result<FieldLocation>;

    /// Reads back the bytes a location describes.
    fn retrieve(&self, location: &FieldLocation) -> Result<Slice>;

    /// Forces durability of all prior archives on this instance, returning
    /// the number of bytes flushed.
    fn flush(&mut self) -> Result<u64>;

    /// Deletes the object a URI denotes. Logs only, without deleting, when
    /// `doit` is false.
    fn remove(&mut self, uri: &str, doit: bool) -> Result<()>;

    /// Whether `uri` denotes an object this store instance owns.
    fn uri_belongs(&self, uri: &str) -> bool;

    /// Every data object currently known to exist for this DB's area.
    fn collocated_data_uris(&self) -> Result<Vec<String>>;
}

#[enum_dispatch(Store)]
pub enum AnyStore {
    Local(local::LocalStore),
    ObjectStore(object::ObjectStoreBackend),
    Fam(fam::FamStore),
    Remote(remote::RemoteStore),
}
