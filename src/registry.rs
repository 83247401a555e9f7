// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Engine registry and the `Catalogue`/`Store` factories that dispatch on a
//! db-key (via the configured [`RootManager`]) or on a URI's scheme.

use crate::catalogue::local::LocalCatalogue;
use crate::catalogue::AnyCatalogue;
use crate::config::Config;
use crate::key::Key;
use crate::store::fam::FamStore;
use crate::store::local::LocalStore;
use crate::store::remote::RemoteStore;
use crate::store::AnyStore;
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::path::Path;

/// How a [`CatalogueFactory`] should open a DB: fresh (needing the schema
/// bytes to snapshot) or reopening an existing one.
pub enum CatalogueOpenMode {
    Create { schema_bytes: Vec<u8> },
    Open,
}

type CatalogueCtor = Box<dyn Fn(&Path, &Key, &CatalogueOpenMode) -> Result<AnyCatalogue>>;
type StoreCtor = Box<dyn Fn(&str) -> Result<AnyStore>>;

/// Maps an engine name ("toc", "local", "object-bucket", "fam", "remote")
/// to the closure that constructs it. Backends are registered explicitly
/// via [`EngineRegistry::with_defaults`] plus [`EngineRegistry::register_store_engine`]
/// rather than at static-init time: the teacher's stack has no
/// `inventory`/`linkme`-style distributed-slice crate, and the trait object
/// closures below need live construction parameters (config, credentials)
/// a static initializer couldn't supply anyway.
pub struct EngineRegistry {
    catalogue_engines: FxHashMap<String, CatalogueCtor>,
    store_engines: FxHashMap<String, StoreCtor>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl EngineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalogue_engines: FxHashMap::default(),
            store_engines: FxHashMap::default(),
        }
    }

    /// Registers the engines this crate can construct without external
    /// input: "toc" for the only `Catalogue` backend, and "local"/"fam"/
    /// "remote" for `Store` (the latter two are capability-gated stubs but
    /// still construct and dispatch uniformly). "object-bucket" is left
    /// unregistered here since `ObjectStoreBackend` needs a caller-supplied
    /// `Arc<dyn object_store::ObjectStore>` (credentials, endpoint) that
    /// has no sane default — register it explicitly with
    /// [`Self::register_store_engine`].
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_catalogue_engine(
            "toc",
            Box::new(|root, db_key, mode| match mode {
                CatalogueOpenMode::Create { schema_bytes } => {
                    LocalCatalogue::create(root, db_key.clone(), schema_bytes).map(Into::into)
                }
                CatalogueOpenMode::Open => {
                    LocalCatalogue::open(root, db_key.clone()).map(Into::into)
                }
            }),
        );

        registry.register_store_engine(
            "local",
            Box::new(|uri| {
                let path = uri
                    .strip_prefix("file://")
                    .ok_or_else(|| Error::SchemaMismatch(format!("not a file:// uri: {uri}")))?;
                let root = Path::new(path)
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                Ok(AnyStore::Local(LocalStore::new(root, 8)))
            }),
        );

        registry.register_store_engine(
            "fam",
            Box::new(|uri| {
                let rest = uri
                    .strip_prefix("fam://")
                    .ok_or_else(|| Error::SchemaMismatch(format!("not a fam:// uri: {uri}")))?;
                let region = rest.split_once('/').map_or(rest, |(region, _)| region);
                Ok(AnyStore::Fam(FamStore::new(region)))
            }),
        );

        registry.register_store_engine(
            "remote",
            Box::new(|uri| {
                let rest = uri
                    .strip_prefix("remote://")
                    .ok_or_else(|| Error::SchemaMismatch(format!("not a remote:// uri: {uri}")))?;
                let endpoint = rest.split_once('/').map_or(rest, |(endpoint, _)| endpoint);
                Ok(AnyStore::Remote(RemoteStore::new(endpoint)))
            }),
        );

        registry
    }

    pub fn register_catalogue_engine(&mut self, name: impl Into<String>, ctor: CatalogueCtor) {
        self.catalogue_engines.insert(name.into(), ctor);
    }

    pub fn register_store_engine(&mut self, name: impl Into<String>, ctor: StoreCtor) {
        self.store_engines.insert(name.into(), ctor);
    }

    #[must_use]
    fn catalogue_engine(&self, name: &str) -> Option<&CatalogueCtor> {
        self.catalogue_engines.get(name)
    }

    #[must_use]
    fn store_engine(&self, name: &str) -> Option<&StoreCtor> {
        self.store_engines.get(name)
    }
}

fn store_engine_name_for_uri(uri: &str) -> Result<&'static str> {
    if uri.starts_with("file://") {
        Ok("local")
    } else if uri.starts_with("object://") {
        Ok("object-bucket")
    } else if uri.starts_with("fam://") {
        Ok("fam")
    } else if uri.starts_with("remote://") {
        Ok("remote")
    } else {
        Err(Error::SchemaMismatch(format!("no engine recognises uri scheme: {uri}")))
    }
}

/// Builds a [`Catalogue`](crate::catalogue::Catalogue) for a db-key,
/// resolving its root through the configured [`RootManager`](crate::config::RootManager).
pub struct CatalogueFactory<'a> {
    registry: &'a EngineRegistry,
    config: &'a Config,
}

impl<'a> CatalogueFactory<'a> {
    #[must_use]
    pub fn new(registry: &'a EngineRegistry, config: &'a Config) -> Self {
        Self { registry, config }
    }

    pub fn build(&self, db_key: &Key, mode: CatalogueOpenMode) -> Result<AnyCatalogue> {
        let canonical = db_key.to_string();
        let root = self
            .config
            .root_manager
            .primary_write_root(&canonical)
            .ok_or_else(|| Error::NotFound(format!("no writable root configured for db-key {canonical}")))?;

        let ctor = self
            .registry
            .catalogue_engine("toc")
            .ok_or(Error::Unsupported("no \"toc\" catalogue engine registered"))?;

        log::debug!("catalogue factory: opening {canonical} under {}", root.display());
        ctor(root, db_key, &mode)
    }
}

/// Builds a [`Store`](crate::store::Store) capable of resolving a specific
/// URI, dispatching purely on its scheme (§4.8: "selects an engine via
/// `uri.scheme`").
pub struct StoreFactory<'a> {
    registry: &'a EngineRegistry,
}

impl<'a> StoreFactory<'a> {
    #[must_use]
    pub fn new(registry: &'a EngineRegistry) -> Self {
        Self { registry }
    }

    pub fn build_for_uri(&self, uri: &str) -> Result<AnyStore> {
        let engine_name = store_engine_name_for_uri(uri)?;
        let ctor = self
            .registry
            .store_engine(engine_name)
            .ok_or(Error::Unsupported("engine not registered for this uri scheme"))?;
        ctor(uri)
    }
}
