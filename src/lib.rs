// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A write-once, content-addressed field store keyed by meteorological
//! metadata.
//!
//! ##### About
//!
//! A DB is a three-level `(db_key, index_key, field_key)` namespace,
//! described by a [`Schema`] of [`schema::Rule`]s. Every field a producer
//! archives is split into a db-key (which physical [`catalogue::Catalogue`]
//! owns it), an index-key (which on-disk [`catalogue::index::Index`] it
//! belongs to) and a field-key (its fingerprint inside that index). Payload
//! bytes are written once, by exactly one [`store::Store`] backend, and
//! never modified in place; deletion is the only mutation, carried out
//! through the explicit [`wipe`] and [`purge`] lifecycles rather than
//! ad-hoc file removal.
//!
//! # Example usage
//!
//! ```
//! use fieldbase::config::{Config, RootManager, RootRule};
//! use fieldbase::schema::{Rule, Schema};
//! use fieldbase::{Fdb, Key};
//! use regex::Regex;
//!
//! # let folder = tempfile::tempdir()?;
//! let schema = Schema::new(vec![Rule::new(["class"], ["date"], ["param"])]);
//! let root_manager = RootManager::new(vec![RootRule {
//!     pattern: Regex::new(".*").unwrap(),
//!     path: folder.path().to_path_buf(),
//!     writable: true,
//!     visitable: true,
//!     min_free_bytes: None,
//! }]);
//! let fdb = Fdb::new(schema, Config::new(root_manager));
//!
//! let mut db_key = Key::new();
//! db_key.set("class", "od");
//!
//! let mut archiver = fdb.create(&db_key, b"schema-bytes".to_vec())?;
//!
//! let mut full_key = Key::new();
//! full_key.set("class", "od");
//! full_key.set("date", "20260101");
//! full_key.set("param", "130");
//!
//! archiver.archive(&full_key, b"grib-bytes", None, None)?;
//! archiver.flush()?;
//!
//! let field = fdb.retrieve_one(archiver.catalogue(), archiver.store(), &full_key)?;
//! assert_eq!(b"grib-bytes".as_slice(), field.bytes.as_slice());
//! #
//! # Ok::<(), fieldbase::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]

pub mod archive;
pub mod catalogue;
pub mod config;

#[doc(hidden)]
pub mod descriptor_table;

mod error;

#[doc(hidden)]
pub mod file;

pub mod field;
pub mod key;
pub mod list;
pub mod location;
mod path;
pub mod purge;
pub mod registry;
pub mod retrieve;
pub mod schema;

#[doc(hidden)]
pub mod serde;

mod slice;

#[doc(hidden)]
pub mod stop_signal;

pub mod store;
mod time;
pub mod toc;
pub mod wipe;

pub use archive::Archiver;
pub use catalogue::{AnyCatalogue, Catalogue};
pub use config::Config;
pub use error::{Error, Result};
pub use key::Key;
pub use list::CancellationToken;
pub use registry::{CatalogueFactory, CatalogueOpenMode, EngineRegistry, StoreFactory};
pub use retrieve::RetrievedField;
pub use schema::{Request, Schema};
pub use slice::Slice;
pub use store::{AnyStore, Store};

use std::path::Path;

/// The top-level handle a caller constructs once per process: a [`Schema`]
/// describing the key hierarchy, a [`Config`] describing where DBs live and
/// how they may be written to, and an [`EngineRegistry`] resolving db-keys
/// and URIs to concrete [`Catalogue`]/[`Store`] backends.
///
/// `Fdb` does not itself hold any open DB state — every method opens
/// (or creates) the catalogue and store it needs for the call and hands
/// back an owned [`Archiver`] or iterator, the same "bind per session"
/// ownership contract [`Archiver`] documents.
pub struct Fdb {
    schema: Schema,
    config: Config,
    registry: EngineRegistry,
}

impl Fdb {
    /// Builds an `Fdb` with the default engine registry (`"toc"` catalogue
    /// engine, `"local"`/`"fam"`/`"remote"` store engines — see
    /// [`EngineRegistry::with_defaults`]).
    #[must_use]
    pub fn new(schema: Schema, config: Config) -> Self {
        Self::with_registry(schema, config, EngineRegistry::with_defaults())
    }

    /// Builds an `Fdb` with a caller-supplied registry, e.g. one that has
    /// also registered the `"object-bucket"` store engine with a live
    /// `object_store::ObjectStore` client.
    #[must_use]
    pub fn with_registry(schema: Schema, config: Config, registry: EngineRegistry) -> Self {
        Self {
            schema,
            config,
            registry,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn write_root(&self, db_key: &Key) -> Result<std::path::PathBuf> {
        self.config
            .root_manager
            .primary_write_root(&db_key.to_string())
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::NotFound(format!("no writable root configured for db-key {db_key}")))
    }

    /// A DB's own directory doubles as the root both its catalogue and its
    /// local store are opened under: the catalogue owns `toc`/`schema`/
    /// sub-TOC files, the store owns one `<index_key>.<generation>.dat`
    /// file per index generation, and `collocated_data_uris` only ever
    /// enumerates the latter by extension, so the two never collide.
    fn local_store_at(&self, root: &Path) -> Result<AnyStore> {
        let placeholder = format!("file://{}", root.join("_").display());
        StoreFactory::new(&self.registry).build_for_uri(&placeholder)
    }

    /// Creates a fresh DB under `db_key`'s configured write-root, returning
    /// an [`Archiver`] bound to its catalogue and store.
    pub fn create(&self, db_key: &Key, schema_bytes: Vec<u8>) -> Result<Archiver<AnyCatalogue, AnyStore>> {
        let root = self.write_root(db_key)?;
        let catalogue = CatalogueFactory::new(&self.registry, &self.config)
            .build(db_key, CatalogueOpenMode::Create { schema_bytes })?;
        let store = self.local_store_at(&root)?;
        Ok(Archiver::new(self.schema.clone(), catalogue, store))
    }

    /// Reopens an existing DB for archiving, or `Error::NotFound` if its
    /// write-root has never had a DB created under it.
    pub fn open_for_archive(&self, db_key: &Key) -> Result<Archiver<AnyCatalogue, AnyStore>> {
        let root = self.write_root(db_key)?;
        if !file::exists(&root.join(file::TOC_FILE_NAME)) {
            return Err(Error::NotFound(format!("no DB at {}", root.display())));
        }

        let catalogue =
            CatalogueFactory::new(&self.registry, &self.config).build(db_key, CatalogueOpenMode::Open)?;
        let store = self.local_store_at(&root)?;
        Ok(Archiver::new(self.schema.clone(), catalogue, store))
    }

    /// Opens an existing DB read-only, returning `Ok(None)` rather than an
    /// error when none exists — the contract [`list::list`]'s
    /// `open_catalogue` closure needs so a partial request spanning
    /// multiple candidate DBs can skip the ones that were never created.
    fn open_catalogue_readonly(&self, db_key: &Key) -> Result<Option<AnyCatalogue>> {
        let Some(root) = self.config.root_manager.visit_roots(&db_key.to_string()).into_iter().next() else {
            return Ok(None);
        };
        if !file::exists(&root.join(file::TOC_FILE_NAME)) {
            return Ok(None);
        }

        CatalogueFactory::new(&self.registry, &self.config)
            .build(db_key, CatalogueOpenMode::Open)
            .map(Some)
    }

    fn store_for_db(&self, db_key: &Key) -> Result<AnyStore> {
        let root = self
            .config
            .root_manager
            .visit_roots(&db_key.to_string())
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no readable root configured for db-key {db_key}")))?;
        self.local_store_at(root)
    }

    /// Lazily lists every field a partial request matches.
    pub fn list(&self, request: &Request, cancel: CancellationToken) -> Result<list::ListIter<AnyCatalogue, impl FnMut(&Key) -> Result<Option<AnyCatalogue>> + '_>> {
        list::list(&self.schema, request, move |db_key| self.open_catalogue_readonly(db_key), cancel)
    }

    /// Lazily retrieves every field a partial request matches.
    pub fn retrieve(
        &self,
        request: &Request,
        cancel: CancellationToken,
    ) -> Result<impl Iterator<Item = Result<RetrievedField>> + '_> {
        retrieve::retrieve(
            &self.schema,
            request,
            move |db_key| self.open_catalogue_readonly(db_key),
            move |db_key| self.store_for_db(db_key),
            cancel,
        )
    }

    /// Retrieves the single field a fully-specified key names.
    pub fn retrieve_one(&self, catalogue: &impl Catalogue, store: &impl Store, full_key: &Key) -> Result<RetrievedField> {
        retrieve::retrieve_one(&self.schema, catalogue, store, full_key)
    }

    /// Runs the two-sided wipe lifecycle for one DB: visits its catalogue,
    /// delegates unknown-file classification to its store, then reports or
    /// commits depending on `doit`/`unsafe_wipe_all`.
    pub fn wipe(
        &self,
        db_key: &Key,
        index_request: &Request,
        doit: bool,
        unsafe_wipe_all: bool,
    ) -> Result<wipe::WipeReport> {
        let root = self.write_root(db_key)?;
        let mut catalogue = CatalogueFactory::new(&self.registry, &self.config).build(db_key, CatalogueOpenMode::Open)?;
        let mut store = self.local_store_at(&root)?;

        let uri_belongs = |uri: &str| store.uri_belongs(uri);
        let collocated = || store.collocated_data_uris();
        let stores: [(&dyn Fn(&str) -> bool, &dyn Fn() -> Result<Vec<String>>); 1] =
            [(&uri_belongs, &collocated)];

        let plan = wipe::plan(&catalogue, index_request, &stores)?;
        wipe::report_or_commit(
            &plan,
            &mut catalogue,
            |uri, commit| store.remove(uri, commit),
            doit,
            unsafe_wipe_all,
        )
    }

    /// Appends a mask-all `CLEAR` record to a DB's TOC without deleting any
    /// data file — the CLI's `hide` verb, useful to make a DB invisible to
    /// `list`/`retrieve` while keeping its payloads around for inspection.
    pub fn hide(&self, db_key: &Key, doit: bool) -> Result<()> {
        let mut catalogue =
            CatalogueFactory::new(&self.registry, &self.config).build(db_key, CatalogueOpenMode::Open)?;
        if doit {
            catalogue.mask_all()?;
        } else {
            log::info!("hide (doit=false): would mask all of {db_key}");
        }
        Ok(())
    }

    /// Runs the purge lifecycle for one DB: finds fingerprints archived
    /// more than once across its live indexes and deletes the data that
    /// became unreachable, without touching the DB's TOC/schema.
    pub fn purge(&self, db_key: &Key, doit: bool) -> Result<purge::PurgeReport> {
        let root = self.write_root(db_key)?;
        let mut catalogue = CatalogueFactory::new(&self.registry, &self.config).build(db_key, CatalogueOpenMode::Open)?;
        let mut store = self.local_store_at(&root)?;

        let uri_belongs = |uri: &str| store.uri_belongs(uri);
        let collocated = || store.collocated_data_uris();
        let stores: [(&dyn Fn(&str) -> bool, &dyn Fn() -> Result<Vec<String>>); 1] =
            [(&uri_belongs, &collocated)];

        let plan = purge::plan(&catalogue, &stores)?;
        purge::report_or_commit(&plan, &mut catalogue, |uri, commit| store.remove(uri, commit), doit)
    }
}
