// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Configuration: an in-memory `RawConfig` (standing in for a parsed config
//! file — parsing the file format itself is out of scope), a builder-style
//! `Config`, and `RootManager`, which answers "which root may DB X be
//! written to / read from / moved to" by regex match on the db-key string.

use crate::path::absolute_path;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One entry of a [`RawConfig`]: the handful of shapes an external config
/// format would actually need to represent.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<ConfigValue>),
    Table(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_table(&self) -> Option<&HashMap<String, ConfigValue>> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }
}

/// Stand-in for the contents of an external config file: a flat key→value
/// map, with path expansion applied by the caller (environment variables
/// like `FDB_HOME`/`FDB_CONFIG` take precedence over this, per §6).
#[derive(Clone, Debug, Default)]
pub struct RawConfig {
    values: HashMap<String, ConfigValue>,
}

impl RawConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }
}

/// One regex-keyed storage root: answers whether a given db-key string may
/// be written to, read from ("visit"-ed for list/retrieve), or moved to,
/// this root.
#[derive(Clone, Debug)]
pub struct RootRule {
    pub pattern: Regex,
    pub path: PathBuf,
    pub writable: bool,
    pub visitable: bool,
    /// Minimum free bytes required for this root to be offered as a write
    /// target; `None` disables the free-space filter for this root.
    pub min_free_bytes: Option<u64>,
}

impl RootRule {
    #[must_use]
    pub fn matches(&self, db_key: &str) -> bool {
        self.pattern.is_match(db_key)
    }
}

/// Free-space probe, overridable in tests; defaults to `fs2`-free
/// `std::fs`-only behavior (available space is not queried by default — a
/// caller running on a real filesystem supplies a probe that calls out to
/// platform `statvfs`).
pub type FreeSpaceProbe = fn(&Path) -> Option<u64>;

fn unknown_free_space(_path: &Path) -> Option<u64> {
    None
}

/// Answers root-selection queries for db-keys: which roots a DB may be
/// written to, read from, or moved to, with write-roots additionally
/// filtered by free-space policy.
pub struct RootManager {
    rules: Vec<RootRule>,
    free_space: FreeSpaceProbe,
}

impl RootManager {
    #[must_use]
    pub fn new(rules: Vec<RootRule>) -> Self {
        Self {
            rules,
            free_space: unknown_free_space,
        }
    }

    #[must_use]
    pub fn with_free_space_probe(mut self, probe: FreeSpaceProbe) -> Self {
        self.free_space = probe;
        self
    }

    /// All roots a db-key may be written to, filtered by free-space policy
    /// when a root declares `min_free_bytes`.
    #[must_use]
    pub fn write_roots(&self, db_key: &str) -> Vec<&Path> {
        self.rules
            .iter()
            .filter(|rule| rule.writable && rule.matches(db_key))
            .filter(|rule| match rule.min_free_bytes {
                Some(min) => (self.free_space)(&rule.path).map_or(true, |free| free >= min),
                None => true,
            })
            .map(|rule| rule.path.as_path())
            .collect()
    }

    /// All roots a db-key may be read/listed from.
    #[must_use]
    pub fn visit_roots(&self, db_key: &str) -> Vec<&Path> {
        self.rules
            .iter()
            .filter(|rule| rule.visitable && rule.matches(db_key))
            .map(|rule| rule.path.as_path())
            .collect()
    }

    /// The first write-root matching `db_key`, if any — the common case of
    /// "which single root does a fresh archive land on".
    #[must_use]
    pub fn primary_write_root(&self, db_key: &str) -> Option<&Path> {
        self.write_roots(db_key).into_iter().next()
    }
}

/// Top-level builder, mirroring the teacher's `Config` type: constructed
/// once, consumed to produce the handle that owns the engine registry and
/// root manager.
pub struct Config {
    pub root_manager: RootManager,
    pub fdb_only_creator_can_write: bool,
    pub aux_extensions: Vec<String>,
    pub async_write: bool,
}

impl Config {
    #[must_use]
    pub fn new(root_manager: RootManager) -> Self {
        Self {
            root_manager,
            fdb_only_creator_can_write: false,
            aux_extensions: Vec::new(),
            async_write: false,
        }
    }

    #[must_use]
    pub fn only_creator_can_write(mut self, flag: bool) -> Self {
        self.fdb_only_creator_can_write = flag;
        self
    }

    #[must_use]
    pub fn aux_extensions(mut self, extensions: Vec<String>) -> Self {
        self.aux_extensions = extensions;
        self
    }

    #[must_use]
    pub fn async_write(mut self, flag: bool) -> Self {
        self.async_write = flag;
        self
    }

    /// Builds a `Config` from a [`RawConfig`], applying the documented
    /// defaults for any key left unset. `roots` supplies the already-parsed
    /// root rules, since `RawConfig`'s regex/path fields need an owner
    /// outside the map to stay `Regex`-typed rather than stringly-typed.
    #[must_use]
    pub fn from_raw(raw: &RawConfig, roots: Vec<RootRule>) -> Self {
        let mut config = Self::new(RootManager::new(roots));

        if let Some(flag) = raw.get("fdbOnlyCreatorCanWrite").and_then(ConfigValue::as_bool) {
            config.fdb_only_creator_can_write = flag;
        }
        if let Some(flag) = raw.get("asyncWrite").and_then(ConfigValue::as_bool) {
            config.async_write = flag;
        }
        if let Some(list) = raw.get("auxExtensions").and_then(ConfigValue::as_list) {
            config.aux_extensions = list
                .iter()
                .filter_map(ConfigValue::as_str)
                .map(str::to_string)
                .collect();
        }

        config
    }
}

/// Expands `path`, honoring the environment-variable precedence order
/// documented in §6 (`FDB_HOME` etc. take precedence over config values);
/// callers resolve the env vars themselves and pass the winning string in.
#[must_use]
pub fn expand_root_path(path: impl AsRef<Path>) -> PathBuf {
    absolute_path(path)
}
