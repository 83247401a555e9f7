// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Ordered metadata key, as described in §3 Data Model ("Key").

use rustc_hash::FxHashMap;

/// An ordered, name-unique sequence of `(name, value)` pairs.
///
/// Insertion order is significant: it is what canonicalization (used to
/// build TOC paths and B-tree fingerprints) falls back to when no explicit
/// schema-rule ordering is supplied. Equality is order- and value-sensitive.
#[derive(Clone, Default, Eq)]
pub struct Key {
    pairs: Vec<(String, String)>,
    index: FxHashMap<String, usize>,
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.pairs == other.pairs
    }
}

impl std::hash::Hash for Key {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.pairs.hash(state);
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key{:?}", self.pairs)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

impl Key {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates `name`. If `name` already exists its *position* is
    /// preserved (only the value is overwritten) so repeated archiving of
    /// the same full key in a different parameter order still canonicalizes
    /// identically once a schema-rule ordering is applied.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();

        if let Some(&idx) = self.index.get(&name) {
            self.pairs[idx].1 = value;
        } else {
            self.index.insert(name.clone(), self.pairs.len());
            self.pairs.push((name, value));
        }

        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.index.get(name).map(|&idx| self.pairs[idx].1.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Builds the canonical `name=value,...` string for `names`, in the
    /// order given (normally a schema rule's declared level order), failing
    /// silently (skipping) any name absent from this key.
    #[must_use]
    pub fn canonical(&self, names: &[String]) -> String {
        names
            .iter()
            .filter_map(|name| self.get(name).map(|v| format!("{name}={v}")))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Restricts this key to just `names`, preserving `names`' order.
    #[must_use]
    pub fn select(&self, names: &[String]) -> Self {
        let mut out = Self::new();
        for name in names {
            if let Some(v) = self.get(name) {
                out.set(name.clone(), v.to_string());
            }
        }
        out
    }

    /// Returns a new key with all pairs of `other` not already present in
    /// `self` merged in, appended in `other`'s order.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (k, v) in &other.pairs {
            if !out.contains(k) {
                out.set(k.clone(), v.clone());
            }
        }
        out
    }
}

impl FromIterator<(String, String)> for Key {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut key = Self::new();
        for (k, v) in iter {
            key.set(k, v);
        }
        key
    }
}
