// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Schema rules: decomposition of a full [`Key`] into `(db_key, index_key,
//! field_key)`, and expansion of a multi-valued request into the set of
//! partial keys it denotes — candidates the listing path resolves the rest
//! of against a catalogue's actual contents.

use crate::key::Key;
use crate::{Error, Result};
use rustc_hash::FxHashMap;

/// One three-level template: the ordered list of key names that belong to
/// the db, index, and field level respectively.
#[derive(Clone, Debug, Default)]
pub struct Rule {
    pub level1: Vec<String>,
    pub level2: Vec<String>,
    pub level3: Vec<String>,
}

impl Rule {
    #[must_use]
    pub fn new(
        level1: impl IntoIterator<Item = impl Into<String>>,
        level2: impl IntoIterator<Item = impl Into<String>>,
        level3: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            level1: level1.into_iter().map(Into::into).collect(),
            level2: level2.into_iter().map(Into::into).collect(),
            level3: level3.into_iter().map(Into::into).collect(),
        }
    }

    fn all_names(&self) -> impl Iterator<Item = &String> {
        self.level1
            .iter()
            .chain(self.level2.iter())
            .chain(self.level3.iter())
    }
}

/// A multi-valued key used as the input to [`Schema::expand`]: each name
/// maps to one or more candidate values, Cartesian-expanded into full keys.
#[derive(Clone, Debug, Default)]
pub struct Request {
    values: FxHashMap<String, Vec<String>>,
}

impl Request {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.values.insert(name.into(), values);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl From<&Key> for Request {
    fn from(key: &Key) -> Self {
        let mut req = Self::new();
        for (name, value) in key.pairs() {
            req = req.with(name.clone(), vec![value.clone()]);
        }
        req
    }
}

/// An ordered list of [`Rule`]s. The first rule whose level-1 and level-2
/// names are all present in a given key "matches" it.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    rules: Vec<Rule>,
}

impl Schema {
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    fn rule_for_full_key<'a>(&'a self, full_key: &Key) -> Option<&'a Rule> {
        self.rules
            .iter()
            .find(|rule| rule.all_names().all(|name| full_key.contains(name)))
    }

    /// Splits a fully-specified key into `(db_key, index_key, field_key)`
    /// using the first rule whose declared names are all present.
    pub fn match_level(&self, full_key: &Key) -> Result<(Key, Key, Key)> {
        let rule = self.rule_for_full_key(full_key).ok_or_else(|| {
            Error::SchemaMismatch(format!("no rule matches key {full_key}"))
        })?;

        let db_key = full_key.select(&rule.level1);
        let index_key = full_key.select(&rule.level2);
        let field_key = full_key.select(&rule.level3);

        Ok((db_key, index_key, field_key))
    }

    /// For a partial request, returns the set of db-keys it could resolve
    /// to, one per rule whose level-1 names are all present in
    /// `partial_key`.
    #[must_use]
    pub fn first_level_match(&self, partial_key: &Key) -> Vec<Key> {
        let mut out = Vec::new();

        for rule in &self.rules {
            let covers_all = rule
                .level1
                .iter()
                .all(|name| partial_key.contains(name));

            if !covers_all {
                continue;
            }

            let db_key = partial_key.select(&rule.level1);
            out.push(db_key);
        }

        out
    }

    /// Finds the rule a partial key resolves to by its level-1 (db) names
    /// alone, leaving level-2/level-3 names unconstrained. Used by listing
    /// to recover a candidate's rule after [`Schema::expand`] has already
    /// narrowed it to one db.
    #[must_use]
    pub(crate) fn rule_for_partial(&self, key: &Key) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|rule| rule.level1.iter().all(|name| key.contains(name)))
    }

    /// Cartesian-expands a multi-valued request into the set of partial keys
    /// it denotes, using the first rule whose db-level names are all
    /// present in the request. Only names the request actually supplies
    /// values for are expanded, in rule order; names the request is silent
    /// on are left unset rather than stood in for with a placeholder — it
    /// is the listing path's job to enumerate those against the catalogue's
    /// actual contents, since a pure schema has no way to know what index-
    /// or field-level values were ever archived.
    pub fn expand(&self, request: &Request) -> Result<Vec<Key>> {
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.level1.iter().all(|name| request.contains(name)))
            .ok_or_else(|| Error::SchemaMismatch("no rule matches request".into()))?;

        let names: Vec<&String> = rule.all_names().collect();
        let mut combos: Vec<Key> = vec![Key::new()];

        for name in names {
            let Some(values) = request.get(name) else {
                continue;
            };

            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for value in values {
                    let mut k = combo.clone();
                    k.set(name.clone(), value.clone());
                    next.push(k);
                }
            }
            combos = next;
        }

        Ok(combos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_schema() -> Schema {
        Schema::new(vec![Rule::new(
            ["class", "expver", "stream"],
            ["date", "time"],
            ["param", "levelist"],
        )])
    }

    #[test]
    fn match_level_splits_by_rule() {
        let schema = weather_schema();
        let mut full = Key::new();
        full.set("class", "od");
        full.set("expver", "0001");
        full.set("stream", "oper");
        full.set("date", "20260101");
        full.set("time", "1200");
        full.set("param", "130");
        full.set("levelist", "500");

        let (db, index, field) = schema.match_level(&full).unwrap();
        assert_eq!(Some("od"), db.get("class"));
        assert_eq!(Some("1200"), index.get("time"));
        assert_eq!(Some("500"), field.get("levelist"));
    }

    #[test]
    fn match_level_fails_without_rule() {
        let schema = weather_schema();
        let mut full = Key::new();
        full.set("class", "od");

        assert!(matches!(
            schema.match_level(&full),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn expand_builds_cartesian_product() {
        let schema = weather_schema();
        let request = Request::new()
            .with("class", vec!["od".into()])
            .with("expver", vec!["0001".into()])
            .with("stream", vec!["oper".into()])
            .with("date", vec!["20260101".into()])
            .with("time", vec!["0000".into(), "1200".into()])
            .with("param", vec!["130".into(), "131".into()])
            .with("levelist", vec!["500".into()]);

        let keys = schema.expand(&request).unwrap();
        assert_eq!(4, keys.len());
    }

    #[test]
    fn first_level_match_returns_db_keys() {
        let schema = weather_schema();
        let mut partial = Key::new();
        partial.set("class", "od");
        partial.set("expver", "0001");
        partial.set("stream", "oper");

        let dbs = schema.first_level_match(&partial);
        assert_eq!(1, dbs.len());
        assert_eq!(Some("oper"), dbs[0].get("stream"));
    }

    #[test]
    fn expand_leaves_unsupplied_names_unset() {
        let schema = weather_schema();
        let request = Request::new()
            .with("class", vec!["od".into()])
            .with("expver", vec!["0001".into()])
            .with("stream", vec!["oper".into()]);

        let keys = schema.expand(&request).unwrap();
        assert_eq!(1, keys.len());
        assert_eq!(Some("od"), keys[0].get("class"));
        assert!(!keys[0].contains("date"));
        assert!(!keys[0].contains("param"));
    }

    #[test]
    fn rule_for_partial_ignores_index_and_field_names() {
        let schema = weather_schema();
        let mut partial = Key::new();
        partial.set("class", "od");
        partial.set("expver", "0001");
        partial.set("stream", "oper");

        let rule = schema.rule_for_partial(&partial).unwrap();
        assert_eq!(vec!["date", "time"], rule.level2);
    }
}
