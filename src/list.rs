// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Lazy listing: expand a partial request into candidate partial keys via
//! the [`Schema`], then resolve each one against its DB's [`Catalogue`] on
//! demand — enumerating any index- or field-level name the request left
//! unset from the catalogue's actual live indexes and their [`Axes`],
//! rather than requiring every name up front.
//!
//! [`Axes`]: crate::catalogue::axis::Axes

use crate::catalogue::index::Index;
use crate::catalogue::Catalogue;
use crate::field::Field;
use crate::key::Key;
use crate::schema::{Request, Rule, Schema};
use crate::stop_signal::StopSignal;
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Shared stop flag: cancelling it causes the next `.next()` call on any
/// in-flight listing/wipe/purge iteration to return `Err(Error::Cancelled)`.
pub type CancellationToken = StopSignal;

/// One resolved listing result: the full key it matches plus the field it
/// names.
pub struct ListEntry {
    pub full_key: Key,
    pub field: Field,
}

/// Lazily resolves an expanded request against catalogues opened on
/// demand, caching one open `Catalogue` per db-key for the lifetime of the
/// iterator. One partial candidate can resolve to many concrete entries
/// (every live index it matches, times every field-key combination its
/// unset names admit), so resolved entries are buffered in `pending` and
/// drained before the next candidate is pulled.
pub struct ListIter<C, O>
where
    C: Catalogue,
    O: FnMut(&Key) -> Result<Option<C>>,
{
    candidates: std::vec::IntoIter<Key>,
    pending: VecDeque<ListEntry>,
    schema: Schema,
    open_catalogue: O,
    cache: FxHashMap<String, Option<C>>,
    cancel: CancellationToken,
}

impl<C, O> ListIter<C, O>
where
    C: Catalogue,
    O: FnMut(&Key) -> Result<Option<C>>,
{
    fn catalogue_for(&mut self, db_key: &Key) -> Result<bool> {
        let canonical = db_key.to_string();
        if !self.cache.contains_key(&canonical) {
            let opened = (self.open_catalogue)(db_key)?;
            self.cache.insert(canonical.clone(), opened);
        }
        Ok(self.cache.get(&canonical).unwrap().is_some())
    }

    /// Resolves one partial candidate against its catalogue, buffering
    /// every concrete resolution it expands to into `pending`.
    fn resolve_candidate(&mut self, candidate: Key) -> Result<()> {
        let rule = self
            .schema
            .rule_for_partial(&candidate)
            .ok_or_else(|| Error::SchemaMismatch(format!("no rule matches partial key {candidate}")))?
            .clone();

        let db_key = candidate.select(&rule.level1);
        if !self.catalogue_for(&db_key)? {
            return Ok(());
        }

        let canonical = db_key.to_string();
        let catalogue = self
            .cache
            .get(&canonical)
            .and_then(Option::as_ref)
            .expect("checked present above");

        let partial_index_key = candidate.select(&rule.level2);
        let partial_field_key = candidate.select(&rule.level3);

        for entry in catalogue.visit() {
            if !index_key_matches(&partial_index_key, &entry.index_key) {
                continue;
            }

            for field_key in resolve_field_keys(&rule, &partial_field_key, entry.index) {
                let fingerprint = field_key.to_string();
                if let Some(field) = catalogue.get(&entry.index_key, &fingerprint, None)? {
                    let full_key = db_key.merged_with(&entry.index_key).merged_with(&field_key);
                    self.pending.push_back(ListEntry { full_key, field });
                }
            }
        }

        Ok(())
    }
}

/// Whether every name `candidate` explicitly carries agrees with
/// `index_key`'s value for that name. Names `candidate` is silent on
/// (because the request left them unset) pass unconditionally — that is
/// what lets one partial index-key candidate match every live index of a
/// db, not just one.
fn index_key_matches(candidate: &Key, index_key: &Key) -> bool {
    candidate
        .pairs()
        .iter()
        .all(|(name, value)| index_key.get(name) == Some(value.as_str()))
}

/// Builds every concrete field-key combination `rule.level3` admits, given
/// a partial field key (literal values the request already supplied) and
/// `index`'s observed axes (candidate values for names the request left
/// unset). Always iterates `rule.level3` in declared order, so the
/// resulting key's canonical fingerprint matches what archiving produced;
/// a name with neither a literal value nor any observed axis values
/// collapses the whole combination to empty rather than guessing.
fn resolve_field_keys(rule: &Rule, partial: &Key, index: &Index) -> Vec<Key> {
    let mut combos = vec![Key::new()];

    for name in &rule.level3 {
        let values: Vec<&str> = if let Some(value) = partial.get(name) {
            vec![value]
        } else {
            match index.axes().values(name) {
                Some(values) => values.iter().map(String::as_str).collect(),
                None => return Vec::new(),
            }
        };

        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in &values {
                let mut k = combo.clone();
                k.set(name.clone(), (*value).to_string());
                next.push(k);
            }
        }
        combos = next;
    }

    combos
}

impl<C, O> Iterator for ListIter<C, O>
where
    C: Catalogue,
    O: FnMut(&Key) -> Result<Option<C>>,
{
    type Item = Result<ListEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancel.is_stopped() {
                return Some(Err(Error::Cancelled));
            }

            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }

            let candidate = self.candidates.next()?;
            if let Err(e) = self.resolve_candidate(candidate) {
                return Some(Err(e));
            }
        }
    }
}

/// Expands `request` via `schema` and returns a lazy iterator over every
/// field that actually exists.
pub fn list<C, O>(
    schema: &Schema,
    request: &Request,
    open_catalogue: O,
    cancel: CancellationToken,
) -> Result<ListIter<C, O>>
where
    C: Catalogue,
    O: FnMut(&Key) -> Result<Option<C>>,
{
    let candidates = schema.expand(request)?;
    Ok(ListIter {
        candidates: candidates.into_iter(),
        pending: VecDeque::new(),
        schema: schema.clone(),
        open_catalogue,
        cache: FxHashMap::default(),
        cancel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::local::LocalCatalogue;
    use crate::location::FieldLocation;
    use test_log::test;

    fn schema() -> Schema {
        Schema::new(vec![Rule::new(["class"], ["date"], ["param"])])
    }

    #[test]
    fn list_resolves_archived_fields_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut db_key = Key::new();
        db_key.set("class", "od");

        let mut cat = LocalCatalogue::create(dir.path(), db_key, b"schema")?;
        let mut index_key = Key::new();
        index_key.set("date", "20260101");
        let mut field_key = Key::new();
        field_key.set("param", "130");

        cat.put(
            &index_key,
            "param=130",
            &field_key,
            FieldLocation::LocalFile {
                path: "/data/a".into(),
                offset: 0,
                length: 4,
                remap_key: None,
            },
            None,
        )?;
        cat.flush()?;

        let request = Request::new()
            .with("class", vec!["od".into()])
            .with("date", vec!["20260101".into()])
            .with("param", vec!["130".into(), "131".into()]);

        let mut opened = Some(cat);
        let iter = list(
            &schema(),
            &request,
            move |_db_key| Ok(opened.take()),
            CancellationToken::default(),
        )?;

        let results: Vec<_> = iter.collect::<Result<Vec<_>>>()?;
        assert_eq!(1, results.len());
        assert_eq!(4, results[0].field.location.length());
        Ok(())
    }

    #[test]
    fn list_stops_when_cancelled() -> Result<()> {
        let schema = schema();
        let request = Request::new()
            .with("class", vec!["od".into()])
            .with("date", vec!["20260101".into()])
            .with("param", vec!["130".into()]);

        let cancel = CancellationToken::default();
        cancel.send();

        let iter = list::<LocalCatalogue, _>(&schema, &request, |_| Ok(None), cancel)?;
        let results: Vec<_> = iter.collect();
        assert_eq!(1, results.len());
        assert!(matches!(results[0], Err(Error::Cancelled)));
        Ok(())
    }

    #[test]
    fn list_enumerates_unset_index_and_field_names_from_catalogue() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut db_key = Key::new();
        db_key.set("class", "od");

        let nested_schema = Schema::new(vec![Rule::new(["class"], ["c", "d"], ["e", "f"])]);

        let mut cat = LocalCatalogue::create(dir.path(), db_key, b"schema")?;
        let mut index_key = Key::new();
        index_key.set("c", "3");
        index_key.set("d", "4");
        let mut field_key = Key::new();
        field_key.set("e", "5");
        field_key.set("f", "6");

        cat.put(
            &index_key,
            "e=5,f=6",
            &field_key,
            FieldLocation::LocalFile {
                path: "/data/a".into(),
                offset: 0,
                length: 6,
                remap_key: None,
            },
            None,
        )?;
        cat.flush()?;

        let request = Request::new().with("class", vec!["od".into()]);

        let mut opened = Some(cat);
        let iter = list(
            &nested_schema,
            &request,
            move |_db_key| Ok(opened.take()),
            CancellationToken::default(),
        )?;

        let results: Vec<_> = iter.collect::<Result<Vec<_>>>()?;
        assert_eq!(1, results.len());
        assert_eq!(Some("3"), results[0].full_key.get("c"));
        assert_eq!(Some("4"), results[0].full_key.get("d"));
        assert_eq!(Some("5"), results[0].full_key.get("e"));
        assert_eq!(Some("6"), results[0].full_key.get("f"));
        Ok(())
    }
}
