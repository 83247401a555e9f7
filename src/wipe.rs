// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Two-sided wipe: the catalogue identifies index/metadata paths to erase,
//! each store identifies data paths, and an unknown-file policy gates
//! whether a full wipe may proceed.

use crate::catalogue::Catalogue;
use crate::key::Key;
use crate::schema::Request;
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::PathBuf;

/// Per-DB catalogue-side wipe plan: which indexes to mask, and which data
/// URIs are safe to delete versus must be preserved.
#[derive(Debug, Default)]
pub struct CatalogueWipeState {
    pub metadata_paths: Vec<PathBuf>,
    pub include_data_uris: HashSet<String>,
    pub exclude_data_uris: HashSet<String>,
    pub indexes_to_mask: Vec<Key>,
}

/// Per-store-instance wipe plan, filled in by [`delegate_to_stores`].
#[derive(Debug, Default)]
pub struct StoreWipeState {
    pub data_uris: HashSet<String>,
    pub unrecognised_uris: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct WipePlan {
    pub catalogue: CatalogueWipeState,
    pub stores: Vec<StoreWipeState>,
    /// `true` if some index was excluded from the request, meaning
    /// metadata (TOC, schema) must be preserved; `false` is a full wipe.
    pub is_partial: bool,
}

pub struct WipeReport {
    pub is_partial: bool,
    pub masked_indexes: usize,
    pub deleted_data_uris: usize,
    pub deleted_unknown_uris: usize,
    pub deleted_metadata_paths: usize,
}

fn index_matches(index_key: &Key, request: &Request) -> bool {
    index_key.names().all(|name| match request.get(name) {
        Some(values) => index_key
            .get(name)
            .map(|v| values.iter().any(|candidate| candidate == v))
            .unwrap_or(false),
        None => true,
    })
}

/// **Visit.** Walks every live index of `catalogue`, classifying its data
/// URIs as included (to delete) or excluded (to preserve, because the
/// request was below index-level granularity for this particular index).
pub fn visit(catalogue: &impl Catalogue, index_request: &Request) -> CatalogueWipeState {
    let mut include = HashSet::new();
    let mut exclude = HashSet::new();
    let mut indexes_to_mask = Vec::new();

    for entry in catalogue.visit() {
        let matches = index_matches(&entry.index_key, index_request);
        let uris: HashSet<String> = entry
            .index
            .entries()
            .filter_map(|(_, field_ref)| entry.index.uri_store().uri(field_ref.uri_id))
            .map(str::to_string)
            .collect();

        if matches {
            indexes_to_mask.push(entry.index_key.clone());
            include.extend(uris);
        } else {
            exclude.extend(uris);
        }
    }

    // A URI reachable from an excluded index is never eligible for
    // deletion, even if some other included index also names it.
    let include: HashSet<String> = include.difference(&exclude).cloned().collect();
    let is_partial = !exclude.is_empty();

    CatalogueWipeState {
        metadata_paths: if is_partial {
            Vec::new()
        } else {
            catalogue.metadata_paths()
        },
        include_data_uris: include,
        exclude_data_uris: exclude,
        indexes_to_mask,
    }
}

/// **Delegate to stores.** Routes each known data URI to its owning store
/// via `uri_belongs`, and asks each store to enumerate everything it
/// actually has on disk so files unknown to the catalogue can be classified.
pub fn delegate_to_stores(
    catalogue_state: &CatalogueWipeState,
    stores: &[(&dyn Fn(&str) -> bool, &dyn Fn() -> Result<Vec<String>>)],
) -> Result<Vec<StoreWipeState>> {
    let mut known: HashSet<String> = catalogue_state.include_data_uris.clone();
    known.extend(catalogue_state.exclude_data_uris.iter().cloned());

    let mut out = Vec::with_capacity(stores.len());

    for (uri_belongs, collocated) in stores {
        let all = collocated()?;
        let mut data_uris = HashSet::new();
        let mut unrecognised_uris = HashSet::new();

        for uri in all {
            if !uri_belongs(&uri) {
                continue;
            }
            if known.contains(&uri) {
                data_uris.insert(uri);
            } else {
                unrecognised_uris.insert(uri);
            }
        }

        out.push(StoreWipeState {
            data_uris,
            unrecognised_uris,
        });
    }

    Ok(out)
}

/// Builds the full two-sided plan: visit, then delegate.
pub fn plan(
    catalogue: &impl Catalogue,
    index_request: &Request,
    stores: &[(&dyn Fn(&str) -> bool, &dyn Fn() -> Result<Vec<String>>)],
) -> Result<WipePlan> {
    let catalogue_state = visit(catalogue, index_request);
    let store_states = delegate_to_stores(&catalogue_state, stores)?;
    let is_partial = catalogue_state.is_partial;

    Ok(WipePlan {
        catalogue: catalogue_state,
        stores: store_states,
        is_partial,
    })
}

/// **Report or commit.** With `doit == false`, only counts what would
/// happen. With `doit == true`, executes the ordered deletion: (1) mask
/// indexes, (2) delete unknown URIs, (3) delete store data URIs, (4) for a
/// full wipe, remove the catalogue's own metadata files (TOC, schema,
/// sub-TOCs) directly rather than masking them, since nothing will be left
/// to mask against. `remove_uri` routes a URI to its owning store.
pub fn report_or_commit(
    plan: &WipePlan,
    catalogue: &mut impl Catalogue,
    mut remove_uri: impl FnMut(&str, bool) -> Result<()>,
    doit: bool,
    unsafe_wipe_all: bool,
) -> Result<WipeReport> {
    let unknowns: Vec<String> = plan
        .stores
        .iter()
        .flat_map(|s| s.unrecognised_uris.iter().cloned())
        .collect();

    if !plan.is_partial && !unknowns.is_empty() && !unsafe_wipe_all {
        return Err(Error::UncleanDatabase(unknowns));
    }

    let report = WipeReport {
        is_partial: plan.is_partial,
        masked_indexes: plan.catalogue.indexes_to_mask.len(),
        deleted_data_uris: plan.catalogue.include_data_uris.len(),
        deleted_unknown_uris: unknowns.len(),
        deleted_metadata_paths: if plan.is_partial { 0 } else { plan.catalogue.metadata_paths.len() },
    };

    if !doit {
        log::info!(
            "wipe (doit=false): would mask {} indexes, delete {} data uris, {} unknown uris, {} metadata paths",
            report.masked_indexes,
            report.deleted_data_uris,
            report.deleted_unknown_uris,
            report.deleted_metadata_paths
        );
        return Ok(report);
    }

    for index_key in &plan.catalogue.indexes_to_mask {
        catalogue.mask_index(index_key)?;
    }

    for uri in &unknowns {
        remove_uri(uri, true)?;
    }

    for uri in &plan.catalogue.include_data_uris {
        remove_uri(uri, true)?;
    }

    if !plan.is_partial {
        // Clears the catalogue's in-memory live set first; the CLEAR record
        // this appends to the TOC is moot once the file itself is removed
        // below, but the in-process handle must still reflect an empty DB.
        catalogue.mask_all()?;

        for path in &plan.catalogue.metadata_paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        log::debug!("full wipe committed for {}", catalogue.db_key());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::local::LocalCatalogue;
    use crate::location::FieldLocation;
    use test_log::test;

    fn make_catalogue(dir: &std::path::Path) -> Result<LocalCatalogue> {
        let mut db_key = Key::new();
        db_key.set("class", "od");
        let mut cat = LocalCatalogue::create(dir, db_key, b"schema")?;

        for (date, param) in [("20260101", "130"), ("20260102", "130")] {
            let mut index_key = Key::new();
            index_key.set("date", date);
            let mut field_key = Key::new();
            field_key.set("param", param);

            cat.put(
                &index_key,
                &field_key.to_string(),
                &field_key,
                FieldLocation::LocalFile {
                    path: format!("/data/{date}.dat").into(),
                    offset: 0,
                    length: 4,
                    remap_key: None,
                },
                None,
            )?;
        }
        cat.flush()?;
        Ok(cat)
    }

    #[test]
    fn partial_wipe_preserves_metadata_and_excluded_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut cat = make_catalogue(dir.path())?;

        let request = Request::new().with("date", vec!["20260101".into()]);
        let plan = visit(&cat, &request);
        assert!(plan.is_partial);
        assert_eq!(1, plan.indexes_to_mask.len());
        assert!(plan.metadata_paths.is_empty());

        let mut removed = Vec::new();
        let wipe_plan = WipePlan {
            catalogue: plan,
            stores: Vec::new(),
            is_partial: true,
        };
        let report = report_or_commit(
            &wipe_plan,
            &mut cat,
            |uri, _doit| {
                removed.push(uri.to_string());
                Ok(())
            },
            true,
            false,
        )?;

        assert!(report.is_partial);
        assert_eq!(1, cat.visit().len());
        Ok(())
    }

    #[test]
    fn full_wipe_with_unknowns_fails_without_unsafe_flag() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut cat = make_catalogue(dir.path())?;

        let request = Request::new();
        let catalogue_state = visit(&cat, &request);
        assert!(!catalogue_state.is_partial);

        let mut unknown_state = StoreWipeState::default();
        unknown_state
            .unrecognised_uris
            .insert("file:///data/stray.dat".into());

        let wipe_plan = WipePlan {
            catalogue: catalogue_state,
            stores: vec![unknown_state],
            is_partial: false,
        };

        let result = report_or_commit(&wipe_plan, &mut cat, |_, _| Ok(()), true, false);
        assert!(matches!(result, Err(Error::UncleanDatabase(_))));
        Ok(())
    }

    #[test]
    fn full_wipe_with_unsafe_flag_removes_unknowns() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut cat = make_catalogue(dir.path())?;

        let request = Request::new();
        let catalogue_state = visit(&cat, &request);

        let mut unknown_state = StoreWipeState::default();
        unknown_state
            .unrecognised_uris
            .insert("file:///data/stray.dat".into());

        let wipe_plan = WipePlan {
            catalogue: catalogue_state,
            stores: vec![unknown_state],
            is_partial: false,
        };

        let mut removed = Vec::new();
        let report = report_or_commit(
            &wipe_plan,
            &mut cat,
            |uri, _doit| {
                removed.push(uri.to_string());
                Ok(())
            },
            true,
            true,
        )?;

        assert_eq!(1, report.deleted_unknown_uris);
        assert!(cat.visit().is_empty());
        Ok(())
    }
}
