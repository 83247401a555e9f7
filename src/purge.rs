// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Purge: finds fingerprints archived more than once across a DB's live
//! indexes, plus any physical data file no live index references at all,
//! without ever touching the DB's TOC or schema.

use crate::catalogue::Catalogue;
use crate::key::Key;
use crate::Result;
use std::collections::HashSet;

pub struct PurgePlan {
    pub data_to_delete: HashSet<String>,
    pub indexes_to_remove: Vec<Key>,
}

pub struct PurgeReport {
    pub masked_indexes: usize,
    pub deleted_data_uris: usize,
}

/// Scans every live index newest-to-oldest (by TOC offset, matching the
/// reverse-insertion contract `TocLog::load_indexes` already establishes).
/// A fingerprint's first occurrence under this ordering is reachable;
/// every later occurrence is a duplicate. A URI with no reachable
/// occurrence at all is unreferenced and safe to delete; an index whose
/// every fingerprint turned out to be a duplicate is safe to mask.
///
/// The catalogue alone only ever sees *live* indexes — a store backend
/// that gives a superseded generation its own physical file (so an
/// earlier flush's bytes survive the catalogue masking its TOC record)
/// leaves that file invisible to the scan above. `stores` mirrors
/// [`crate::wipe::plan`]'s two-sided shape: each store is asked for every
/// data object it actually holds, and anything not referenced by *any*
/// live index — not just a duplicate one — is folded into
/// `data_to_delete` alongside the duplicate-fingerprint uris.
pub fn plan(
    catalogue: &impl Catalogue,
    stores: &[(&dyn Fn(&str) -> bool, &dyn Fn() -> Result<Vec<String>>)],
) -> Result<PurgePlan> {
    let mut entries = catalogue.visit();
    entries.sort_by(|a, b| b.location.offset.cmp(&a.location.offset));

    let mut reachable_uris: HashSet<String> = HashSet::new();
    let mut referenced_uris: HashSet<String> = HashSet::new();
    let mut live_uris: HashSet<String> = HashSet::new();
    let mut seen_fingerprints: HashSet<String> = HashSet::new();
    let mut indexes_to_remove = Vec::new();

    for entry in &entries {
        if entry.index.is_empty() {
            continue;
        }

        let mut all_duplicate = true;

        for (fingerprint, field_ref) in entry.index.entries() {
            let uri = entry.index.uri_store().uri(field_ref.uri_id).map(str::to_string);
            if let Some(uri) = &uri {
                live_uris.insert(uri.clone());
            }

            if seen_fingerprints.insert(fingerprint.to_string()) {
                all_duplicate = false;
                if let Some(uri) = &uri {
                    reachable_uris.insert(uri.clone());
                }
            }

            if let Some(uri) = uri {
                referenced_uris.insert(uri);
            }
        }

        if all_duplicate {
            log::debug!("purge: index {} is entirely duplicate fingerprints", entry.index_key);
            indexes_to_remove.push(entry.index_key.clone());
        }
    }

    let mut data_to_delete: HashSet<String> = referenced_uris
        .difference(&reachable_uris)
        .cloned()
        .collect();

    for (uri_belongs, collocated) in stores {
        for uri in collocated()? {
            if uri_belongs(&uri) && !live_uris.contains(&uri) {
                log::debug!("purge: {uri} is not referenced by any live index");
                data_to_delete.insert(uri);
            }
        }
    }

    Ok(PurgePlan {
        data_to_delete,
        indexes_to_remove,
    })
}

/// With `doit == false`, only reports counts. With `doit == true`, masks
/// `indexes_to_remove` and removes `data_to_delete` via `remove_uri`
/// (which routes a URI to its owning store). Never masks the whole DB and
/// never touches the TOC/schema files directly.
pub fn report_or_commit(
    plan: &PurgePlan,
    catalogue: &mut impl Catalogue,
    mut remove_uri: impl FnMut(&str, bool) -> Result<()>,
    doit: bool,
) -> Result<PurgeReport> {
    let report = PurgeReport {
        masked_indexes: plan.indexes_to_remove.len(),
        deleted_data_uris: plan.data_to_delete.len(),
    };

    if !doit {
        log::info!(
            "purge (doit=false): would mask {} indexes, delete {} data uris",
            report.masked_indexes,
            report.deleted_data_uris
        );
        return Ok(report);
    }

    for index_key in &plan.indexes_to_remove {
        catalogue.mask_index(index_key)?;
    }

    for uri in &plan.data_to_delete {
        remove_uri(uri, true)?;
    }

    log::debug!(
        "purge committed: masked {} indexes, deleted {} data uris",
        report.masked_indexes,
        report.deleted_data_uris
    );
    Ok(report)
}
