// Cataloguing Run
//
// Drives one full pass over the listing:
// list page → classify/accumulate → persist closed SSTables
// → persist global state → mirror summary to the config map
//
// Everything is sequential; each I/O call blocks the run and the
// first failure aborts it. Descriptors already written stay written.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{CatalogError, Cataloger, ClosedSSTable, Finished, SkippedKey};
use crate::config::RunConfig;
use crate::descriptor::{
    encode_global_state, encode_sstable, global_state_descriptor_key, sstable_descriptor_key,
};
use crate::format::format_size;
use crate::names::KeyParseError;
use crate::state::{MigrationGlobalState, SizeOverflow};
use crate::store::{
    ConfigMapError, ConfigMapPublisher, ConfigMapTarget, DescriptorStore, ListingError,
    ObjectLister, PersistError,
};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to get page {page}: {source}")]
    Listing {
        page: u64,
        #[source]
        source: ListingError,
    },

    #[error("malformed sstable component key: {0}")]
    Parse(#[from] KeyParseError),

    #[error("size of {key} overflows its sstable: {source}")]
    SSTableSize {
        key: String,
        #[source]
        source: SizeOverflow,
    },

    #[error("migration data size: {0}")]
    DataSize(#[from] SizeOverflow),

    #[error("failed to encode descriptor `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to persist descriptor: {0}")]
    Persist(#[from] PersistError),

    #[error("failed to update config map: {0}")]
    ConfigMap(#[from] ConfigMapError),
}

impl From<CatalogError> for RunError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Parse(err) => Self::Parse(err),
            CatalogError::SSTableSize { key, source } => Self::SSTableSize { key, source },
            CatalogError::DataSize(source) => Self::DataSize(source),
        }
    }
}

/// What happened to the config map mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConfigMapOutcome {
    Published {
        target: ConfigMapTarget,
        entries: BTreeMap<String, String>,
    },

    /// No map configured; these entries would have been written.
    Disabled { entries: BTreeMap<String, String> },
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub global_state: MigrationGlobalState,
    pub global_state_key: String,
    pub sstable_descriptor_keys: Vec<String>,
    pub pages_read: u64,
    pub objects_listed: u64,
    pub skipped_keys: Vec<SkippedKey>,
    pub config_map: ConfigMapOutcome,
}

/// Summary fields mirrored into the config map.
pub fn config_map_entries(state: &MigrationGlobalState) -> BTreeMap<String, String> {
    let id = &state.migration_id;
    BTreeMap::from([
        (
            format!("sstable-descriptor-key-prefix-{id}"),
            state.sstable_descriptor_key_prefix.clone(),
        ),
        (
            format!("total-sstable-count-{id}"),
            state.sstable_count.to_string(),
        ),
    ])
}

/// Catalogue the listing and persist every descriptor.
pub fn run_migration<L, S, C>(
    config: &RunConfig,
    lister: &mut L,
    store: &mut S,
    config_maps: &mut C,
) -> Result<RunReport, RunError>
where
    L: ObjectLister + ?Sized,
    S: DescriptorStore + ?Sized,
    C: ConfigMapPublisher + ?Sized,
{
    let mut cataloger = Cataloger::new(
        config.migration_id.as_str(),
        config.classifier.clone(),
        config.malformed_key_policy,
    );
    let mut sstable_descriptor_keys = Vec::new();
    let mut pages_read = 0u64;
    let mut objects_listed = 0u64;

    loop {
        let page_number = pages_read + 1;
        let page = match lister.next_page() {
            Ok(Some(page)) => page,
            Ok(None) => break,
            Err(source) => {
                return Err(RunError::Listing {
                    page: page_number,
                    source,
                })
            }
        };
        pages_read = page_number;
        objects_listed += page.len() as u64;
        info!(page = page_number, keys = page.len(), "reading page");

        for entry in &page {
            if let Some(closed) = cataloger.observe(&entry.key, entry.size)? {
                let key = persist_sstable(store, cataloger.state(), &closed)?;
                sstable_descriptor_keys.push(key);
            }
        }
    }

    let Finished {
        last,
        state: global_state,
        skipped_keys,
    } = cataloger.finish()?;
    if let Some(closed) = last {
        let key = persist_sstable(store, &global_state, &closed)?;
        sstable_descriptor_keys.push(key);
    }

    let global_state_key = global_state_descriptor_key(&global_state.migration_id);
    let body = encode_global_state(&global_state).map_err(|source| RunError::Encode {
        key: global_state_key.clone(),
        source,
    })?;
    let location = store.put(&global_state_key, &body)?;
    info!(
        %location,
        keyspaces = global_state.keyspace_count,
        tables = global_state.cql_table_count,
        sstables = global_state.sstable_count,
        data_size = %format_size(global_state.data_size),
        "persisted migration global state"
    );
    if !skipped_keys.is_empty() {
        warn!(skipped = skipped_keys.len(), "malformed component keys were skipped");
    }

    let entries = config_map_entries(&global_state);
    let config_map = match &config.config_map {
        Some(target) => {
            config_maps.update(target, &entries)?;
            info!(
                namespace = %target.namespace,
                name = %target.name,
                "wrote state to config map"
            );
            ConfigMapOutcome::Published {
                target: target.clone(),
                entries,
            }
        }
        None => {
            info!(
                migration_id = %global_state.migration_id,
                "config map disabled, state not written"
            );
            for (key, value) in &entries {
                info!(%key, %value, "config map entry");
            }
            ConfigMapOutcome::Disabled { entries }
        }
    };

    Ok(RunReport {
        global_state,
        global_state_key,
        sstable_descriptor_keys,
        pages_read,
        objects_listed,
        skipped_keys,
        config_map,
    })
}

fn persist_sstable<S: DescriptorStore + ?Sized>(
    store: &mut S,
    state: &MigrationGlobalState,
    closed: &ClosedSSTable,
) -> Result<String, RunError> {
    let key = sstable_descriptor_key(state, closed);
    let body = encode_sstable(closed).map_err(|source| RunError::Encode {
        key: key.clone(),
        source,
    })?;
    let location = store.put(&key, &body)?;
    info!(
        %location,
        sequence = closed.sequence,
        components = closed.sstable.component_file_keys.len(),
        size = closed.sstable.size,
        "persisted sstable descriptor"
    );
    Ok(key)
}
