// Listing Fold
//
// Folds an ordered stream of (key, size) entries into closed SSTables
// and the migration global state: classify, parse, accumulate, and
// apply every boundary delta exactly once.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{ClosedSSTable, SSTableAccumulator, Transition};
use crate::classify::KeyClassifier;
use crate::names::{key_path, EntityNames, KeyParseError};
use crate::state::{BoundaryDelta, MigrationGlobalState, SizeOverflow};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error(transparent)]
    Parse(#[from] KeyParseError),

    #[error("size of {key} overflows its sstable: {source}")]
    SSTableSize {
        key: String,
        #[source]
        source: SizeOverflow,
    },

    #[error("migration data size: {0}")]
    DataSize(#[from] SizeOverflow),
}

/// What to do with a component key whose structure cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedKeyPolicy {
    /// Fail the run.
    #[default]
    Abort,

    /// Log the key and continue as if it had not been listed.
    Skip,
}

/// A component key dropped under [`MalformedKeyPolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedKey {
    pub key: String,
    pub reason: String,
}

/// Streaming fold state for one run.
#[derive(Debug)]
pub struct Cataloger {
    classifier: KeyClassifier,
    policy: MalformedKeyPolicy,
    accumulator: SSTableAccumulator,
    state: MigrationGlobalState,
    skipped_keys: Vec<SkippedKey>,
}

impl Cataloger {
    pub fn new(
        migration_id: impl Into<String>,
        classifier: KeyClassifier,
        policy: MalformedKeyPolicy,
    ) -> Self {
        Self {
            classifier,
            policy,
            accumulator: SSTableAccumulator::new(),
            state: MigrationGlobalState::new(migration_id),
            skipped_keys: Vec::new(),
        }
    }

    pub fn state(&self) -> &MigrationGlobalState {
        &self.state
    }

    /// Feed one listed object.
    ///
    /// Returns the SSTable closed by this key, if it crossed a boundary.
    pub fn observe(&mut self, key: &str, size: i64) -> Result<Option<ClosedSSTable>, CatalogError> {
        if !self.classifier.is_component_file(key) {
            trace!(key, "not an sstable component");
            return Ok(None);
        }

        let names = match EntityNames::parse(key) {
            Ok(names) => names,
            Err(err) => match self.policy {
                MalformedKeyPolicy::Abort => return Err(err.into()),
                MalformedKeyPolicy::Skip => {
                    warn!(key, error = %err, "skipping malformed component key");
                    self.skipped_keys.push(SkippedKey {
                        key: key.to_string(),
                        reason: err.to_string(),
                    });
                    return Ok(None);
                }
            },
        };

        let transition = self
            .accumulator
            .push(names, key_path(key), key.to_string(), size)
            .map_err(|source| CatalogError::SSTableSize {
                key: key.to_string(),
                source,
            })?;

        match transition {
            Transition::Appended => Ok(None),
            Transition::Opened(delta) => {
                debug!(key, "opened first sstable");
                self.state.apply_boundary(delta)?;
                Ok(None)
            }
            Transition::Rolled { closed, delta } => {
                debug!(
                    sequence = closed.sequence,
                    key_path = %closed.sstable.key_path,
                    prefix = %closed.sstable.entity_names.sstable_name_prefix,
                    size = closed.sstable.size,
                    new_keyspace = delta.new_keyspace,
                    new_table = delta.new_table,
                    "sstable boundary"
                );
                self.state.apply_boundary(delta)?;
                Ok(Some(closed))
            }
        }
    }

    /// End of stream: close the last SSTable and hand back the totals.
    pub fn finish(mut self) -> Result<Finished, SizeOverflow> {
        let last = self.accumulator.finish();
        if let Some(closed) = &last {
            self.state
                .apply_boundary(BoundaryDelta::size_only(closed.sstable.size))?;
        }
        Ok(Finished {
            last,
            state: self.state,
            skipped_keys: self.skipped_keys,
        })
    }
}

/// What [`Cataloger::finish`] hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    /// The SSTable still open at end of stream.
    pub last: Option<ClosedSSTable>,
    pub state: MigrationGlobalState,
    pub skipped_keys: Vec<SkippedKey>,
}

impl Finished {
    fn into_catalog(self, mut sstables: Vec<ClosedSSTable>) -> Catalog {
        sstables.extend(self.last);
        Catalog {
            sstables,
            state: self.state,
            skipped_keys: self.skipped_keys,
        }
    }
}

/// Everything a full fold over a listing produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub sstables: Vec<ClosedSSTable>,
    pub state: MigrationGlobalState,
    pub skipped_keys: Vec<SkippedKey>,
}

/// Fold a complete, ordered listing in memory.
pub fn catalog<I, K>(
    entries: I,
    migration_id: &str,
    classifier: KeyClassifier,
    policy: MalformedKeyPolicy,
) -> Result<Catalog, CatalogError>
where
    I: IntoIterator<Item = (K, i64)>,
    K: AsRef<str>,
{
    let mut cataloger = Cataloger::new(migration_id, classifier, policy);
    let mut sstables = Vec::new();

    for (key, size) in entries {
        if let Some(closed) = cataloger.observe(key.as_ref(), size)? {
            sstables.push(closed);
        }
    }

    let finished = cataloger.finish()?;
    Ok(finished.into_catalog(sstables))
}
