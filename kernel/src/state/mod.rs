// Migration Global State
//
// Run-wide counters driven by the SSTable accumulator's boundary
// events. Counters only ever grow.

use serde::{Deserialize, Serialize};

/// Directory under the migration id holding the SSTable descriptors.
pub const SSTABLE_DESCRIPTOR_DIR: &str = "UnitDescriptors";

/// A running byte total left the range of `i64`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("byte total overflows i64: {total} + {delta}")]
pub struct SizeOverflow {
    pub total: i64,
    pub delta: i64,
}

/// `total + delta`, or the overflow as an error.
pub fn add_size(total: i64, delta: i64) -> Result<i64, SizeOverflow> {
    total
        .checked_add(delta)
        .ok_or(SizeOverflow { total, delta })
}

/// Counter increments produced by one boundary event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundaryDelta {
    pub new_keyspace: bool,
    pub new_table: bool,
    pub new_sstable: bool,
    pub size_delta: i64,
}

impl BoundaryDelta {
    /// Delta of the very first SSTable of a run.
    pub fn first() -> Self {
        Self {
            new_keyspace: true,
            new_table: true,
            new_sstable: true,
            size_delta: 0,
        }
    }

    /// Delta applied when the stream ends with an open SSTable.
    pub fn size_only(size_delta: i64) -> Self {
        Self {
            size_delta,
            ..Self::default()
        }
    }
}

/// Aggregate state of a migration, persisted once at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationGlobalState {
    pub migration_id: String,
    pub keyspace_count: u64,
    pub cql_table_count: u64,
    #[serde(rename = "ssTableCount")]
    pub sstable_count: u64,
    pub data_size: i64,
    #[serde(rename = "ssTableDescriptorKeyPrefix")]
    pub sstable_descriptor_key_prefix: String,
}

impl MigrationGlobalState {
    pub fn new(migration_id: impl Into<String>) -> Self {
        let migration_id = migration_id.into();
        let sstable_descriptor_key_prefix = format!("{migration_id}/{SSTABLE_DESCRIPTOR_DIR}");
        Self {
            migration_id,
            keyspace_count: 0,
            cql_table_count: 0,
            sstable_count: 0,
            data_size: 0,
            sstable_descriptor_key_prefix,
        }
    }

    /// Applies one boundary event. On overflow the state is left untouched.
    pub fn apply_boundary(&mut self, delta: BoundaryDelta) -> Result<(), SizeOverflow> {
        let data_size = add_size(self.data_size, delta.size_delta)?;
        if delta.new_keyspace {
            self.keyspace_count += 1;
        }
        if delta.new_table {
            self.cql_table_count += 1;
        }
        if delta.new_sstable {
            self.sstable_count += 1;
        }
        self.data_size = data_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_zeroed() {
        let state = MigrationGlobalState::new("m1");

        assert_eq!(state.keyspace_count, 0);
        assert_eq!(state.cql_table_count, 0);
        assert_eq!(state.sstable_count, 0);
        assert_eq!(state.data_size, 0);
        assert_eq!(state.sstable_descriptor_key_prefix, "m1/UnitDescriptors");
    }

    #[test]
    fn flags_increment_independently() {
        let mut state = MigrationGlobalState::new("m1");

        state.apply_boundary(BoundaryDelta::first()).unwrap();
        state
            .apply_boundary(BoundaryDelta {
                new_keyspace: false,
                new_table: true,
                new_sstable: true,
                size_delta: 40,
            })
            .unwrap();
        state.apply_boundary(BoundaryDelta::size_only(2)).unwrap();

        assert_eq!(state.keyspace_count, 1);
        assert_eq!(state.cql_table_count, 2);
        assert_eq!(state.sstable_count, 2);
        assert_eq!(state.data_size, 42);
    }

    #[test]
    fn data_size_overflow_leaves_state_untouched() {
        let mut state = MigrationGlobalState::new("m1");
        state.apply_boundary(BoundaryDelta::first()).unwrap();
        state.apply_boundary(BoundaryDelta::size_only(i64::MAX)).unwrap();
        let before = state.clone();

        let err = state
            .apply_boundary(BoundaryDelta {
                new_sstable: true,
                size_delta: 1,
                ..BoundaryDelta::default()
            })
            .unwrap_err();

        assert_eq!(
            err,
            SizeOverflow {
                total: i64::MAX,
                delta: 1
            }
        );
        assert_eq!(state, before);
    }

    #[test]
    fn serializes_with_descriptor_field_names() {
        let mut state = MigrationGlobalState::new("m1");
        state.apply_boundary(BoundaryDelta::first()).unwrap();

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "migrationId": "m1",
                "keyspaceCount": 1,
                "cqlTableCount": 1,
                "ssTableCount": 1,
                "dataSize": 0,
                "ssTableDescriptorKeyPrefix": "m1/UnitDescriptors",
            })
        );
    }
}
