// Descriptor Naming & Encoding
//
// Deterministic object keys and JSON bodies for the two kinds of
// descriptor a run writes. Writing the same key twice overwrites.

use crate::catalog::ClosedSSTable;
use crate::state::MigrationGlobalState;

/// Key of a per-SSTable descriptor:
/// `<descriptor prefix>/<seq>/<name prefix>-<seq>`.
pub fn sstable_descriptor_key(state: &MigrationGlobalState, closed: &ClosedSSTable) -> String {
    format!(
        "{}/{seq}/{}-{seq}",
        state.sstable_descriptor_key_prefix,
        closed.sstable.entity_names.sstable_name_prefix,
        seq = closed.sequence,
    )
}

/// Key of the global state descriptor: `<id>/globalState-<id>`.
pub fn global_state_descriptor_key(migration_id: &str) -> String {
    format!("{migration_id}/globalState-{migration_id}")
}

pub fn encode_sstable(closed: &ClosedSSTable) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&closed.sstable)
}

pub fn encode_global_state(state: &MigrationGlobalState) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SSTable;
    use crate::names::EntityNames;

    fn closed(sequence: u64, prefix: &str) -> ClosedSSTable {
        ClosedSSTable {
            sequence,
            sstable: SSTable {
                entity_names: EntityNames {
                    keyspace_name: "ks".into(),
                    cql_table_name: "t".into(),
                    sstable_name_prefix: prefix.into(),
                },
                size: 3,
                key_path: "ks/t-1/snap/s".into(),
                component_file_keys: vec!["ks/t-1/snap/s/nb-1-big-Data.db".into()],
            },
        }
    }

    #[test]
    fn sstable_key_embeds_sequence_twice() {
        let state = MigrationGlobalState::new("mig-7");

        assert_eq!(
            sstable_descriptor_key(&state, &closed(12, "nb-1-big")),
            "mig-7/UnitDescriptors/12/nb-1-big-12"
        );
    }

    #[test]
    fn global_state_key() {
        assert_eq!(global_state_descriptor_key("mig-7"), "mig-7/globalState-mig-7");
    }

    #[test]
    fn encoded_sstable_is_the_bare_descriptor() {
        let body = encode_sstable(&closed(1, "nb-1-big")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["size"], 3);
        assert_eq!(value["entityNames"]["ssTableNamePrefix"], "nb-1-big");
        assert!(value.get("sequence").is_none());
    }
}
