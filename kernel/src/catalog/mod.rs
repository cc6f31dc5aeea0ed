// SSTable Accumulator
//
// Groups classified component keys into SSTables. Keys arrive in
// listing order and a key only ever joins the most recently opened
// SSTable: grouping is contiguous, not content-keyed. Two runs of
// the same (key path, name prefix) separated by another SSTable are
// two SSTables.

use serde::{Deserialize, Serialize};

use crate::names::EntityNames;
use crate::state::{add_size, BoundaryDelta, SizeOverflow};

pub mod fold;

pub use fold::{
    catalog, Catalog, CatalogError, Cataloger, Finished, MalformedKeyPolicy, SkippedKey,
};

/// A logical SSTable reconstructed from its component object keys.
///
/// Serializes to the per-SSTable descriptor document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SSTable {
    pub entity_names: EntityNames,
    pub size: i64,
    pub key_path: String,
    pub component_file_keys: Vec<String>,
}

impl SSTable {
    fn open(entity_names: EntityNames, key_path: &str) -> Self {
        Self {
            entity_names,
            size: 0,
            key_path: key_path.to_string(),
            component_file_keys: Vec::new(),
        }
    }

    fn add_component(&mut self, key: String, size: i64) -> Result<(), SizeOverflow> {
        self.size = add_size(self.size, size)?;
        self.component_file_keys.push(key);
        Ok(())
    }

    fn is_same_sstable(&self, key_path: &str, names: &EntityNames) -> bool {
        self.key_path == key_path
            && self.entity_names.sstable_name_prefix == names.sstable_name_prefix
    }
}

/// An SSTable that will receive no more components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSSTable {
    /// Position in close order, starting at 1.
    pub sequence: u64,
    pub sstable: SSTable,
}

/// Outcome of feeding one component key to the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The key joined the open SSTable.
    Appended,

    /// The first SSTable of the stream was opened.
    Opened(BoundaryDelta),

    /// The open SSTable was closed and a new one opened with the key.
    Rolled {
        closed: ClosedSSTable,
        delta: BoundaryDelta,
    },
}

/// Two-state machine: empty until the first component arrives,
/// then always holding exactly one open SSTable until `finish`.
#[derive(Debug, Default)]
pub struct SSTableAccumulator {
    open: Option<SSTable>,
    closed: u64,
}

impl SSTableAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_none()
    }

    /// Number of SSTables closed so far.
    pub fn closed_count(&self) -> u64 {
        self.closed
    }

    /// Feed one classified component key. A key whose size would
    /// overflow the open SSTable's total is rejected and the open
    /// SSTable is kept as it was.
    pub fn push(
        &mut self,
        names: EntityNames,
        key_path: &str,
        key: String,
        size: i64,
    ) -> Result<Transition, SizeOverflow> {
        match self.open.take() {
            None => {
                let mut sstable = SSTable::open(names, key_path);
                sstable.add_component(key, size)?;
                self.open = Some(sstable);
                Ok(Transition::Opened(BoundaryDelta::first()))
            }
            Some(mut current) if current.is_same_sstable(key_path, &names) => {
                let added = current.add_component(key, size);
                self.open = Some(current);
                added.map(|()| Transition::Appended)
            }
            Some(current) => {
                let delta = BoundaryDelta {
                    new_keyspace: current.entity_names.keyspace_name != names.keyspace_name,
                    new_table: current.entity_names.cql_table_name != names.cql_table_name,
                    // every boundary starts a distinct SSTable, even when only
                    // the key path changed
                    new_sstable: true,
                    size_delta: current.size,
                };
                let mut next = SSTable::open(names, key_path);
                if let Err(err) = next.add_component(key, size) {
                    self.open = Some(current);
                    return Err(err);
                }
                let closed = self.close(current);
                self.open = Some(next);

                Ok(Transition::Rolled { closed, delta })
            }
        }
    }

    /// Close the open SSTable at end of stream, if there is one.
    pub fn finish(&mut self) -> Option<ClosedSSTable> {
        self.open.take().map(|sstable| self.close(sstable))
    }

    fn close(&mut self, sstable: SSTable) -> ClosedSSTable {
        self.closed += 1;
        ClosedSSTable {
            sequence: self.closed,
            sstable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::key_path;

    fn push(acc: &mut SSTableAccumulator, key: &str, size: i64) -> Transition {
        let names = EntityNames::parse(key).unwrap();
        acc.push(names, key_path(key), key.to_string(), size).unwrap()
    }

    #[test]
    fn first_key_opens_with_all_flags_and_no_size() {
        let mut acc = SSTableAccumulator::new();
        assert!(acc.is_empty());

        let t = push(&mut acc, "ks/t-1/snap/s/nb-1-Data.db", 100);

        assert_eq!(t, Transition::Opened(BoundaryDelta::first()));
        assert!(!acc.is_empty());
    }

    #[test]
    fn matching_keys_append_without_event() {
        let mut acc = SSTableAccumulator::new();
        push(&mut acc, "ks/t-1/snap/s/nb-1-Data.db", 100);

        let t = push(&mut acc, "ks/t-1/snap/s/nb-1-TOC.txt", 5);
        assert_eq!(t, Transition::Appended);

        let closed = acc.finish().unwrap();
        assert_eq!(closed.sequence, 1);
        assert_eq!(closed.sstable.size, 105);
        assert_eq!(
            closed.sstable.component_file_keys,
            vec!["ks/t-1/snap/s/nb-1-Data.db", "ks/t-1/snap/s/nb-1-TOC.txt"]
        );
        assert_eq!(closed.sstable.key_path, "ks/t-1/snap/s");
    }

    #[test]
    fn boundary_closes_and_reports_changed_names() {
        let mut acc = SSTableAccumulator::new();
        push(&mut acc, "ks/t-1/snap/s/nb-1-Data.db", 100);

        let t = push(&mut acc, "ks/u-1/snap/s/nb-1-Data.db", 7);

        match t {
            Transition::Rolled { closed, delta } => {
                assert_eq!(closed.sequence, 1);
                assert_eq!(closed.sstable.entity_names.cql_table_name, "t");
                assert_eq!(
                    delta,
                    BoundaryDelta {
                        new_keyspace: false,
                        new_table: true,
                        new_sstable: true,
                        size_delta: 100,
                    }
                );
            }
            other => panic!("expected roll, got {other:?}"),
        }

        let last = acc.finish().unwrap();
        assert_eq!(last.sequence, 2);
        assert_eq!(last.sstable.size, 7);
    }

    #[test]
    fn oversized_component_keeps_open_sstable_intact() {
        let mut acc = SSTableAccumulator::new();
        push(&mut acc, "ks/t-1/snap/s/nb-1-Data.db", i64::MAX);

        let key = "ks/t-1/snap/s/nb-1-TOC.txt";
        let names = EntityNames::parse(key).unwrap();
        let err = acc
            .push(names, key_path(key), key.to_string(), 1)
            .unwrap_err();
        assert_eq!(
            err,
            SizeOverflow {
                total: i64::MAX,
                delta: 1
            }
        );

        let closed = acc.finish().unwrap();
        assert_eq!(closed.sstable.size, i64::MAX);
        assert_eq!(closed.sstable.component_file_keys.len(), 1);
    }

    #[test]
    fn finish_on_empty_accumulator_yields_nothing() {
        let mut acc = SSTableAccumulator::new();
        assert!(acc.finish().is_none());
        assert_eq!(acc.closed_count(), 0);
    }

    #[test]
    fn finish_closes_exactly_once() {
        let mut acc = SSTableAccumulator::new();
        push(&mut acc, "ks/t-1/snap/s/nb-1-Data.db", 1);

        assert!(acc.finish().is_some());
        assert!(acc.finish().is_none());
        assert_eq!(acc.closed_count(), 1);
    }

    #[test]
    fn serializes_as_descriptor() {
        let mut acc = SSTableAccumulator::new();
        push(&mut acc, "ks/t-1/snap/s/nb-1-Data.db", 10);
        let closed = acc.finish().unwrap();

        let json = serde_json::to_value(&closed.sstable).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "entityNames": {
                    "keyspaceName": "ks",
                    "cqlTableName": "t",
                    "ssTableNamePrefix": "nb-1",
                },
                "size": 10,
                "keyPath": "ks/t-1/snap/s",
                "componentFileKeys": ["ks/t-1/snap/s/nb-1-Data.db"],
            })
        );
    }
}
