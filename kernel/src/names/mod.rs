// Entity Name Extraction
//
// Derives the logical identity of an SSTable component from the
// positional structure of its object key:
//
//   .../<keyspace>/<table>-<id>/<dir>/<dir>/<prefix>-<role>
//
// This module is pure and side-effect free.

use serde::{Deserialize, Serialize};

/// Minimum number of `/`-separated segments a component key must have.
pub const MIN_KEY_SEGMENTS: usize = 5;

/// Keyspace, table and SSTable name prefix of a component key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityNames {
    pub keyspace_name: String,
    pub cql_table_name: String,
    #[serde(rename = "ssTableNamePrefix")]
    pub sstable_name_prefix: String,
}

/// Structural problems with a component key.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("key `{key}` has {found} path segments, at least {} required", MIN_KEY_SEGMENTS)]
    TooFewSegments { key: String, found: usize },

    #[error("table segment `{segment}` of key `{key}` has no `-` delimiter")]
    MissingTableDelimiter { key: String, segment: String },

    #[error("file name `{segment}` of key `{key}` has no `-` delimiter")]
    MissingFileDelimiter { key: String, segment: String },
}

impl EntityNames {
    /// Parse the entity names out of a component key.
    pub fn parse(key: &str) -> Result<Self, KeyParseError> {
        let segments: Vec<&str> = key.split('/').collect();
        let n = segments.len();
        if n < MIN_KEY_SEGMENTS {
            return Err(KeyParseError::TooFewSegments {
                key: key.to_string(),
                found: n,
            });
        }

        let keyspace = segments[n - 5];
        let table_dir = segments[n - 4];
        let file_name = segments[n - 1];

        let table = before_last_hyphen(table_dir).ok_or_else(|| {
            KeyParseError::MissingTableDelimiter {
                key: key.to_string(),
                segment: table_dir.to_string(),
            }
        })?;
        let prefix = before_last_hyphen(file_name).ok_or_else(|| {
            KeyParseError::MissingFileDelimiter {
                key: key.to_string(),
                segment: file_name.to_string(),
            }
        })?;

        Ok(Self {
            keyspace_name: keyspace.to_string(),
            cql_table_name: table.to_string(),
            sstable_name_prefix: prefix.to_string(),
        })
    }
}

/// Everything before the last `/` of the key, or the empty string.
pub fn key_path(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => "",
    }
}

fn before_last_hyphen(segment: &str) -> Option<&str> {
    segment.rfind('-').map(|idx| &segment[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str =
        "backups/node1/inventory/products-1b255f4def2540a60000000000000005/snapshots/snap-1/nb-1-big-Data.db";

    #[test]
    fn parses_positional_names() {
        let names = EntityNames::parse(KEY).unwrap();

        assert_eq!(names.keyspace_name, "inventory");
        assert_eq!(names.cql_table_name, "products");
        assert_eq!(names.sstable_name_prefix, "nb-1-big");
    }

    #[test]
    fn table_name_keeps_inner_hyphens() {
        let names = EntityNames::parse("ks/my-wide-table-abc/s/t/la-7-Data.db").unwrap();

        assert_eq!(names.keyspace_name, "ks");
        assert_eq!(names.cql_table_name, "my-wide-table");
        assert_eq!(names.sstable_name_prefix, "la-7");
    }

    #[test]
    fn key_path_strips_file_name() {
        assert_eq!(
            key_path(KEY),
            "backups/node1/inventory/products-1b255f4def2540a60000000000000005/snapshots/snap-1"
        );
        assert_eq!(key_path("no-slash"), "");
    }

    #[test]
    fn too_few_segments_is_an_error() {
        let err = EntityNames::parse("tbl-1/snap/s/nb-1-Data.db").unwrap_err();

        assert_eq!(
            err,
            KeyParseError::TooFewSegments {
                key: "tbl-1/snap/s/nb-1-Data.db".into(),
                found: 4,
            }
        );
    }

    #[test]
    fn table_segment_without_hyphen_is_an_error() {
        let err = EntityNames::parse("ks/table/snap/s/nb-1-Data.db").unwrap_err();
        assert!(matches!(err, KeyParseError::MissingTableDelimiter { ref segment, .. } if segment == "table"));
    }

    #[test]
    fn file_name_without_hyphen_is_an_error() {
        let err = EntityNames::parse("ks/tbl-1/snap/s/TOC.txt").unwrap_err();
        assert!(matches!(err, KeyParseError::MissingFileDelimiter { .. }));
    }

    #[test]
    fn serializes_with_descriptor_field_names() {
        let names = EntityNames::parse(KEY).unwrap();
        let json = serde_json::to_value(&names).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "keyspaceName": "inventory",
                "cqlTableName": "products",
                "ssTableNamePrefix": "nb-1-big",
            })
        );
    }
}
