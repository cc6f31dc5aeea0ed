// Component File Classification
//
// Decides which object keys belong to an SSTable by looking at the
// file role encoded after the last `-` of the key.

use serde::{Deserialize, Serialize};

/// File roles recognised by default, one per SSTable component.
pub const DEFAULT_COMPONENT_SUFFIXES: [&str; 8] = [
    "CompressionInfo.db",
    "Data.db",
    "Digest.crc32",
    "Filter.db",
    "Partitions.db",
    "Rows.db",
    "Statistics.db",
    "TOC.txt",
];

/// Suffix allow-list used to filter the object listing.
///
/// Keys that do not match are not an error: they are simply not
/// part of any SSTable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyClassifier {
    suffixes: Vec<String>,
}

impl KeyClassifier {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suffixes: suffixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Is `key` a component file of some SSTable?
    ///
    /// A key without any `-` is compared as a whole.
    pub fn is_component_file(&self, key: &str) -> bool {
        let suffix = match key.rfind('-') {
            Some(idx) => &key[idx + 1..],
            None => key,
        };
        self.suffixes.iter().any(|s| s == suffix)
    }
}

impl Default for KeyClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_COMPONENT_SUFFIXES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_suffixes_are_recognised() {
        let classifier = KeyClassifier::default();

        for suffix in DEFAULT_COMPONENT_SUFFIXES {
            let key = format!("ks/tbl-1/snapshots/snap/nb-1-big-{suffix}");
            assert!(classifier.is_component_file(&key), "{key}");
        }
    }

    #[test]
    fn unknown_suffix_is_filtered_out() {
        let classifier = KeyClassifier::default();

        assert!(!classifier.is_component_file("ks/tbl-1/snap/s/nb-1-big-Index.db"));
        assert!(!classifier.is_component_file("ks/tbl-1/snap/s/manifest.json"));
        // suffix match must be exact, not a substring
        assert!(!classifier.is_component_file("ks/tbl-1/snap/s/nb-1-big-xData.db"));
    }

    #[test]
    fn key_without_hyphen_is_compared_whole() {
        let classifier = KeyClassifier::default();

        assert!(classifier.is_component_file("TOC.txt"));
        assert!(!classifier.is_component_file("dir/TOC.txt"));
    }

    #[test]
    fn custom_allow_list_replaces_defaults() {
        let classifier = KeyClassifier::new(["Index.db"]);

        assert!(classifier.is_component_file("a/b-1/c/d/la-1-big-Index.db"));
        assert!(!classifier.is_component_file("a/b-1/c/d/la-1-big-Data.db"));
    }
}
