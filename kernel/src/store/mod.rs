// External Collaborators
//
// The run talks to three outside systems through these traits:
// - an object listing, delivered page by page in key order
// - a descriptor store accepting overwriting puts
// - an optional key/value config map
//
// In-memory implementations live here; filesystem-backed ones in `fs`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod fs;

pub use fs::{FsConfigMaps, FsDescriptorStore, FsLister};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// One object of the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, size: i64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// Coordinates of an external config map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigMapTarget {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object path {0} is not valid UTF-8")]
    NonUtf8Key(PathBuf),

    #[error("object {path} is {size} bytes, more than a signed 64-bit size holds")]
    OversizedObject { path: PathBuf, size: u64 },

    #[error("listing backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write descriptor `{key}` to {path}: {source}")]
    Io {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("descriptor store rejected `{key}`: {reason}")]
    Backend { key: String, reason: String },

    #[error("descriptor key `{key}` has an empty, `.`, `..` or backslashed segment")]
    InvalidKey { key: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigMapError {
    #[error("config map {}/{} does not exist", .0.namespace, .0.name)]
    NotFound(ConfigMapTarget),

    #[error("failed to access config map file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config map file {path} is not a string map: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Paginated source of object keys.
///
/// Implementations MUST deliver keys in a stable order in which all
/// components of one SSTable are adjacent (lexicographic key order
/// satisfies this). Grouping relies on it.
pub trait ObjectLister {
    /// Fetch the next page; `None` once the listing is exhausted.
    fn next_page(&mut self) -> Result<Option<Vec<ObjectEntry>>, ListingError>;
}

/// Durable home of descriptor documents.
///
/// `put` on an existing key replaces the previous body entirely.
pub trait DescriptorStore {
    /// Store `body` under `key` and return its location.
    fn put(&mut self, key: &str, body: &[u8]) -> Result<String, PersistError>;
}

/// Key/value map mirrored with run summary fields.
pub trait ConfigMapPublisher {
    /// Set `entries` on an existing map, leaving other keys untouched.
    fn update(
        &mut self,
        target: &ConfigMapTarget,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), ConfigMapError>;
}

/// Lists a fixed set of entries in the order given.
#[derive(Debug)]
pub struct InMemoryLister {
    entries: std::vec::IntoIter<ObjectEntry>,
    page_size: usize,
}

impl InMemoryLister {
    pub fn new(entries: Vec<ObjectEntry>, page_size: usize) -> Self {
        Self {
            entries: entries.into_iter(),
            page_size: page_size.max(1),
        }
    }
}

impl ObjectLister for InMemoryLister {
    fn next_page(&mut self) -> Result<Option<Vec<ObjectEntry>>, ListingError> {
        let page: Vec<ObjectEntry> = self.entries.by_ref().take(self.page_size).collect();
        Ok(if page.is_empty() { None } else { Some(page) })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: BTreeMap<String, Vec<u8>>,
    puts: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.objects.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of `put` calls, overwrites included.
    pub fn put_count(&self) -> usize {
        self.puts
    }
}

impl DescriptorStore for InMemoryStore {
    fn put(&mut self, key: &str, body: &[u8]) -> Result<String, PersistError> {
        self.objects.insert(key.to_string(), body.to_vec());
        self.puts += 1;
        Ok(format!("memory://{key}"))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryConfigMaps {
    maps: BTreeMap<ConfigMapTarget, BTreeMap<String, String>>,
}

impl InMemoryConfigMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty map so that it can be updated.
    pub fn create(&mut self, target: ConfigMapTarget) {
        self.maps.entry(target).or_default();
    }

    pub fn get(&self, target: &ConfigMapTarget) -> Option<&BTreeMap<String, String>> {
        self.maps.get(target)
    }
}

impl ConfigMapPublisher for InMemoryConfigMaps {
    fn update(
        &mut self,
        target: &ConfigMapTarget,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), ConfigMapError> {
        let map = self
            .maps
            .get_mut(target)
            .ok_or_else(|| ConfigMapError::NotFound(target.clone()))?;
        map.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ConfigMapTarget {
        ConfigMapTarget {
            namespace: "migrations".into(),
            name: "state".into(),
        }
    }

    #[test]
    fn lister_pages_in_order() {
        let entries: Vec<_> = (0..5).map(|i| ObjectEntry::new(format!("k{i}"), i)).collect();
        let mut lister = InMemoryLister::new(entries, 2);

        let sizes: Vec<usize> = std::iter::from_fn(|| lister.next_page().unwrap())
            .map(|page| page.len())
            .collect();

        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(lister.next_page().unwrap().is_none());
    }

    #[test]
    fn put_overwrites_instead_of_merging() {
        let mut store = InMemoryStore::new();

        store.put("m/globalState-m", br#"{"a":1,"b":2}"#).unwrap();
        store.put("m/globalState-m", br#"{"a":3}"#).unwrap();

        assert_eq!(store.get("m/globalState-m"), Some(&br#"{"a":3}"#[..]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.put_count(), 2);
    }

    #[test]
    fn config_map_update_requires_existing_map() {
        let mut maps = InMemoryConfigMaps::new();
        let entries = BTreeMap::from([("k".to_string(), "v".to_string())]);

        let err = maps.update(&target(), &entries).unwrap_err();
        assert!(matches!(err, ConfigMapError::NotFound(_)));

        maps.create(target());
        maps.update(&target(), &entries).unwrap();
        assert_eq!(maps.get(&target()).unwrap()["k"], "v");
    }

    #[test]
    fn config_map_update_keeps_other_entries() {
        let mut maps = InMemoryConfigMaps::new();
        maps.create(target());
        maps.update(&target(), &BTreeMap::from([("old".into(), "1".into())]))
            .unwrap();

        maps.update(&target(), &BTreeMap::from([("new".into(), "2".into())]))
            .unwrap();

        let map = maps.get(&target()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["old"], "1");
    }
}
