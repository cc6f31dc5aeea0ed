// Filesystem Collaborators
//
// A local directory stands in for the object store bucket: object keys
// are `/`-joined paths relative to the bucket directory, listed in
// lexicographic order like an object-store listing.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{
    ConfigMapError, ConfigMapPublisher, ConfigMapTarget, DescriptorStore, ListingError,
    ObjectEntry, ObjectLister, PersistError,
};

/// Lists every regular file below a bucket directory.
#[derive(Debug)]
pub struct FsLister {
    root: PathBuf,
    page_size: usize,
    entries: Option<std::vec::IntoIter<ObjectEntry>>,
}

impl FsLister {
    pub fn new(root: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            root: root.into(),
            page_size: page_size.max(1),
            entries: None,
        }
    }

    fn scan(&self) -> Result<Vec<ObjectEntry>, ListingError> {
        let mut entries = Vec::new();
        walk(&self.root, &self.root, &mut entries)?;
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(root = %self.root.display(), objects = entries.len(), "scanned bucket directory");
        Ok(entries)
    }
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<ObjectEntry>) -> Result<(), ListingError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ListingError::Io { path, source }
    };

    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(io_err(&path))?;

        if file_type.is_dir() {
            walk(root, &path, out)?;
        } else if file_type.is_file() {
            let len = entry.metadata().map_err(io_err(&path))?.len();
            out.push(ObjectEntry {
                size: object_size(&path, len)?,
                key: object_key(root, &path)?,
            });
        }
    }
    Ok(())
}

fn object_size(path: &Path, len: u64) -> Result<i64, ListingError> {
    i64::try_from(len).map_err(|_| ListingError::OversizedObject {
        path: path.to_path_buf(),
        size: len,
    })
}

fn object_key(root: &Path, path: &Path) -> Result<String, ListingError> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .ok_or_else(|| ListingError::NonUtf8Key(path.to_path_buf()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("/"))
}

impl ObjectLister for FsLister {
    fn next_page(&mut self) -> Result<Option<Vec<ObjectEntry>>, ListingError> {
        if self.entries.is_none() {
            self.entries = Some(self.scan()?.into_iter());
        }
        let page: Vec<ObjectEntry> = match self.entries.as_mut() {
            Some(entries) => entries.by_ref().take(self.page_size).collect(),
            None => Vec::new(),
        };
        Ok(if page.is_empty() { None } else { Some(page) })
    }
}

/// Writes descriptors as files below a root directory.
#[derive(Debug, Clone)]
pub struct FsDescriptorStore {
    root: PathBuf,
}

impl FsDescriptorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File a key is written to. Keys never leave the root: empty,
    /// `.`, `..` and backslashed segments are rejected.
    pub fn path_of(&self, key: &str) -> Result<PathBuf, PersistError> {
        let mut path = self.root.clone();
        for part in key.split('/') {
            if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
                return Err(PersistError::InvalidKey {
                    key: key.to_string(),
                });
            }
            path.push(part);
        }
        Ok(path)
    }
}

impl DescriptorStore for FsDescriptorStore {
    fn put(&mut self, key: &str, body: &[u8]) -> Result<String, PersistError> {
        let path = self.path_of(key)?;
        let io_err = |source| PersistError::Io {
            key: key.to_string(),
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&path, body).map_err(io_err)?;

        Ok(path.display().to_string())
    }
}

/// Config maps stored as `<root>/<namespace>/<name>.json` string maps.
#[derive(Debug, Clone)]
pub struct FsConfigMaps {
    root: PathBuf,
}

impl FsConfigMaps {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, target: &ConfigMapTarget) -> PathBuf {
        self.root
            .join(&target.namespace)
            .join(format!("{}.json", target.name))
    }

    pub fn read(&self, target: &ConfigMapTarget) -> Result<BTreeMap<String, String>, ConfigMapError> {
        let path = self.path_of(target);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigMapError::NotFound(target.clone()))
            }
            Err(source) => return Err(ConfigMapError::Io { path, source }),
        };
        serde_json::from_slice(&data).map_err(|source| ConfigMapError::Malformed { path, source })
    }
}

impl ConfigMapPublisher for FsConfigMaps {
    fn update(
        &mut self,
        target: &ConfigMapTarget,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), ConfigMapError> {
        let mut map = self.read(target)?;
        map.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));

        let path = self.path_of(target);
        let body = serde_json::to_vec_pretty(&map).map_err(|source| ConfigMapError::Malformed {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, body).map_err(|source| ConfigMapError::Io { path, source })
    }
}
