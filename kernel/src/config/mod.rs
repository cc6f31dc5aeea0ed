// Run Configuration
//
// Raw, optional inputs (flags or environment) are validated into a
// `RunConfig` before any I/O happens.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::catalog::MalformedKeyPolicy;
use crate::classify::KeyClassifier;
use crate::store::{ConfigMapTarget, DEFAULT_PAGE_SIZE};

/// Unvalidated configuration as supplied by the caller.
///
/// Empty strings are treated the same as missing values.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub profile_name: Option<String>,
    pub region: Option<String>,
    pub bucket_name: Option<String>,
    pub migration_id: Option<String>,
    pub config_map_name: Option<String>,
    pub config_map_namespace: Option<String>,
    pub page_size: Option<usize>,
    pub component_suffixes: Vec<String>,
    pub malformed_key_policy: MalformedKeyPolicy,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid credentials: specify both access key and secret key, or neither of them")]
    IncompleteKeyPair,

    #[error("missing credentials: specify access key and secret key, or the name of the profile to use")]
    MissingCredentials,

    #[error("missing mandatory parameter `{0}`")]
    Missing(&'static str),

    #[error("config map name and namespace must be given together (missing `{0}`)")]
    IncompleteConfigMap(&'static str),

    #[error("page size must be positive")]
    ZeroPageSize,

    #[error("migration id `{0}` must be a single key segment (no `/`, `\\`, `.` or `..`)")]
    InvalidMigrationId(String),
}

/// How the object store client authenticates.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Credentials {
    Static {
        access_key: String,
        #[serde(skip)]
        secret_key: String,
    },
    Profile {
        name: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
            Credentials::Profile { name } => f.debug_struct("Profile").field("name", name).finish(),
        }
    }
}

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub credentials: Credentials,
    pub region: String,
    pub bucket_name: String,
    pub migration_id: String,
    pub config_map: Option<ConfigMapTarget>,
    pub page_size: usize,
    pub classifier: KeyClassifier,
    pub malformed_key_policy: MalformedKeyPolicy,
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // secret key is skipped by the serializer
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl RawConfig {
    pub fn validate(self) -> Result<RunConfig, ConfigError> {
        let access_key = present(self.access_key);
        let secret_key = present(self.secret_key);
        let profile_name = present(self.profile_name);

        let credentials = match (access_key, secret_key, profile_name) {
            (Some(access_key), Some(secret_key), profile) => {
                if profile.is_some() {
                    warn!("profile name ignored: access key and secret key take precedence");
                }
                Credentials::Static {
                    access_key,
                    secret_key,
                }
            }
            (Some(_), None, _) | (None, Some(_), _) => return Err(ConfigError::IncompleteKeyPair),
            (None, None, Some(name)) => Credentials::Profile { name },
            (None, None, None) => return Err(ConfigError::MissingCredentials),
        };

        let region = present(self.region).ok_or(ConfigError::Missing("region"))?;
        let bucket_name = present(self.bucket_name).ok_or(ConfigError::Missing("bucket name"))?;
        let migration_id =
            present(self.migration_id).ok_or(ConfigError::Missing("migration id"))?;
        // the id is the first segment of every descriptor key
        if migration_id == "."
            || migration_id == ".."
            || migration_id.contains(['/', '\\'])
        {
            return Err(ConfigError::InvalidMigrationId(migration_id));
        }

        let config_map = match (
            present(self.config_map_name),
            present(self.config_map_namespace),
        ) {
            (Some(name), Some(namespace)) => Some(ConfigMapTarget { namespace, name }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::IncompleteConfigMap("namespace")),
            (None, Some(_)) => return Err(ConfigError::IncompleteConfigMap("name")),
        };

        let page_size = match self.page_size {
            None => DEFAULT_PAGE_SIZE,
            Some(0) => return Err(ConfigError::ZeroPageSize),
            Some(n) => n,
        };

        let classifier = if self.component_suffixes.is_empty() {
            KeyClassifier::default()
        } else {
            KeyClassifier::new(self.component_suffixes)
        };

        Ok(RunConfig {
            credentials,
            region,
            bucket_name,
            migration_id,
            config_map,
            page_size,
            classifier,
            malformed_key_policy: self.malformed_key_policy,
        })
    }
}
