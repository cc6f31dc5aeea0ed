use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sstcat_kernel::catalog::MalformedKeyPolicy;
use sstcat_kernel::config::RawConfig;
use sstcat_kernel::format::format_size;
use sstcat_kernel::run::{run_migration, RunReport};
use sstcat_kernel::store::{FsConfigMaps, FsDescriptorStore, FsLister};

/// SSTable descriptor cataloguer
#[derive(Parser, Debug)]
#[command(name = "sstcat")]
#[command(
    about = "Rebuild SSTables from a bucket listing and write their migration descriptors",
    long_about = None
)]
struct Cli {
    /// Access key; requires a secret key as well
    #[arg(long, env = "MBA_ACCESS_KEY", hide_env_values = true)]
    access_key: Option<String>,

    /// Secret key; requires an access key as well
    #[arg(long, env = "MBA_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Credentials profile, ignored when a key pair is given
    #[arg(long, env = "MBA_PROFILE_NAME")]
    profile_name: Option<String>,

    /// Region of the bucket
    #[arg(long, env = "MBA_REGION")]
    region: Option<String>,

    /// Bucket to catalogue, a directory below --store-root
    #[arg(long, env = "MBA_BUCKET_NAME")]
    bucket_name: Option<String>,

    /// Identifier of this migration
    #[arg(long, env = "MBA_MIGRATION_ID")]
    migration_id: Option<String>,

    /// Config map to mirror the summary into (needs a namespace too)
    #[arg(long, env = "MBA_K8S_CONFIG_MAP_NAME")]
    config_map_name: Option<String>,

    /// Namespace of the config map (needs a name too)
    #[arg(long, env = "MBA_K8S_CONFIG_MAP_NAMESPACE")]
    config_map_namespace: Option<String>,

    /// Directory holding one directory per bucket
    #[arg(long, env = "MBA_STORE_ROOT", default_value = ".")]
    store_root: PathBuf,

    /// Where descriptors are written (defaults to the bucket directory)
    #[arg(long, env = "MBA_DESCRIPTOR_ROOT")]
    descriptor_root: Option<PathBuf>,

    /// Directory holding config maps as <namespace>/<name>.json
    #[arg(long, env = "MBA_CONFIG_MAP_ROOT", default_value = "configmaps")]
    config_map_root: PathBuf,

    /// Number of keys fetched per listing page
    #[arg(long, env = "MBA_PAGE_SIZE")]
    page_size: Option<usize>,

    /// Component file suffix to recognise; repeat to replace the defaults
    #[arg(long = "component-suffix", value_name = "SUFFIX")]
    component_suffixes: Vec<String>,

    /// What to do with component keys that do not parse
    #[arg(long, value_enum, default_value_t = OnMalformedKey::Abort)]
    on_malformed_key: OnMalformedKey,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnMalformedKey {
    Abort,
    Skip,
}

impl From<OnMalformedKey> for MalformedKeyPolicy {
    fn from(value: OnMalformedKey) -> Self {
        match value {
            OnMalformedKey::Abort => MalformedKeyPolicy::Abort,
            OnMalformedKey::Skip => MalformedKeyPolicy::Skip,
        }
    }
}

/// Wrapper for JSON output
#[derive(Debug, Serialize)]
struct CliOutput<'a> {
    formatted_data_size: String,
    #[serde(flatten)]
    report: &'a RunReport,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).context("invalid --log-level")?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    // ----------------------------
    // Validate configuration
    // ----------------------------
    let config = RawConfig {
        access_key: cli.access_key,
        secret_key: cli.secret_key,
        profile_name: cli.profile_name,
        region: cli.region,
        bucket_name: cli.bucket_name,
        migration_id: cli.migration_id,
        config_map_name: cli.config_map_name,
        config_map_namespace: cli.config_map_namespace,
        page_size: cli.page_size,
        component_suffixes: cli.component_suffixes,
        malformed_key_policy: cli.on_malformed_key.into(),
    }
    .validate()
    .context("input parameter validation error")?;
    info!(%config, "parsed configuration");

    if config.config_map.is_none() {
        warn!("no config map specified: the migration global state will not be written to any config map");
    }

    // ----------------------------
    // Collaborators
    // ----------------------------
    let bucket_dir = cli.store_root.join(&config.bucket_name);
    let descriptor_root = cli.descriptor_root.unwrap_or_else(|| bucket_dir.clone());

    let mut lister = FsLister::new(&bucket_dir, config.page_size);
    let mut store = FsDescriptorStore::new(descriptor_root);
    let mut config_maps = FsConfigMaps::new(cli.config_map_root);

    // ----------------------------
    // Run
    // ----------------------------
    let report = run_migration(&config, &mut lister, &mut store, &mut config_maps)
        .context("error while creating the sstable and global descriptors")?;

    // ----------------------------
    // Output
    // ----------------------------
    let output = CliOutput {
        formatted_data_size: format_size(report.global_state.data_size),
        report: &report,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
