//! Configuration model for the metafs indexer.
//!
//! Configuration is loaded from a YAML file selected by profile
//! (`config.loc.yaml`, `config.mainnet.yaml`, `config.testnet.yaml`).
//! Everything has a default so a minimal file only needs its `chains` list.

pub mod constants;

use clap::ValueEnum;
use metafs_types::ChainKind;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Deployment profile. Selects which YAML file is loaded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Loc,
    Mainnet,
    Testnet,
}

impl Profile {
    pub fn file_name(&self) -> &'static str {
        match self {
            Profile::Loc => "config.loc.yaml",
            Profile::Mainnet => "config.mainnet.yaml",
            Profile::Testnet => "config.testnet.yaml",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Profile::Loc => "loc",
            Profile::Mainnet => "mainnet",
            Profile::Testnet => "testnet",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub indexer: IndexerSection,
    #[serde(default)]
    pub chains: Vec<ChainEntry>,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub redis: RedisSection,
}

/// One entry per ingested chain. Presence of at least one entry selects
/// multi-chain mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainEntry {
    pub name: ChainKind,
    pub rpc_url: String,
    #[serde(default)]
    pub rpc_user: String,
    #[serde(default)]
    pub rpc_pass: String,
    /// Overrides the stored sync cursor and the compiled-in default.
    pub start_height: Option<u64>,
    #[serde(default)]
    pub zmq_enabled: bool,
    pub zmq_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexerSection {
    /// Scanner poll interval in seconds.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    /// Global start-height override, used when a chain lacks its own.
    pub start_height: Option<u64>,
    pub btc_init_block_height: Option<u64>,
    pub mvc_init_block_height: Option<u64>,
    pub doge_init_block_height: Option<u64>,
    #[serde(default = "default_true")]
    pub time_ordering_enabled: bool,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Maximum queue slots a single chain may hold. Defaults to 70% of
    /// `max_queue_size`, rounded.
    pub per_chain_quota: Option<usize>,
    #[serde(default = "default_escape_window")]
    pub escape_window: usize,
}

impl IndexerSection {
    /// Initial height for a chain when no sync status exists yet and no
    /// per-chain `start_height` was given.
    pub fn init_height(&self, chain: ChainKind) -> u64 {
        let configured = match chain {
            ChainKind::Btc => self.btc_init_block_height,
            ChainKind::Mvc => self.mvc_init_block_height,
            ChainKind::Doge => self.doge_init_block_height,
        };
        configured.or(self.start_height).unwrap_or(match chain {
            ChainKind::Btc => constants::DEFAULT_BTC_INIT_HEIGHT,
            ChainKind::Mvc => constants::DEFAULT_MVC_INIT_HEIGHT,
            ChainKind::Doge => constants::DEFAULT_DOGE_INIT_HEIGHT,
        })
    }

    pub fn effective_quota(&self) -> usize {
        self.per_chain_quota.unwrap_or_else(|| {
            ((self.max_queue_size as f64) * constants::PER_CHAIN_QUOTA_RATIO).round() as usize
        })
    }
}

impl Default for IndexerSection {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            start_height: None,
            btc_init_block_height: None,
            mvc_init_block_height: None,
            doge_init_block_height: None,
            time_ordering_enabled: true,
            max_queue_size: default_max_queue_size(),
            per_chain_quota: None,
            escape_window: default_escape_window(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IndexerBackend {
    /// Embedded LSM store, one database per collection.
    #[default]
    Rocksdb,
    /// External relational backend. Not served by this codebase; selecting
    /// it is a configuration error here.
    Mysql,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    #[serde(default)]
    pub indexer_type: IndexerBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            indexer_type: IndexerBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Oss,
    S3,
    Minio,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(rename = "type", default)]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Public domain used by the query layer to compose URLs for object
    /// storage backends.
    pub oss_domain: Option<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_storage_root(),
            oss_domain: None,
        }
    }
}

/// Optional external cache for hot user-info reads. Parsed for profile
/// completeness; the core itself has no consumer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u32,
    #[serde(default)]
    pub password: String,
    /// Seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: String::new(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

impl AppConfig {
    /// Loads `dir/config.<profile>.yaml` and validates it. Configuration
    /// errors are fatal at startup only; nothing here is retried.
    pub fn load(dir: &Path, profile: Profile) -> Result<Self, ConfigError> {
        let path = dir.join(profile.file_name());
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: AppConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::Invalid("no chains configured".into()));
        }
        for (i, a) in self.chains.iter().enumerate() {
            if a.rpc_url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "chain {} has an empty rpc_url",
                    a.name
                )));
            }
            if a.zmq_enabled && a.zmq_address.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "chain {} enables zmq without zmq_address",
                    a.name
                )));
            }
            if self.chains[i + 1..].iter().any(|b| b.name == a.name) {
                return Err(ConfigError::Invalid(format!(
                    "chain {} configured twice",
                    a.name
                )));
            }
        }
        if self.database.indexer_type == IndexerBackend::Mysql {
            return Err(ConfigError::Invalid(
                "database.indexer_type = mysql is served by the upload service, not the indexer"
                    .into(),
            ));
        }
        if self.indexer.scan_interval == 0 {
            return Err(ConfigError::Invalid("indexer.scan_interval must be > 0".into()));
        }
        if self.indexer.max_queue_size == 0 {
            return Err(ConfigError::Invalid("indexer.max_queue_size must be > 0".into()));
        }
        let quota = self.indexer.effective_quota();
        if quota == 0 || quota > self.indexer.max_queue_size {
            return Err(ConfigError::Invalid(format!(
                "indexer.per_chain_quota {} out of range (max_queue_size {})",
                quota, self.indexer.max_queue_size
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_scan_interval() -> u64 {
    constants::DEFAULT_SCAN_INTERVAL.as_secs()
}

fn default_max_queue_size() -> usize {
    constants::DEFAULT_MAX_QUEUE_SIZE
}

fn default_escape_window() -> usize {
    constants::DEFAULT_ESCAPE_WINDOW
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./files")
}

fn default_redis_host() -> String {
    "127.0.0.1".into()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_cache_ttl() -> u64 {
    300
}
