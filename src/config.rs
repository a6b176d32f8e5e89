//! Configuration for cratedigger.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CRATEDIGGER_HOME, CRATEDIGGER_COLLECTION)
//! 2. Config file (.cratedigger/config.yaml)
//! 3. Defaults (~/.cratedigger)
//!
//! Config file discovery:
//! - Searches current directory and parents for .cratedigger/config.yaml
//! - `paths.home` is relative to the .cratedigger/ directory, `paths.collection`
//!   to the project root (the directory containing .cratedigger/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ingest::FolderSpec;
use crate::store::DEFAULT_TTL_DAYS;

pub mod paths;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    /// Folder specs, `path:genre`
    #[serde(default)]
    pub folders: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .cratedigger/)
    pub home: Option<String>,
    /// Collection file (relative to the project root)
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_days: Option<u32>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory (cache, ledger, lock)
    pub home: PathBuf,
    /// Collection file
    pub collection: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Processed-message cache TTL
    pub cache_ttl_days: u32,
    /// Default folders to harvest
    pub folders: Vec<FolderSpec>,
}

impl ResolvedConfig {
    pub fn cache_path(&self) -> PathBuf {
        self.home.join(paths::CACHE_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.home.join(paths::LEDGER_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.home.join(paths::LOCK_FILE)
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".cratedigger").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn parse_folders(specs: &[String]) -> Result<Vec<FolderSpec>> {
    specs
        .iter()
        .map(|s| s.parse::<FolderSpec>().map_err(anyhow::Error::from))
        .collect::<Result<Vec<_>>>()
        .context("Invalid entry in `folders`")
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".cratedigger");

    // Check for config file
    let config_file = find_config_file();

    let (home, collection, cache_ttl_days, folders) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // .cratedigger/ and the project root above it
        let state_dir = config_path.parent().unwrap_or(Path::new("."));
        let base_dir = state_dir.parent().unwrap_or(Path::new("."));

        let home = if let Ok(env_home) = std::env::var("CRATEDIGGER_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            resolve_path(state_dir, home_path)
        } else {
            default_home.clone()
        };

        let collection = if let Ok(env_collection) = std::env::var("CRATEDIGGER_COLLECTION") {
            PathBuf::from(env_collection)
        } else if let Some(ref collection_path) = config.paths.collection {
            resolve_path(base_dir, collection_path)
        } else {
            home.join(paths::COLLECTION_FILE)
        };

        let cache_ttl_days = config
            .cache
            .as_ref()
            .and_then(|c| c.ttl_days)
            .unwrap_or(DEFAULT_TTL_DAYS);

        let folders = parse_folders(&config.folders)
            .with_context(|| format!("In config file: {}", config_path.display()))?;

        (home, collection, cache_ttl_days, folders)
    } else {
        // No config file - use env vars or defaults
        let home = std::env::var("CRATEDIGGER_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        let collection = std::env::var("CRATEDIGGER_COLLECTION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(paths::COLLECTION_FILE));

        (home, collection, DEFAULT_TTL_DAYS, Vec::new())
    };

    Ok(ResolvedConfig {
        home,
        collection,
        config_file,
        cache_ttl_days,
        folders,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
