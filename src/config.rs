//! Configuration for dataops paths and cleaning settings.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DATAOPS_HOME, DATAOPS_TEMPORAL, DATAOPS_PERSISTENT)
//! 2. Config file (.dataops/config.yaml)
//! 3. Defaults (./data)
//!
//! Config file discovery:
//! - Searches current directory and parents for .dataops/config.yaml
//! - Paths in config file are relative to the project root (parent of .dataops/)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::Zone;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cleaning: Option<CleaningConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Data root holding zone stores and the ledger
    pub home: Option<String>,
    /// Folder new source files are dropped into
    pub temporal: Option<String>,
    /// Folder the landing stage files sources into
    pub persistent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleaningConfig {
    pub fuzzy_cutoff: Option<f64>,
    pub knn_neighbors: Option<usize>,
}

/// Tunables for the trusted cleaning steps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CleaningSettings {
    /// Minimum similarity score (0-100) for a fuzzy vocabulary match
    pub fuzzy_cutoff: f64,

    /// Neighbor count for KNN imputation
    pub knn_neighbors: usize,
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            fuzzy_cutoff: 80.0,
            knn_neighbors: 5,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Data root
    pub home: PathBuf,
    /// Landing temporal folder
    pub temporal_folder: PathBuf,
    /// Landing persistent folder
    pub persistent_folder: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Cleaning settings
    pub cleaning: CleaningSettings,
}

impl ResolvedConfig {
    /// Configuration rooted at `home` with default layout
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            temporal_folder: home.join("landing").join("temporal"),
            persistent_folder: home.join("landing").join("persistent"),
            home,
            config_file: None,
            cleaning: CleaningSettings::default(),
        }
    }

    /// SQLite file backing a zone store
    pub fn store_path(&self, zone: Zone) -> PathBuf {
        self.home.join(format!("{}.db", zone.as_str()))
    }

    /// SQLite file backing the status ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.home.join("execution_log.db")
    }

    /// Advisory lock file guarding sequential store access
    pub fn lock_path(&self) -> PathBuf {
        self.home.join(".pipeline.lock")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".dataops").join("config.yaml");
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

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Resolve configuration from an optional config file plus environment
fn resolve(config_file: Option<PathBuf>) -> Result<ResolvedConfig> {
    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    // Project root is the parent of .dataops/
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let paths = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();

    let home = match std::env::var("DATAOPS_HOME") {
        Ok(env_home) => PathBuf::from(env_home),
        Err(_) => paths
            .home
            .as_deref()
            .map(|p| resolve_path(&base_dir, p))
            .unwrap_or_else(|| base_dir.join("data")),
    };

    let mut resolved = ResolvedConfig::with_home(home);

    if let Ok(temporal) = std::env::var("DATAOPS_TEMPORAL") {
        resolved.temporal_folder = PathBuf::from(temporal);
    } else if let Some(ref temporal) = paths.temporal {
        resolved.temporal_folder = resolve_path(&base_dir, temporal);
    }

    if let Ok(persistent) = std::env::var("DATAOPS_PERSISTENT") {
        resolved.persistent_folder = PathBuf::from(persistent);
    } else if let Some(ref persistent) = paths.persistent {
        resolved.persistent_folder = resolve_path(&base_dir, persistent);
    }

    if let Some(cleaning) = file.as_ref().and_then(|f| f.cleaning.as_ref()) {
        let defaults = CleaningSettings::default();
        resolved.cleaning = CleaningSettings {
            fuzzy_cutoff: cleaning.fuzzy_cutoff.unwrap_or(defaults.fuzzy_cutoff),
            knn_neighbors: cleaning.knn_neighbors.unwrap_or(defaults.knn_neighbors),
        };
    }

    if !(0.0..=100.0).contains(&resolved.cleaning.fuzzy_cutoff) {
        anyhow::bail!(
            "fuzzy_cutoff must be between 0 and 100, got {}",
            resolved.cleaning.fuzzy_cutoff
        );
    }
    if resolved.cleaning.knn_neighbors == 0 {
        anyhow::bail!("knn_neighbors must be at least 1");
    }

    resolved.config_file = config_file;
    Ok(resolved)
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    resolve(find_config_file())
}

/// Load configuration from an explicit config file
pub fn load_config_from(path: &Path) -> Result<ResolvedConfig> {
    resolve(Some(path.to_path_buf()))
}
