use crate::index::types::DType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "mmcorpus";
const CONFIG_FILE: &str = "config.json";

/// Defaults for building and opening corpora, stored as JSON.
///
/// Every field is optional in the file; command-line flags override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Element type of new corpora
    #[serde(default = "default_dtype")]
    pub dtype: DType,

    /// Elements per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Value used to pad documents to a chunk boundary
    #[serde(default)]
    pub pad_id: i64,

    /// Reserve one neighbor chunk after every document
    #[serde(default)]
    pub retrieval_db: bool,

    /// Skip reading the files through once on open
    #[serde(default = "default_skip_warmup")]
    pub skip_warmup: bool,

    /// Entries in the per-store document lookup cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Lines parsed per parallel batch during ingest
    #[serde(default = "default_ingest_batch_size")]
    pub ingest_batch_size: usize,
}

fn default_dtype() -> DType {
    DType::I64
}

fn default_chunk_size() -> u64 {
    64
}

fn default_skip_warmup() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    8
}

fn default_ingest_batch_size() -> usize {
    4096
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dtype: default_dtype(),
            chunk_size: default_chunk_size(),
            pad_id: 0,
            retrieval_db: false,
            skip_warmup: default_skip_warmup(),
            cache_capacity: default_cache_capacity(),
            ingest_batch_size: default_ingest_batch_size(),
        }
    }
}

impl AppConfig {
    /// Load config from an explicit file, else the user config directory, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        match get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load config from a specific JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config as pretty JSON
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be positive");
        }
        if self.ingest_batch_size == 0 {
            anyhow::bail!("ingest_batch_size must be positive");
        }
        Ok(())
    }
}

/// Path of the user config file, if a config directory exists on this platform
pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_NAME).join(CONFIG_FILE))
}
