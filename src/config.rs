use crate::evict::EvictionPolicy;
use crate::storage::vector::VectorIndexConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Externally supplied configuration for a [`crate::ClaimStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite database file
    pub database: PathBuf,
    /// Directory of the persistent triple store; in-memory when absent
    pub semantic_path: Option<PathBuf>,
    /// Apply RDFS inference before semantic queries
    pub inference: bool,
    /// Memory budget in MB; 0 disables eviction
    pub memory_budget_mb: u64,
    /// Rule for picking eviction victims under memory pressure
    pub eviction_policy: EvictionPolicy,
    /// Vector index build and search parameters
    pub vector: VectorIndexConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database_path_in(Path::new(".")),
            semantic_path: None,
            inference: false,
            memory_budget_mb: 0,
            eviction_policy: EvictionPolicy::Recency,
            vector: VectorIndexConfig::default(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("claimstore.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".claimstore").join("claims.db")
}

pub fn default_semantic_path_in(base: &Path) -> PathBuf {
    base.join(".claimstore").join("semantic")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
