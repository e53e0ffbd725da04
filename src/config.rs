use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path (~/.config/kstage)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("kstage"))
}

// ============================================================================
// Config
// ============================================================================

/// Contents of ~/.config/kstage/config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KstageConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub apply: ApplyConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL including the path prefix, e.g. http://localhost:8080/api/v1
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Deadline for one call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    scaleapi::DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    scaleapi::DEFAULT_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Parallel calls for independent items
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Drop successfully applied items from the ledger after a cycle
    #[serde(default)]
    pub prune_applied: bool,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            prune_applied: false,
        }
    }
}

fn default_jobs() -> usize {
    4
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Sessions live behind the scaling API
    #[default]
    Remote,
    /// Sessions are JSON files in a local directory
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// Directory for local sessions (tilde expanded)
    #[serde(default = "default_store_dir")]
    pub dir: String,

    /// Remote folder new sessions are filed under
    #[serde(default)]
    pub folder: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            dir: default_store_dir(),
            folder: None,
        }
    }
}

fn default_store_dir() -> String {
    "~/.config/kstage/sessions".to_string()
}

impl KstageConfig {
    /// Load ~/.config/kstage/config.toml, or defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join("config.toml"))
    }

    /// Load a config file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Settings for the HTTP client
    pub fn api(&self) -> scaleapi::Config {
        scaleapi::Config {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
        }
    }

    /// Expanded local session directory
    pub fn store_dir(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.store.dir);
        PathBuf::from(expanded.as_ref())
    }
}
