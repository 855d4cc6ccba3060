//! Probe configuration (`cdshim.toml`)
//! Holds the header flags, search roots and output defaults the CLI falls
//! back to when a flag is not given on the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use cdshim_sys::AbiVersion;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Main probe configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub headers: HeaderConfig,
    pub abi: AbiConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Header layout flags and where to look for the headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// collectd source checkout, selects the source tree layout
    pub collectd_path: Option<PathBuf>,
    /// Selects the 5.4 core layout
    pub collectd_54: bool,
    /// Roots `check` searches for installed headers
    pub search_roots: Vec<PathBuf>,
}

/// ABI generation the plugins are built for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbiConfig {
    /// collectd version, e.g. "5.7" (layout default when unset)
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

/// How resolution results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    /// Compiler flags, ready for `CFLAGS`
    Cflags,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            collectd_path: None,
            collectd_54: false,
            search_roots: vec![
                PathBuf::from("/usr/include"),
                PathBuf::from("/usr/local/include"),
                PathBuf::from("/opt/collectd/include"),
            ],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    config: Arc<RwLock<ProbeConfig>>,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(ProbeConfig::default())),
            config_path: None,
        }
    }

    /// Load configuration from file
    pub async fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_str = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let new_config: ProbeConfig =
            toml::from_str(&config_str).with_context(|| "Failed to parse config file")?;

        *self.config.write().await = new_config;
        self.config_path = Some(path.to_path_buf());

        info!("Loaded configuration from: {}", path.display());
        Ok(())
    }

    /// Save current configuration to file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = self.config.read().await;
        let config_str = toml::to_string_pretty(&*config)?;

        tokio::fs::write(path.as_ref(), config_str)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        info!("Saved configuration to: {}", path.as_ref().display());
        Ok(())
    }

    pub async fn get_config(&self) -> ProbeConfig {
        self.config.read().await.clone()
    }

    /// File the configuration was loaded from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Validate configuration
    pub fn validate(config: &ProbeConfig) -> Result<()> {
        if let Some(version) = &config.abi.version {
            if AbiVersion::parse(version).is_none() {
                anyhow::bail!("Unsupported collectd version: {}", version);
            }
        }

        if let Some(path) = &config.headers.collectd_path {
            if path.as_os_str().is_empty() {
                anyhow::bail!("collectd_path must not be empty, leave it unset instead");
            }

            if config.headers.collectd_54 {
                warn!("collectd_path is set, collectd_54 will be ignored");
            }
        }

        if config.headers.search_roots.is_empty() && config.headers.collectd_path.is_none() {
            anyhow::bail!("search_roots must not be empty");
        }

        config
            .logging
            .level
            .parse::<tracing::Level>()
            .map_err(|_| anyhow::anyhow!("Invalid log level: {}", config.logging.level))?;

        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
