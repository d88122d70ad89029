//! bibgraph configuration, persisted as TOML.
//!
//! ```toml
//! data_dir = ".bibgraph"
//!
//! [ingest]
//! year_mode = "from-record"
//! progress_interval = 1000
//! queue_capacity = 1024
//!
//! [graph]
//! max_depth = 2
//! direct_fanout_cap = 20
//! sample_size = 5
//! max_vertices = 500
//! max_visits = 2000
//!
//! [server]
//! bind = "0.0.0.0"
//! port = 5000
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coauthor::ExpansionLimits;
use crate::error::{ConfigError, ConfigResult};
use crate::ingest::IngestConfig;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE: &str = "bibgraph.toml";

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BibConfig {
    /// Directory holding the redb database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub graph: ExpansionLimits,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".bibgraph")
}

impl Default for BibConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ingest: IngestConfig::default(),
            graph: ExpansionLimits::default(),
            server: ServerConfig::default(),
        }
    }
}

impl BibConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml().map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                    path: parent.display().to_string(),
                    source: e,
                })?;
            }
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
