use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::report::{ReportFormat, SortOrder};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Cannot write config file '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub report: ReportConfig,
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// libpcap filter expression applied while reading.
    pub bpf_filter: Option<String>,
    /// Packets touching any of these networks are left out of the flow table.
    pub ignore_networks: Vec<IpNetwork>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub sort: SortOrder,
    pub min_bytes: u64,
    pub top: Option<usize>,
    pub human_units: bool,
    /// Endpoints in these networks are the local side of the host report.
    pub local_networks: Vec<IpNetwork>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Worker threads; 1 aggregates on the calling thread.
    pub partitions: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::Text,
            sort: SortOrder::Bytes,
            min_bytes: 0,
            top: None,
            human_units: false,
            local_networks: default_local_networks(),
        }
    }
}

/// Loopback and private ranges.
fn default_local_networks() -> Vec<IpNetwork> {
    ["127.0.0.0/8", "10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "fc00::/7"]
        .iter()
        .filter_map(|network| network.parse().ok())
        .collect()
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self { partitions: 1 }
    }
}

impl Config {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content, path)?;
        log::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
