//! Monitored cluster definitions.
//!
//! Clusters come either from a cluster list file (YAML by default, JSON or
//! TOML by extension) or from the single-cluster defaults on the command line.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CLUSTER_LABEL: &str = "ceph";
pub const DEFAULT_CEPH_CONFIG: &str = "/etc/ceph/ceph.conf";
pub const DEFAULT_CEPH_USER: &str = "admin";

#[derive(Debug, thiserror::Error)]
pub enum ClusterFileError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

/// Connection identity of one monitored cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    #[serde(alias = "cluster-label")]
    pub cluster_label: String,
    pub user: String,
    #[serde(alias = "config-file")]
    pub config_file: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_label: DEFAULT_CLUSTER_LABEL.to_string(),
            user: DEFAULT_CEPH_USER.to_string(),
            config_file: PathBuf::from(DEFAULT_CEPH_CONFIG),
        }
    }
}

/// Root of the cluster list file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterFile {
    #[serde(default)]
    pub cluster: Vec<ClusterConfig>,
}

/// Loads the cluster list, choosing the format from the file extension.
pub fn load_cluster_file(path: &Path) -> Result<ClusterFile, ClusterFileError> {
    let content = fs::read_to_string(path).map_err(|source| ClusterFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let parse_err = |message: String| ClusterFileError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let file: ClusterFile = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        Some("toml") => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        _ => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
    };

    info!(
        "Loaded {} cluster(s) from: {}",
        file.cluster.len(),
        path.display()
    );
    Ok(file)
}
