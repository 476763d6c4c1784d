//! RADOS Gateway administration primitives.
//!
//! Bucket statistics are not available through monitor commands, so they are
//! read with `radosgw-admin`. The [`GatewayAdmin`] trait keeps the fan-out
//! collector independent of the tool.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::conn::{op_timeout_args, run_tool, ConnError};
use crate::metrics::MetricsError;

use super::bucket_usage::FanoutError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway command failed: {0}")]
    Command(#[from] ConnError),

    #[error("failed to decode gateway reply: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Fanout(#[from] FanoutError),

    #[error("failed to build bucket worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("failed to start background scan: {0}")]
    Thread(#[from] std::io::Error),
}

/// Per-bucket command primitive of the gateway.
pub trait GatewayAdmin: Send + Sync {
    /// Raw JSON array describing every bucket.
    fn list_bucket_stats(&self) -> Result<Vec<u8>, GatewayError>;

    /// Raw JSON usage report for one bucket owned by `owner`.
    fn show_bucket_usage(&self, bucket: &str, owner: &str) -> Result<Vec<u8>, GatewayError>;
}

/// One entry of `radosgw-admin bucket stats`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BucketStats {
    pub bucket: String,
    pub num_shards: i64,
    pub id: String,
    pub owner: String,
    pub mtime: String,
    pub creation_time: String,
}

/// Reply of `radosgw-admin usage show`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BucketUsage {
    pub summary: Vec<UsageSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UsageSummary {
    pub user: String,
    pub categories: Vec<CategoryUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoryUsage {
    pub category: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub ops: u64,
    pub successful_ops: u64,
}

/// [`GatewayAdmin`] backed by the `radosgw-admin` CLI.
#[derive(Debug, Clone)]
pub struct RadosGwAdmin {
    binary: PathBuf,
    config_file: PathBuf,
    user: String,
    op_timeout: Duration,
}

impl RadosGwAdmin {
    pub fn new(
        binary: impl Into<PathBuf>,
        config_file: impl Into<PathBuf>,
        user: impl Into<String>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            config_file: config_file.into(),
            user: user.into(),
            op_timeout,
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            self.config_file.display().to_string(),
            "--user".to_string(),
            self.user.clone(),
        ];
        args.extend(op_timeout_args(self.op_timeout));
        args
    }

    fn usage_args(&self, bucket: &str, owner: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            [
                "usage",
                "show",
                "--bucket",
                bucket,
                "--categories",
                "put_obj,get_obj",
                "--show-log-entries",
                "false",
                "--uid",
                owner,
                "--format",
                "json",
            ]
            .map(String::from),
        );
        args
    }
}

impl GatewayAdmin for RadosGwAdmin {
    fn list_bucket_stats(&self) -> Result<Vec<u8>, GatewayError> {
        let mut args = self.base_args();
        args.extend(["bucket", "stats", "--format", "json"].map(String::from));
        let (out, _) = run_tool(&self.binary, &args)?;
        Ok(out)
    }

    fn show_bucket_usage(&self, bucket: &str, owner: &str) -> Result<Vec<u8>, GatewayError> {
        let (out, _) = run_tool(&self.binary, &self.usage_args(bucket, owner))?;
        Ok(out)
    }
}
