//! CLI arguments for ceph-exporter.
//!
//! Every option can also be given through the environment variable named in
//! its `env` attribute, which is how the exporter is usually configured in
//! containers.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::parse_duration;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    #[value(alias = "fatal", alias = "panic")]
    Error,
    #[value(alias = "warning")]
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "ceph-exporter",
    about = "Prometheus exporter for Ceph clusters",
    long_about = "Prometheus exporter for Ceph clusters.\n\n\
                  Detects the cluster release on every scrape, runs the version-aware \
                  collectors one cycle at a time and optionally gathers per-bucket usage \
                  from the RADOS Gateway.",
    version,
    propagate_version = true
)]
pub struct Args {
    /// Host:Port for the metrics endpoint
    #[arg(long, env = "TELEMETRY_ADDR", default_value = ":9128")]
    pub telemetry_addr: String,

    /// URL path for surfacing metrics to Prometheus
    #[arg(long, env = "TELEMETRY_PATH", default_value = "/metrics")]
    pub telemetry_path: String,

    /// Path to the cluster list file (YAML/JSON/TOML)
    #[arg(long, env = "EXPORTER_CONFIG", default_value = "/etc/ceph/exporter.yml")]
    pub exporter_config: PathBuf,

    /// RGW stats collection (0: disabled, 1: enabled, 2: background)
    #[arg(long, env = "RGW_MODE", default_value_t = 0, allow_negative_numbers = true)]
    pub rgw_mode: i64,

    /// Maximum number of concurrent per-bucket usage lookups
    #[arg(long, env = "RGW_CONCURRENCY", default_value_t = ceph_exporter::exporter::DEFAULT_GATEWAY_CONCURRENCY)]
    pub rgw_concurrency: usize,

    /// Scan period of the background RGW collector
    #[arg(long, env = "RGW_INTERVAL", default_value = "5m", value_parser = parse_duration)]
    pub rgw_interval: Duration,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", value_enum, default_value = "info", ignore_case = true)]
    pub log_level: LogLevel,

    /// Ceph cluster label used when no cluster list file exists
    #[arg(long, env = "CEPH_CLUSTER", default_value = ceph_exporter::cluster::DEFAULT_CLUSTER_LABEL)]
    pub ceph_cluster: String,

    /// Path to the Ceph config file used when no cluster list file exists
    #[arg(long, env = "CEPH_CONFIG", default_value = ceph_exporter::cluster::DEFAULT_CEPH_CONFIG)]
    pub ceph_config: PathBuf,

    /// Ceph user used when no cluster list file exists
    #[arg(long, env = "CEPH_USER", default_value = ceph_exporter::cluster::DEFAULT_CEPH_USER)]
    pub ceph_user: String,

    /// Timeout of every remote cluster operation (0s means no limit)
    #[arg(long, env = "CEPH_RADOS_OP_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub ceph_rados_op_timeout: Duration,

    /// Path of the ceph CLI
    #[arg(long, env = "CEPH_BINARY", default_value = "ceph")]
    pub ceph_binary: PathBuf,

    /// Path of the radosgw-admin CLI
    #[arg(long, env = "RADOSGW_ADMIN_BINARY", default_value = "radosgw-admin")]
    pub radosgw_admin_binary: PathBuf,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}
