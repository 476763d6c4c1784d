//! Configuration management for ceph-exporter.
//!
//! This module resolves the effective configuration from CLI arguments (and
//! their environment fallbacks) plus the optional cluster list file, and
//! validates it before the server starts.

use ceph_exporter::cluster::{load_cluster_file, ClusterConfig};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::cli::{Args, ConfigFormat};

/// Effective configuration of the exporter.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    // Server configuration
    pub listen_addr: String,
    pub metrics_path: String,

    // Gateway collection
    pub rgw_mode: i64,
    pub rgw_concurrency: usize,
    #[serde(serialize_with = "serialize_duration")]
    pub rgw_interval: Duration,

    // Cluster access
    #[serde(serialize_with = "serialize_duration")]
    pub rados_op_timeout: Duration,
    pub ceph_binary: PathBuf,
    pub radosgw_admin_binary: PathBuf,

    /// Cluster list file the clusters were read from, if any.
    pub cluster_file: Option<PathBuf>,
    pub clusters: Vec<ClusterConfig>,
}

/// Parses a Go-style duration such as `30s`, `1m30s`, `250ms` or `0`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total_secs = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(format!("invalid duration '{input}'"));
        }
        let value: f64 = rest[..num_end]
            .parse()
            .map_err(|_| format!("invalid duration '{input}'"))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("missing unit in duration '{input}'")),
            unit => return Err(format!("unknown unit '{unit}' in duration '{input}'")),
        };
        total_secs += value * scale;
        rest = &rest[unit_end..];
    }

    Duration::try_from_secs_f64(total_secs).map_err(|e| format!("invalid duration '{input}': {e}"))
}

/// Formats a duration the way [`parse_duration`] reads it.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    let mut out = String::new();
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let ms = d.subsec_millis();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if s > 0 {
        out.push_str(&format!("{s}s"));
    }
    if ms > 0 {
        out.push_str(&format!("{ms}ms"));
    }
    if out.is_empty() {
        out = format!("{}ns", d.subsec_nanos());
    }
    out
}

fn serialize_duration<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*d))
}

/// Go-style `:port` listen addresses bind every interface.
fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Resolves configuration from CLI args and the cluster list file.
/// Without a cluster list file a single cluster is built from the defaults.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let (cluster_file, clusters) = if args.exporter_config.exists() {
        let file = load_cluster_file(&args.exporter_config)?;
        (Some(args.exporter_config.clone()), file.cluster)
    } else {
        info!(
            "No cluster list at {}, using single cluster '{}'",
            args.exporter_config.display(),
            args.ceph_cluster
        );
        let cluster = ClusterConfig {
            cluster_label: args.ceph_cluster.clone(),
            user: args.ceph_user.clone(),
            config_file: args.ceph_config.clone(),
        };
        (None, vec![cluster])
    };

    Ok(Config {
        listen_addr: normalize_listen_addr(&args.telemetry_addr),
        metrics_path: args.telemetry_path.clone(),
        rgw_mode: args.rgw_mode,
        rgw_concurrency: args.rgw_concurrency,
        rgw_interval: args.rgw_interval,
        rados_op_timeout: args.ceph_rados_op_timeout,
        ceph_binary: args.ceph_binary.clone(),
        radosgw_admin_binary: args.radosgw_admin_binary.clone(),
        cluster_file,
        clusters,
    })
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match cfg.listen_addr.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => {}
        _ => {
            return Err(format!(
                "Invalid listen address '{}', expected host:port",
                cfg.listen_addr
            )
            .into())
        }
    }

    if !cfg.metrics_path.starts_with('/') || cfg.metrics_path == "/" {
        return Err(format!(
            "Invalid metrics path '{}', expected an absolute path other than '/'",
            cfg.metrics_path
        )
        .into());
    }

    if cfg.rgw_concurrency == 0 {
        return Err("rgw_concurrency must be at least 1".into());
    }

    if cfg.rgw_interval.is_zero() {
        return Err("rgw_interval must be greater than zero".into());
    }

    if cfg.clusters.is_empty() {
        return Err("No clusters configured".into());
    }

    let mut labels = HashSet::new();
    for cluster in &cfg.clusters {
        if cluster.cluster_label.is_empty() {
            return Err("Cluster label must not be empty".into());
        }
        if !labels.insert(cluster.cluster_label.as_str()) {
            return Err(format!("Duplicate cluster label '{}'", cluster.cluster_label).into());
        }
    }

    Ok(())
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["ceph-exporter", "--exporter-config", "/nonexistent/exporter.yml"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("5 minutes").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
    }

    #[test]
    fn test_defaults_build_single_cluster() {
        let cfg = resolve_config(&args(&[])).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9128");
        assert_eq!(cfg.metrics_path, "/metrics");
        assert_eq!(cfg.rados_op_timeout, Duration::from_secs(30));
        assert!(cfg.cluster_file.is_none());
        assert_eq!(cfg.clusters, vec![ClusterConfig::default()]);
        assert!(validate_effective_config(&cfg).is_ok());
    }

    #[test]
    fn test_cluster_file_replaces_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "cluster:\n  - cluster_label: east\n    user: exporter\n    config_file: /etc/ceph/east.conf"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cfg = resolve_config(&Args::parse_from(["ceph-exporter", "--exporter-config", &path])).unwrap();
        assert_eq!(cfg.clusters.len(), 1);
        assert_eq!(cfg.clusters[0].cluster_label, "east");
        assert_eq!(cfg.cluster_file.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_malformed_cluster_file_is_error() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "cluster: [broken").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert!(resolve_config(&Args::parse_from(["ceph-exporter", "--exporter-config", &path])).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut cfg = resolve_config(&args(&[])).unwrap();
        cfg.metrics_path = "/".to_string();
        assert!(validate_effective_config(&cfg).is_err());

        let mut cfg = resolve_config(&args(&["--telemetry-addr", "localhost"])).unwrap();
        assert!(validate_effective_config(&cfg).is_err());
        cfg.listen_addr = "127.0.0.1:9128".to_string();
        assert!(validate_effective_config(&cfg).is_ok());

        cfg.rgw_interval = Duration::ZERO;
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("rgw_interval"));
        cfg.rgw_interval = Duration::from_secs(60);
        assert!(validate_effective_config(&cfg).is_ok());

        cfg.clusters.push(cfg.clusters[0].clone());
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("Duplicate cluster label"));
    }

    #[test]
    fn test_show_config_serializes_durations() {
        let cfg = resolve_config(&args(&[])).unwrap();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(yaml.contains("rados_op_timeout: 30s"));
        assert!(yaml.contains("rgw_interval: 5m"));
    }
}
