//! Ceph Prometheus Exporter Library
//!
//! This library holds the scrape-cycle engine of the exporter: cluster
//! version detection, the per-cluster collector registry, the concurrent
//! per-bucket gateway collector and the fail-fast listener used by the HTTP
//! server. The binary wires these into an axum application.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ceph_exporter::{CliConn, ClusterConfig, Exporter, ExporterOptions, RadosGwAdmin};
//!
//! let cluster = ClusterConfig::default();
//! let timeout = Duration::from_secs(30);
//! let conn = Arc::new(CliConn::new("ceph", &cluster.user, &cluster.config_file, timeout));
//! let admin = Arc::new(RadosGwAdmin::new(
//!     "radosgw-admin",
//!     &cluster.config_file,
//!     &cluster.user,
//!     timeout,
//! ));
//!
//! let exporter = Exporter::new(cluster, conn, admin, &ExporterOptions::default());
//! for family in exporter.gather() {
//!     println!("{:?}", family);
//! }
//! ```

pub mod cluster;
pub mod collectors;
pub mod conn;
pub mod exporter;
pub mod listener;
pub mod metrics;
pub mod version;

// Re-export main types for convenience
pub use cluster::{load_cluster_file, ClusterConfig, ClusterFile};
pub use collectors::{GatewayAdmin, GatewayMode, RadosGwAdmin, SubCollector};
pub use conn::{CliConn, Conn, ConnError};
pub use exporter::{Exporter, ExporterOptions};
pub use listener::FailFastListener;
pub use metrics::{MetricKind, MetricSample, SampleSink};
pub use version::{ClusterVersion, VersionGate, VersionHolder};
