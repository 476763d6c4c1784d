//! Per-cluster exporter: version gate, sub-collector registry and the
//! single-flight scrape cycle.
//!
//! An [`Exporter`] is built once per monitored cluster. It composes the
//! active sub-collectors from the gateway mode and serves `describe` and
//! `collect` requests. Collection runs under a cycle lock so concurrent
//! scrapes never drive the shared connection or the version slot at the same
//! time.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::cluster::ClusterConfig;
use crate::collectors::{
    BucketUsageCollector, ClusterHealthCollector, ClusterUsageCollector, GatewayAdmin,
    GatewayMode, SubCollector,
};
use crate::conn::Conn;
use crate::metrics::{into_families, MetricSample, SampleSink};
use crate::version::{ClusterVersion, VersionGate, VersionHolder};

pub const DEFAULT_GATEWAY_CONCURRENCY: usize = 8;
pub const DEFAULT_GATEWAY_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Knobs that shape the active sub-collector list.
#[derive(Debug, Clone)]
pub struct ExporterOptions {
    pub gateway_mode: GatewayMode,
    /// Upper bound on concurrent per-bucket lookups.
    pub gateway_concurrency: usize,
    /// Scan period of the background gateway mode.
    pub gateway_interval: Duration,
}

impl Default for ExporterOptions {
    fn default() -> Self {
        Self {
            gateway_mode: GatewayMode::Disabled,
            gateway_concurrency: DEFAULT_GATEWAY_CONCURRENCY,
            gateway_interval: DEFAULT_GATEWAY_INTERVAL,
        }
    }
}

/// Builds the ordered list of sub-collectors for one cluster.
///
/// The standard collectors always come first; the gateway collector is
/// appended according to `options.gateway_mode`. A collector that fails to
/// build is logged and left out.
pub fn active_collectors(
    cluster: &str,
    conn: &Arc<dyn Conn>,
    admin: &Arc<dyn GatewayAdmin>,
    version: &Arc<VersionHolder>,
    options: &ExporterOptions,
) -> Vec<Box<dyn SubCollector>> {
    let mut collectors: Vec<Box<dyn SubCollector>> = Vec::new();

    match ClusterUsageCollector::new(cluster, Arc::clone(conn), Arc::clone(version)) {
        Ok(c) => collectors.push(Box::new(c)),
        Err(e) => error!(cluster, error = %e, "failed to build cluster usage collector"),
    }
    match ClusterHealthCollector::new(cluster, Arc::clone(conn), Arc::clone(version)) {
        Ok(c) => collectors.push(Box::new(c)),
        Err(e) => error!(cluster, error = %e, "failed to build cluster health collector"),
    }

    let gateway = match options.gateway_mode {
        GatewayMode::Disabled => None,
        GatewayMode::Foreground => Some(BucketUsageCollector::new(
            cluster,
            Arc::clone(admin),
            options.gateway_concurrency,
        )),
        GatewayMode::Background => Some(BucketUsageCollector::background(
            cluster,
            Arc::clone(admin),
            options.gateway_concurrency,
            options.gateway_interval,
        )),
        GatewayMode::Invalid(mode) => {
            warn!(cluster, rgw_mode = mode, "RGW collector disabled due to invalid mode");
            None
        }
    };

    match gateway {
        Some(Ok(c)) => collectors.push(Box::new(c)),
        Some(Err(e)) => error!(cluster, error = %e, "failed to build RGW collector"),
        None => {}
    }

    collectors
}

/// Exporter for a single cluster.
pub struct Exporter {
    cluster: ClusterConfig,
    gate: VersionGate,
    cycle: Mutex<()>,
    collectors: Vec<Box<dyn SubCollector>>,
}

impl Exporter {
    pub fn new(
        cluster: ClusterConfig,
        conn: Arc<dyn Conn>,
        admin: Arc<dyn GatewayAdmin>,
        options: &ExporterOptions,
    ) -> Self {
        let version = Arc::new(VersionHolder::new());
        let collectors = active_collectors(
            &cluster.cluster_label,
            &conn,
            &admin,
            &version,
            options,
        );
        Self::with_collectors(cluster, conn, version, collectors)
    }

    /// Assembles an exporter from an explicit collector list.
    pub fn with_collectors(
        cluster: ClusterConfig,
        conn: Arc<dyn Conn>,
        version: Arc<VersionHolder>,
        collectors: Vec<Box<dyn SubCollector>>,
    ) -> Self {
        Self {
            cluster,
            gate: VersionGate::new(conn, version),
            cycle: Mutex::new(()),
            collectors,
        }
    }

    pub fn cluster(&self) -> &ClusterConfig {
        &self.cluster
    }

    pub fn collectors(&self) -> &[Box<dyn SubCollector>] {
        &self.collectors
    }

    /// Version detected by the most recent successful refresh.
    pub fn version(&self) -> Option<ClusterVersion> {
        self.gate.holder().get()
    }

    /// Descriptors of every active sub-collector, or none when the cluster
    /// version cannot be determined.
    pub fn describe(&self) -> Vec<&Desc> {
        if let Err(e) = self.gate.refresh() {
            error!(cluster = %self.cluster.cluster_label, error = %e, "failed to set ceph version");
            return Vec::new();
        }

        self.collectors.iter().flat_map(|c| c.describe()).collect()
    }

    /// Runs one collection cycle and returns its samples.
    ///
    /// At most one cycle runs at a time; later callers block until the
    /// running one finishes. A failed version refresh yields no samples.
    pub fn collect_samples(&self) -> Vec<MetricSample> {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();

        if let Err(e) = self.gate.refresh() {
            error!(cluster = %self.cluster.cluster_label, error = %e, "failed to set ceph version");
            return Vec::new();
        }

        let (sink, samples) = SampleSink::channel();
        for collector in &self.collectors {
            collector.collect(&sink);
        }
        drop(sink);

        let samples: Vec<MetricSample> = samples.into_iter().collect();
        debug!(
            cluster = %self.cluster.cluster_label,
            samples = samples.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "collection cycle finished"
        );
        samples
    }

    /// Runs one collection cycle and returns it as metric families.
    pub fn gather(&self) -> Vec<MetricFamily> {
        into_families(self.collect_samples())
    }
}

/// Runs one cycle on every exporter and merges the results.
///
/// Samples are grouped by metric name across clusters, so every family
/// appears once in the output no matter how many clusters report it.
pub fn gather_all(exporters: &[Arc<Exporter>]) -> Vec<MetricFamily> {
    into_families(exporters.iter().flat_map(|exporter| exporter.collect_samples()))
}

impl Collector for Exporter {
    fn desc(&self) -> Vec<&Desc> {
        self.describe()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gather()
    }
}
