//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers.

use ceph_exporter::Exporter;
use prometheus::{Counter, Gauge, Registry};
use std::sync::Arc;
use std::time::Instant;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    /// One exporter per configured cluster, in configuration order.
    pub exporters: Vec<Arc<Exporter>>,
    /// Registry for the exporter's own telemetry.
    pub registry: Registry,
    pub scrape_duration: Gauge,
    pub scrapes_total: Counter,
    pub metrics_path: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates the state and registers the self-telemetry metrics.
    pub fn new(
        exporters: Vec<Arc<Exporter>>,
        metrics_path: String,
    ) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let scrape_duration = Gauge::new(
            "ceph_exporter_scrape_duration_seconds",
            "Time spent collecting metrics from all clusters for the last scrape",
        )?;
        let scrapes_total = Counter::new(
            "ceph_exporter_scrapes_total",
            "Number of metrics scrapes served",
        )?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(scrapes_total.clone()))?;

        Ok(Self {
            exporters,
            registry,
            scrape_duration,
            scrapes_total,
            metrics_path,
            start_time: Instant::now(),
        })
    }
}
