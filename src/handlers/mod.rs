//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - metrics path (default `/metrics`): Prometheus metrics endpoint
//! - `/`: Landing page linking to the metrics endpoint

pub mod metrics;
pub mod root;

// Re-export handlers
pub use metrics::metrics_handler;
pub use root::root_handler;
