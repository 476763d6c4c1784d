//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every request runs one collection cycle per cluster on the blocking pool
//! and encodes the result in Prometheus text format. Collection failures only
//! shrink the metric set; the response is still `200 OK`.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use ceph_exporter::exporter::gather_all;
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    CollectionAborted,
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        let message = match self {
            MetricsError::CollectionAborted => "Metrics collection aborted",
            MetricsError::EncodingFailed => "Failed to encode metrics",
        };
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Handler for the metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, MetricsError> {
    let start = Instant::now();
    debug!("Processing metrics request");
    state.scrapes_total.inc();

    let exporters = state.exporters.clone();
    let mut families = tokio::task::spawn_blocking(move || gather_all(&exporters))
        .await
        .map_err(|e| {
            error!("Metrics collection task failed: {}", e);
            MetricsError::CollectionAborted
        })?;

    state
        .scrape_duration
        .set(start.elapsed().as_secs_f64());
    families.extend(state.registry.gather());

    let encoder = TextEncoder::new();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    encoder.encode(&families, &mut buffer).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        MetricsError::EncodingFailed
    })?;

    debug!(
        "Metrics request served in {:.2}ms ({} bytes)",
        start.elapsed().as_secs_f64() * 1000.0,
        buffer.len()
    );

    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    ))
}
