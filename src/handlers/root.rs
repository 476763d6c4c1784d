//! Root endpoint handler for the landing page.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Escapes text for use in HTML content and single-quoted attributes.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders the landing page linking to the metrics endpoint.
pub fn render_root(metrics_path: &str, clusters: &[&str], uptime_secs: u64) -> String {
    let cluster_items: String = clusters
        .iter()
        .map(|c| format!("<li>{}</li>", escape_html(c)))
        .collect();
    let metrics_path = escape_html(metrics_path);

    format!(
        r#"<html>
<head><title>Ceph Exporter</title></head>
<body>
<h1>Ceph Exporter</h1>
<p><a href='{metrics_path}'>Metrics</a></p>
<p>Version {version}, up {uptime_secs}s</p>
<ul>{cluster_items}</ul>
</body>
</html>"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let clusters: Vec<&str> = state
        .exporters
        .iter()
        .map(|e| e.cluster().cluster_label.as_str())
        .collect();

    Html(render_root(
        &state.metrics_path,
        &clusters,
        state.start_time.elapsed().as_secs(),
    ))
}
