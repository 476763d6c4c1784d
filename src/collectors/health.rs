//! Overall cluster health from `ceph status`.

use prometheus::core::Desc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::conn::{mon_command_payload, Conn};
use crate::metrics::{cluster_desc, MetricsError, SampleSink, NAMESPACE};
use crate::version::{VersionHolder, LUMINOUS};

use super::SubCollector;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatusReply {
    health: HealthSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HealthSection {
    status: String,
    overall_status: String,
}

/// Maps a Ceph health string onto 0 (OK), 1 (WARN) or 2 (ERR).
pub fn health_code(status: &str) -> Option<f64> {
    match status {
        "HEALTH_OK" => Some(0.0),
        "HEALTH_WARN" => Some(1.0),
        "HEALTH_ERR" => Some(2.0),
        _ => None,
    }
}

pub struct ClusterHealthCollector {
    cluster: String,
    conn: Arc<dyn Conn>,
    version: Arc<VersionHolder>,

    health_status: Arc<Desc>,
}

impl ClusterHealthCollector {
    pub fn new(
        cluster: &str,
        conn: Arc<dyn Conn>,
        version: Arc<VersionHolder>,
    ) -> Result<Self, MetricsError> {
        Ok(Self {
            cluster: cluster.to_string(),
            conn,
            version,
            health_status: cluster_desc(
                cluster,
                &format!("{NAMESPACE}_health_status"),
                "Health status of Cluster, can vary only between 3 states (err:2, warn:1, ok:0)",
                &[],
            )?,
        })
    }
}

impl SubCollector for ClusterHealthCollector {
    fn name(&self) -> &'static str {
        "cluster_health"
    }

    fn describe(&self) -> Vec<&Desc> {
        vec![self.health_status.as_ref()]
    }

    fn collect(&self, sink: &SampleSink) {
        debug!(cluster = %self.cluster, "collecting cluster health metrics");

        let Some(version) = self.version.get() else {
            warn!(cluster = %self.cluster, "ceph version unknown, skipping cluster health");
            return;
        };

        let reply = self
            .conn
            .mon_command(&mon_command_payload("status"))
            .map_err(|e| e.to_string())
            .and_then(|(buf, _)| {
                serde_json::from_slice::<StatusReply>(&buf).map_err(|e| e.to_string())
            });
        let health = match reply {
            Ok(reply) => reply.health,
            Err(e) => {
                error!(cluster = %self.cluster, error = %e, "failed collecting cluster health metrics");
                return;
            }
        };

        let status = if version.is_at_least(LUMINOUS) {
            &health.status
        } else {
            &health.overall_status
        };

        match health_code(status) {
            Some(code) => sink.gauge(&self.health_status, code, &[]),
            None => warn!(cluster = %self.cluster, status = %status, "unknown health status"),
        }
    }
}
