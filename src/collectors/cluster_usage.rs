//! Cluster-wide capacity and utilisation from `ceph df`.

use prometheus::core::Desc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::conn::{mon_command_payload, Conn};
use crate::metrics::{cluster_desc, MetricsError, SampleSink, NAMESPACE};
use crate::version::{VersionHolder, NAUTILUS};

use super::SubCollector;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DfReply {
    stats: DfStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DfStats {
    total_bytes: u64,
    total_used_bytes: u64,
    total_used_raw_bytes: u64,
    total_avail_bytes: u64,
    total_objects: Option<u64>,
}

/// Reports raw capacity, usage and availability of the whole cluster.
pub struct ClusterUsageCollector {
    cluster: String,
    conn: Arc<dyn Conn>,
    version: Arc<VersionHolder>,

    capacity_bytes: Arc<Desc>,
    used_bytes: Arc<Desc>,
    available_bytes: Arc<Desc>,
    objects: Arc<Desc>,
}

impl ClusterUsageCollector {
    pub fn new(
        cluster: &str,
        conn: Arc<dyn Conn>,
        version: Arc<VersionHolder>,
    ) -> Result<Self, MetricsError> {
        let desc = |name: &str, help: &str| {
            cluster_desc(cluster, &format!("{NAMESPACE}_cluster_{name}"), help, &[])
        };

        Ok(Self {
            cluster: cluster.to_string(),
            conn,
            version,
            capacity_bytes: desc("capacity_bytes", "Total capacity of the cluster")?,
            used_bytes: desc("used_bytes", "Capacity of the cluster currently in use")?,
            available_bytes: desc("available_bytes", "Available space within the cluster")?,
            objects: desc("objects", "No. of rados objects within the cluster")?,
        })
    }
}

impl SubCollector for ClusterUsageCollector {
    fn name(&self) -> &'static str {
        "cluster_usage"
    }

    fn describe(&self) -> Vec<&Desc> {
        vec![
            self.capacity_bytes.as_ref(),
            self.used_bytes.as_ref(),
            self.available_bytes.as_ref(),
            self.objects.as_ref(),
        ]
    }

    fn collect(&self, sink: &SampleSink) {
        debug!(cluster = %self.cluster, "collecting cluster usage metrics");

        let Some(version) = self.version.get() else {
            warn!(cluster = %self.cluster, "ceph version unknown, skipping cluster usage");
            return;
        };

        let reply = self
            .conn
            .mon_command(&mon_command_payload("df"))
            .map_err(|e| e.to_string())
            .and_then(|(buf, _)| {
                serde_json::from_slice::<DfReply>(&buf).map_err(|e| e.to_string())
            });
        let stats = match reply {
            Ok(reply) => reply.stats,
            Err(e) => {
                error!(cluster = %self.cluster, error = %e, "failed collecting cluster usage metrics");
                return;
            }
        };

        // Nautilus split raw usage out of total_used_bytes.
        let used = if version.is_at_least(NAUTILUS) {
            stats.total_used_raw_bytes
        } else {
            stats.total_used_bytes
        };

        sink.gauge(&self.capacity_bytes, stats.total_bytes as f64, &[]);
        sink.gauge(&self.used_bytes, used as f64, &[]);
        sink.gauge(&self.available_bytes, stats.total_avail_bytes as f64, &[]);
        if let Some(objects) = stats.total_objects {
            sink.gauge(&self.objects, objects as f64, &[]);
        }
    }
}
