//! Sub-collectors composed by the exporter.
//!
//! Each sub-collector owns one statistic family. It describes its metrics
//! once, and on every cycle emits samples onto the cycle's [`SampleSink`].
//! Errors stay inside the sub-collector: they are logged and show up as
//! missing samples.

pub mod bucket_usage;
pub mod cluster_usage;
pub mod gateway;
pub mod health;

use prometheus::core::Desc;

use crate::metrics::SampleSink;

pub use bucket_usage::{BucketFailure, BucketUsageCollector, FanoutError};
pub use cluster_usage::ClusterUsageCollector;
pub use gateway::{GatewayAdmin, GatewayError, RadosGwAdmin};
pub use health::ClusterHealthCollector;

/// A unit of metric production driven by the exporter.
pub trait SubCollector: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Descriptors of every metric this collector may emit.
    fn describe(&self) -> Vec<&Desc>;

    /// Emits the current samples. Must not panic on remote failures.
    fn collect(&self, sink: &SampleSink);

    /// Whether the collector gathers on its own schedule rather than inline.
    fn is_background(&self) -> bool {
        false
    }
}

/// How the gateway (RGW) statistics collector participates in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Disabled,
    Foreground,
    Background,
    /// Any other configured value; treated as disabled.
    Invalid(i64),
}

impl From<i64> for GatewayMode {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::Disabled,
            1 => Self::Foreground,
            2 => Self::Background,
            other => Self::Invalid(other),
        }
    }
}
