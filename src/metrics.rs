//! Metric samples and the per-cycle output channel.
//!
//! Sub-collectors describe their metrics with prometheus [`Desc`]s and emit
//! [`MetricSample`]s onto a [`SampleSink`]. At the end of a cycle the samples
//! are folded into [`MetricFamily`] values for the text encoder.

use prometheus::core::Desc;
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tracing::error;

/// Namespace shared by every cluster metric.
pub const NAMESPACE: &str = "ceph";

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("invalid metric descriptor: {0}")]
    Descriptor(#[from] prometheus::Error),

    #[error("metric {name} expects {expected} label values, got {actual}")]
    LabelMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// Builds a descriptor carrying the constant `cluster` label.
pub fn cluster_desc(
    cluster: &str,
    name: &str,
    help: &str,
    variable_labels: &[&str],
) -> Result<Arc<Desc>, MetricsError> {
    let const_labels = HashMap::from([("cluster".to_string(), cluster.to_string())]);
    let desc = Desc::new(
        name.to_string(),
        help.to_string(),
        variable_labels.iter().map(|l| l.to_string()).collect(),
        const_labels,
    )?;
    Ok(Arc::new(desc))
}

/// One observation of a described metric.
#[derive(Debug, Clone)]
pub struct MetricSample {
    desc: Arc<Desc>,
    kind: MetricKind,
    value: f64,
    label_values: Vec<String>,
}

impl MetricSample {
    /// Creates a sample, checking the label values line up with the
    /// descriptor's variable labels.
    pub fn new(
        desc: &Arc<Desc>,
        kind: MetricKind,
        value: f64,
        label_values: &[&str],
    ) -> Result<Self, MetricsError> {
        if desc.variable_labels.len() != label_values.len() {
            return Err(MetricsError::LabelMismatch {
                name: desc.fq_name.clone(),
                expected: desc.variable_labels.len(),
                actual: label_values.len(),
            });
        }

        Ok(Self {
            desc: Arc::clone(desc),
            kind,
            value,
            label_values: label_values.iter().map(|v| v.to_string()).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Value of a variable label by name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .variable_labels
            .iter()
            .position(|l| l == name)
            .map(|i| self.label_values[i].as_str())
    }

    fn to_proto(&self) -> proto::Metric {
        let mut labels: Vec<LabelPair> = self.desc.const_label_pairs.clone();
        for (name, value) in self.desc.variable_labels.iter().zip(&self.label_values) {
            let mut pair = LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value(value.clone());
            labels.push(pair);
        }

        let mut metric = proto::Metric::default();
        metric.set_label(labels.into());
        match self.kind {
            MetricKind::Gauge => {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(self.value);
                metric.set_gauge(gauge);
            }
            MetricKind::Counter => {
                let mut counter = proto::Counter::default();
                counter.set_value(self.value);
                metric.set_counter(counter);
            }
        }
        metric
    }
}

/// Sending half of a cycle's output channel. Cheap to clone and safe to use
/// from fan-out workers.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: Sender<MetricSample>,
}

impl SampleSink {
    pub fn channel() -> (Self, Receiver<MetricSample>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, sample: MetricSample) {
        // The receiver outlives every cycle; a closed channel only happens
        // when the consumer has already given up on this cycle.
        let _ = self.tx.send(sample);
    }

    /// Emits a gauge, logging instead of failing when the labels do not
    /// match the descriptor.
    pub fn gauge(&self, desc: &Arc<Desc>, value: f64, label_values: &[&str]) {
        match MetricSample::new(desc, MetricKind::Gauge, value, label_values) {
            Ok(sample) => self.emit(sample),
            Err(e) => error!(error = %e, "dropping malformed sample"),
        }
    }
}

/// Groups samples into metric families, keeping first-seen family order.
pub fn into_families(samples: impl IntoIterator<Item = MetricSample>) -> Vec<MetricFamily> {
    let mut order: Vec<(Arc<Desc>, MetricKind, Vec<proto::Metric>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for sample in samples {
        let slot = *index.entry(sample.desc.fq_name.clone()).or_insert_with(|| {
            order.push((Arc::clone(&sample.desc), sample.kind, Vec::new()));
            order.len() - 1
        });
        order[slot].2.push(sample.to_proto());
    }

    order
        .into_iter()
        .map(|(desc, kind, metrics)| {
            let mut family = MetricFamily::default();
            family.set_name(desc.fq_name.clone());
            family.set_help(desc.help.clone());
            family.set_field_type(match kind {
                MetricKind::Gauge => MetricType::GAUGE,
                MetricKind::Counter => MetricType::COUNTER,
            });
            family.set_metric(metrics.into());
            family
        })
        .collect()
}
