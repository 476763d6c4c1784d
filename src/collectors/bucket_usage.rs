//! Per-bucket usage statistics from the RADOS Gateway.
//!
//! Collection enumerates buckets with one call, then looks up the usage of
//! every bucket concurrently on a bounded worker pool. Samples are emitted
//! straight from the workers; failed buckets are logged, collected into a
//! [`FanoutError`] and simply produce no samples.
//!
//! In background mode the same scan runs periodically on a dedicated thread
//! and `collect` replays the most recent result.

use prometheus::core::Desc;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::metrics::{cluster_desc, MetricSample, SampleSink, NAMESPACE};

use super::gateway::{BucketStats, BucketUsage, GatewayAdmin, GatewayError};
use super::SubCollector;

const SUBSYSTEM: &str = "bucket_usage";
const BUCKET_LABELS: [&str; 3] = ["bucket", "user", "category"];

/// Shortest pause between two background scans.
pub const MIN_BACKGROUND_INTERVAL: Duration = Duration::from_secs(1);

/// A single bucket whose usage lookup failed.
#[derive(Debug)]
pub struct BucketFailure {
    pub bucket: String,
    pub error: GatewayError,
}

/// Aggregated outcome of a fan-out with at least one failed bucket.
///
/// Every failure is kept, in bucket enumeration order; the first one is
/// reported as the cause.
#[derive(Debug)]
pub struct FanoutError {
    pub total: usize,
    pub failures: Vec<BucketFailure>,
}

impl FanoutError {
    pub fn failed_buckets(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.bucket.as_str())
    }
}

impl fmt::Display for FanoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} bucket usage lookups failed",
            self.failures.len(),
            self.total
        )?;
        if let Some(first) = self.failures.first() {
            write!(f, " (first: {}: {})", first.bucket, first.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for FanoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}

/// The enumerate / fan-out / join pass shared by both modes.
struct UsageScan {
    cluster: String,
    admin: Arc<dyn GatewayAdmin>,
    pool: ThreadPool,

    /// Number of bytes sent by the RADOS Gateway.
    bytes_sent: Arc<Desc>,
    /// Number of bytes received by the RADOS Gateway.
    bytes_received: Arc<Desc>,
    /// Number of operations.
    ops: Arc<Desc>,
    /// Number of successful operations.
    successful_ops: Arc<Desc>,
}

impl UsageScan {
    fn new(
        cluster: &str,
        admin: Arc<dyn GatewayAdmin>,
        concurrency: usize,
    ) -> Result<Self, GatewayError> {
        let desc = |metric: &str, help: &str| {
            cluster_desc(
                cluster,
                &format!("{NAMESPACE}_{SUBSYSTEM}_{metric}"),
                help,
                &BUCKET_LABELS,
            )
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("bucket-usage-{i}"))
            .build()?;

        Ok(Self {
            cluster: cluster.to_string(),
            admin,
            pool,
            bytes_sent: desc("bytes_sent", "Number of bytes sent by the RADOS Gateway.")?,
            bytes_received: desc(
                "bytes_received",
                "Number of bytes received by the RADOS Gateway.",
            )?,
            ops: desc("ops", "Number of operations.")?,
            successful_ops: desc("successful_ops", "Number of successful operations.")?,
        })
    }

    fn descs(&self) -> Vec<&Desc> {
        vec![
            self.bytes_sent.as_ref(),
            self.bytes_received.as_ref(),
            self.ops.as_ref(),
            self.successful_ops.as_ref(),
        ]
    }

    /// Runs one full pass. Returns the number of buckets scanned.
    fn run(&self, sink: &SampleSink) -> Result<usize, GatewayError> {
        let buf = self.admin.list_bucket_stats().inspect_err(|e| {
            error!(cluster = %self.cluster, error = %e, "error listing bucket stats");
        })?;
        let buckets: Vec<BucketStats> = serde_json::from_slice(&buf)?;
        debug!(cluster = %self.cluster, buckets = buckets.len(), "fanning out bucket usage lookups");

        let outcomes: Vec<Result<(), BucketFailure>> = self.pool.install(|| {
            buckets
                .par_iter()
                .map(|bucket| {
                    self.scan_bucket(bucket, sink).map_err(|error| {
                        error!(
                            cluster = %self.cluster,
                            bucket = %bucket.bucket,
                            error = %error,
                            "error getting bucket usage"
                        );
                        BucketFailure {
                            bucket: bucket.bucket.clone(),
                            error,
                        }
                    })
                })
                .collect()
        });

        let failures: Vec<BucketFailure> = outcomes.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            Ok(buckets.len())
        } else {
            Err(FanoutError {
                total: buckets.len(),
                failures,
            }
            .into())
        }
    }

    fn scan_bucket(&self, bucket: &BucketStats, sink: &SampleSink) -> Result<(), GatewayError> {
        let buf = self.admin.show_bucket_usage(&bucket.bucket, &bucket.owner)?;
        let usage: BucketUsage = serde_json::from_slice(&buf)?;

        for summary in &usage.summary {
            for category in &summary.categories {
                let labels = [
                    bucket.bucket.as_str(),
                    summary.user.as_str(),
                    category.category.as_str(),
                ];
                sink.gauge(&self.bytes_sent, category.bytes_sent as f64, &labels);
                sink.gauge(&self.bytes_received, category.bytes_received as f64, &labels);
                sink.gauge(&self.ops, category.ops as f64, &labels);
                sink.gauge(&self.successful_ops, category.successful_ops as f64, &labels);
            }
        }
        Ok(())
    }
}

/// Periodic scan thread plus the samples of its latest pass.
struct BackgroundScan {
    latest: Arc<Mutex<Vec<MetricSample>>>,
    // Dropping the sender disconnects the channel and stops the thread.
    _stop: mpsc::Sender<()>,
}

impl BackgroundScan {
    fn spawn(scan: Arc<UsageScan>, interval: Duration) -> std::io::Result<Self> {
        let latest = Arc::new(Mutex::new(Vec::new()));
        let (stop, stopped) = mpsc::channel::<()>();
        let shared = Arc::clone(&latest);

        thread::Builder::new()
            .name(format!("bucket-usage-{}", scan.cluster))
            .spawn(move || loop {
                let start = Instant::now();
                let (sink, rx) = SampleSink::channel();
                let result = scan.run(&sink);
                drop(sink);
                let samples: Vec<MetricSample> = rx.into_iter().collect();

                match result {
                    Ok(buckets) => debug!(
                        cluster = %scan.cluster,
                        buckets,
                        samples = samples.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "background bucket usage scan finished"
                    ),
                    Err(e) => error!(
                        cluster = %scan.cluster,
                        error = %e,
                        "error collecting bucket usage metrics in background"
                    ),
                }
                *shared.lock().unwrap_or_else(PoisonError::into_inner) = samples;

                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!(cluster = %scan.cluster, "background bucket usage scan stopped");
                        break;
                    }
                }
            })?;

        Ok(Self {
            latest,
            _stop: stop,
        })
    }

    fn latest(&self) -> Vec<MetricSample> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Gateway statistics collector: per-bucket, per-category usage.
pub struct BucketUsageCollector {
    scan: Arc<UsageScan>,
    background: Option<BackgroundScan>,
}

impl BucketUsageCollector {
    /// Collector that scans inline during every cycle.
    pub fn new(
        cluster: &str,
        admin: Arc<dyn GatewayAdmin>,
        concurrency: usize,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            scan: Arc::new(UsageScan::new(cluster, admin, concurrency)?),
            background: None,
        })
    }

    /// Collector that scans every `interval` on its own thread.
    /// Intervals below [`MIN_BACKGROUND_INTERVAL`] are raised to it.
    pub fn background(
        cluster: &str,
        admin: Arc<dyn GatewayAdmin>,
        concurrency: usize,
        interval: Duration,
    ) -> Result<Self, GatewayError> {
        if interval < MIN_BACKGROUND_INTERVAL {
            warn!(
                cluster,
                interval_ms = interval.as_millis() as u64,
                "background scan interval too short, using {}s",
                MIN_BACKGROUND_INTERVAL.as_secs()
            );
        }
        let interval = interval.max(MIN_BACKGROUND_INTERVAL);
        let scan = Arc::new(UsageScan::new(cluster, admin, concurrency)?);
        let background = BackgroundScan::spawn(Arc::clone(&scan), interval)?;
        info!(cluster, interval_secs = interval.as_secs(), "bucket usage collection running in background");

        Ok(Self {
            scan,
            background: Some(background),
        })
    }

    /// Runs one inline pass, returning the aggregated error if any bucket
    /// failed. Samples of successful buckets are emitted either way.
    pub fn scan(&self, sink: &SampleSink) -> Result<usize, GatewayError> {
        self.scan.run(sink)
    }
}

impl SubCollector for BucketUsageCollector {
    fn name(&self) -> &'static str {
        SUBSYSTEM
    }

    fn describe(&self) -> Vec<&Desc> {
        self.scan.descs()
    }

    fn collect(&self, sink: &SampleSink) {
        if let Some(background) = &self.background {
            for sample in background.latest() {
                sink.emit(sample);
            }
            return;
        }

        debug!(cluster = %self.scan.cluster, "collecting bucket usage metrics");
        if let Err(e) = self.scan.run(sink) {
            error!(cluster = %self.scan.cluster, error = %e, "error collecting bucket usage metrics");
        }
    }

    fn is_background(&self) -> bool {
        self.background.is_some()
    }
}
