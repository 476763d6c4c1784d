//! In-memory cluster and gateway used by the integration tests.

#![allow(dead_code)]

use ceph_exporter::collectors::GatewayError;
use ceph_exporter::{Conn, ConnError, GatewayAdmin};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const NAUTILUS_VERSION: &str =
    "ceph version 14.2.9-12-gabcdef0 (abcdef0123456789) nautilus (stable)";

/// Answers `version`, `df` and `status` monitor commands.
pub struct FakeCluster {
    pub version: Mutex<String>,
    pub fail_version: AtomicBool,
    /// Delay applied to every command, to widen race windows.
    pub delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub commands: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            version: Mutex::new(NAUTILUS_VERSION.to_string()),
            fail_version: AtomicBool::new(false),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            commands: AtomicUsize::new(0),
        }
    }

    fn reply(&self, prefix: &str) -> Result<Value, ConnError> {
        match prefix {
            "version" if self.fail_version.load(Ordering::SeqCst) => {
                Err(ConnError::Unavailable("monitor unreachable".to_string()))
            }
            "version" => Ok(json!({ "version": self.version.lock().unwrap().clone() })),
            "df" => Ok(json!({
                "stats": {
                    "total_bytes": 1000,
                    "total_used_bytes": 100,
                    "total_used_raw_bytes": 300,
                    "total_avail_bytes": 700,
                    "total_objects": 42
                }
            })),
            "status" => Ok(json!({
                "health": { "status": "HEALTH_WARN", "overall_status": "HEALTH_ERR" }
            })),
            other => Err(ConnError::InvalidCommand(other.to_string())),
        }
    }
}

impl Conn for FakeCluster {
    fn mon_command(&self, cmd: &[u8]) -> Result<(Vec<u8>, String), ConnError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.commands.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let request: Value = serde_json::from_slice(cmd)
            .map_err(|e| ConnError::InvalidCommand(e.to_string()))?;
        let prefix = request["prefix"].as_str().unwrap_or_default().to_string();
        let result = self
            .reply(&prefix)
            .map(|v| (serde_json::to_vec(&v).unwrap(), String::new()));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Gateway with a fixed bucket list; buckets named in `failing` error out.
pub struct FakeGateway {
    pub buckets: Vec<(String, String)>,
    pub failing: HashSet<String>,
    pub fail_listing: bool,
    pub delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub lookups: AtomicUsize,
}

impl FakeGateway {
    pub fn new(buckets: &[(&str, &str)], failing: &[&str]) -> Self {
        Self {
            buckets: buckets
                .iter()
                .map(|(b, o)| (b.to_string(), o.to_string()))
                .collect(),
            failing: failing.iter().map(|b| b.to_string()).collect(),
            fail_listing: false,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn numbered(count: usize, failing: &[&str]) -> Self {
        let names: Vec<(String, String)> = (0..count)
            .map(|i| (format!("bucket-{i}"), format!("user-{}", i % 3)))
            .collect();
        let refs: Vec<(&str, &str)> = names.iter().map(|(b, o)| (b.as_str(), o.as_str())).collect();
        Self::new(&refs, failing)
    }
}

impl GatewayAdmin for FakeGateway {
    fn list_bucket_stats(&self) -> Result<Vec<u8>, GatewayError> {
        if self.fail_listing {
            return Err(ConnError::Unavailable("gateway unreachable".to_string()).into());
        }
        let stats: Vec<Value> = self
            .buckets
            .iter()
            .map(|(bucket, owner)| json!({ "bucket": bucket, "owner": owner, "num_shards": 1 }))
            .collect();
        Ok(serde_json::to_vec(&stats).unwrap())
    }

    fn show_bucket_usage(&self, bucket: &str, owner: &str) -> Result<Vec<u8>, GatewayError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(bucket) {
            return Err(ConnError::Unavailable(format!("usage of {bucket} unavailable")).into());
        }
        let usage = json!({
            "entries": [],
            "summary": [{
                "user": owner,
                "categories": [{
                    "category": "put_obj",
                    "bytes_sent": 100,
                    "bytes_received": 50,
                    "ops": 5,
                    "successful_ops": 5
                }]
            }]
        });
        Ok(serde_json::to_vec(&usage).unwrap())
    }
}

/// `io::Write` target collecting formatted log output.
#[derive(Clone, Default)]
pub struct LogBuffer(pub Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber writing plain-text logs into the returned buffer.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();

    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.contents())
}
