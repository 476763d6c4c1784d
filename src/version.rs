//! Cluster version detection.
//!
//! Every scrape cycle starts by asking the monitors which Ceph release they
//! run. The parsed [`ClusterVersion`] lands in a [`VersionHolder`] owned by the
//! exporter and shared with the sub-collectors, which branch on it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::num::ParseIntError;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::conn::{mon_command_payload, Conn, ConnError};

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"ceph version (?P<major>\d+)\.(?P<minor>\d+)\.(?P<patch>\d+)(?:-(?P<revision>\d+)-g(?P<commit>[0-9a-f]+))?",
    )
    .expect("version regex is valid")
});

/// Ceph releases referenced by the collectors.
pub const LUMINOUS: (u32, u32, u32) = (12, 0, 0);
pub const NAUTILUS: (u32, u32, u32) = (14, 0, 0);

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("version command failed: {0}")]
    Command(#[from] ConnError),

    #[error("failed to decode version reply: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unrecognized ceph version string '{0}'")]
    Unrecognized(String),

    #[error("version component out of range: {0}")]
    Component(#[from] ParseIntError),
}

/// Parsed Ceph release, e.g. `ceph version 14.2.9-12-gabc1234 (...) nautilus (stable)`.
///
/// Equality and ordering use the numeric components only; `commit` and `raw`
/// are informational.
#[derive(Debug, Clone)]
pub struct ClusterVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub revision: u32,
    pub commit: String,
    pub raw: String,
}

impl ClusterVersion {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let caps = VERSION_RE
            .captures(raw)
            .ok_or_else(|| VersionError::Unrecognized(raw.to_string()))?;

        let revision = match caps.name("revision") {
            Some(m) => m.as_str().parse()?,
            None => 0,
        };

        Ok(Self {
            major: caps["major"].parse()?,
            minor: caps["minor"].parse()?,
            patch: caps["patch"].parse()?,
            revision,
            commit: caps
                .name("commit")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            raw: raw.to_string(),
        })
    }

    /// True when this release is `(major, minor, patch)` or newer.
    pub fn is_at_least(&self, (major, minor, patch): (u32, u32, u32)) -> bool {
        (self.major, self.minor, self.patch) >= (major, minor, patch)
    }

    fn key(&self) -> (u32, u32, u32, u32) {
        (self.major, self.minor, self.patch, self.revision)
    }
}

impl PartialEq for ClusterVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ClusterVersion {}

impl PartialOrd for ClusterVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClusterVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.commit.is_empty() {
            write!(f, "-{}-g{}", self.revision, self.commit)?;
        }
        Ok(())
    }
}

/// Single shared slot holding the most recently detected version.
///
/// Writes overwrite the previous value; a failed refresh leaves it untouched.
#[derive(Debug, Default)]
pub struct VersionHolder {
    slot: Mutex<Option<ClusterVersion>>,
}

impl VersionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<ClusterVersion> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, version: ClusterVersion) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(version);
    }
}

#[derive(Deserialize)]
struct VersionReply {
    version: String,
}

/// Issues the version query and publishes the result to the holder.
pub struct VersionGate {
    conn: Arc<dyn Conn>,
    holder: Arc<VersionHolder>,
}

impl VersionGate {
    pub fn new(conn: Arc<dyn Conn>, holder: Arc<VersionHolder>) -> Self {
        Self { conn, holder }
    }

    pub fn holder(&self) -> &Arc<VersionHolder> {
        &self.holder
    }

    pub fn refresh(&self) -> Result<ClusterVersion, VersionError> {
        let (buf, _) = self.conn.mon_command(&mon_command_payload("version"))?;
        let reply: VersionReply = serde_json::from_slice(&buf)?;
        let version = ClusterVersion::parse(&reply.version)?;

        debug!(version = %version, "detected ceph version");
        self.holder.set(version.clone());
        Ok(version)
    }
}
