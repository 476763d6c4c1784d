//! Cluster connection collaborator.
//!
//! The exporter talks to a Ceph cluster through the [`Conn`] trait: a single
//! request/response primitive that takes a JSON-encoded monitor command and
//! returns the raw reply. [`CliConn`] implements it on top of the `ceph`
//! command line tool so that no native librados binding is required.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Errors raised while talking to the cluster.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("invalid monitor command: {0}")]
    InvalidCommand(String),

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

/// Request/response access to the cluster monitors.
///
/// Implementations must be safe to share between the scrape cycle and the
/// gateway fan-out workers.
pub trait Conn: Send + Sync {
    /// Sends a JSON monitor command and returns the reply body together with
    /// the status string reported by the cluster.
    fn mon_command(&self, cmd: &[u8]) -> Result<(Vec<u8>, String), ConnError>;
}

/// Encodes a fixed monitor command requesting JSON output.
///
/// The payload is built from constants, so an encoding failure is a build
/// defect and panics.
pub fn mon_command_payload(prefix: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "prefix": prefix,
        "format": "json",
    }))
    .unwrap_or_else(|e| panic!("failed to marshal ceph {prefix} command: {e}"))
}

/// Ceph options passed on the command line to bound every remote operation.
/// A zero duration leaves the library defaults (no limit) in place.
pub(crate) fn op_timeout_args(timeout: Duration) -> Vec<String> {
    if timeout.is_zero() {
        return Vec::new();
    }
    let secs = timeout.as_secs().max(1).to_string();
    vec![
        "--rados-osd-op-timeout".to_string(),
        secs.clone(),
        "--rados-mon-op-timeout".to_string(),
        secs,
    ]
}

/// Runs a cluster tool and returns its stdout and stderr.
pub(crate) fn run_tool(program: &Path, args: &[String]) -> Result<(Vec<u8>, String), ConnError> {
    let name = program.display().to_string();
    debug!(program = %name, ?args, "running cluster command");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ConnError::Spawn {
            program: name.clone(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(ConnError::Failed {
            program: name,
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok((output.stdout, stderr))
}

/// [`Conn`] backed by the `ceph` CLI.
#[derive(Debug, Clone)]
pub struct CliConn {
    binary: PathBuf,
    user: String,
    config_file: PathBuf,
    op_timeout: Duration,
}

impl CliConn {
    pub fn new(
        binary: impl Into<PathBuf>,
        user: impl Into<String>,
        config_file: impl Into<PathBuf>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            user: user.into(),
            config_file: config_file.into(),
            op_timeout,
        }
    }

    /// Translates a JSON monitor command into `ceph` arguments.
    ///
    /// Only `prefix` and `format` are understood; commands carrying further
    /// arguments are rejected rather than guessed at.
    fn command_args(&self, cmd: &[u8]) -> Result<Vec<String>, ConnError> {
        let value: Value = serde_json::from_slice(cmd)
            .map_err(|e| ConnError::InvalidCommand(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| ConnError::InvalidCommand("command is not a JSON object".into()))?;

        let prefix = obj
            .get("prefix")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnError::InvalidCommand("missing prefix".into()))?;

        if let Some(extra) = obj.keys().find(|k| *k != "prefix" && *k != "format") {
            return Err(ConnError::InvalidCommand(format!(
                "unsupported argument '{extra}' for '{prefix}'"
            )));
        }

        let mut args = vec![
            "-c".to_string(),
            self.config_file.display().to_string(),
            "--user".to_string(),
            self.user.clone(),
        ];
        if !self.op_timeout.is_zero() {
            args.push("--connect-timeout".to_string());
            args.push(self.op_timeout.as_secs().max(1).to_string());
        }
        args.extend(op_timeout_args(self.op_timeout));
        args.extend(prefix.split_whitespace().map(str::to_string));

        let format = obj.get("format").and_then(Value::as_str).unwrap_or("json");
        args.push("--format".to_string());
        args.push(format.to_string());

        Ok(args)
    }
}

impl Conn for CliConn {
    fn mon_command(&self, cmd: &[u8]) -> Result<(Vec<u8>, String), ConnError> {
        let args = self.command_args(cmd)?;
        run_tool(&self.binary, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(timeout: Duration) -> CliConn {
        CliConn::new("ceph", "admin", "/etc/ceph/ceph.conf", timeout)
    }

    #[test]
    fn test_payload_is_json_with_prefix() {
        let payload = mon_command_payload("version");
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["prefix"], "version");
        assert_eq!(value["format"], "json");
    }

    #[test]
    fn test_command_args_split_prefix() {
        let args = conn(Duration::ZERO)
            .command_args(&mon_command_payload("osd df"))
            .unwrap();
        assert_eq!(
            args,
            vec![
                "-c",
                "/etc/ceph/ceph.conf",
                "--user",
                "admin",
                "osd",
                "df",
                "--format",
                "json"
            ]
        );
    }

    #[test]
    fn test_command_args_include_timeouts() {
        let args = conn(Duration::from_secs(30))
            .command_args(&mon_command_payload("df"))
            .unwrap();
        assert!(args.windows(2).any(|w| w == ["--connect-timeout", "30"]));
        assert!(args.windows(2).any(|w| w == ["--rados-mon-op-timeout", "30"]));
        assert!(args.windows(2).any(|w| w == ["--rados-osd-op-timeout", "30"]));
    }

    #[test]
    fn test_command_args_reject_extra_fields() {
        let cmd = br#"{"prefix":"osd pool get","pool":"rbd","format":"json"}"#;
        let err = conn(Duration::ZERO).command_args(cmd).unwrap_err();
        assert!(matches!(err, ConnError::InvalidCommand(_)));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let conn = CliConn::new(
            "/nonexistent/ceph-binary",
            "admin",
            "/etc/ceph/ceph.conf",
            Duration::ZERO,
        );
        let err = conn.mon_command(&mon_command_payload("version")).unwrap_err();
        assert!(matches!(err, ConnError::Spawn { .. }));
    }
}
