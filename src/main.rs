//! ceph-exporter - version 0.1.0
//!
//! Prometheus exporter for Ceph clusters with tracing logging.
//! This is the main entry point that resolves configuration, builds one
//! exporter per cluster and serves them over HTTP.

mod cli;
mod config;
mod handlers;
mod state;

use axum::{routing::get, Router};
use ceph_exporter::{CliConn, Exporter, ExporterOptions, FailFastListener, GatewayMode, RadosGwAdmin};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Level};

use cli::{Args, LogLevel};
use config::{resolve_config, show_config, validate_effective_config, Config};
use handlers::{metrics_handler, root_handler};
use state::AppState;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(level: &LogLevel) {
    let log_level = match level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    };

    let Some(log_level) = log_level else {
        return;
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
        return;
    }

    info!("Logging initialized with level: {:?}", level);
}

/// Logs a startup failure and terminates the process.
fn fatal(context: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", context, err);
    std::process::exit(1);
}

/// Builds one exporter per configured cluster.
fn build_exporters(config: &Config) -> Vec<Arc<Exporter>> {
    let options = ExporterOptions {
        gateway_mode: GatewayMode::from(config.rgw_mode),
        gateway_concurrency: config.rgw_concurrency,
        gateway_interval: config.rgw_interval,
    };

    config
        .clusters
        .iter()
        .map(|cluster| {
            let conn = Arc::new(CliConn::new(
                &config.ceph_binary,
                &cluster.user,
                &cluster.config_file,
                config.rados_op_timeout,
            ));
            let admin = Arc::new(RadosGwAdmin::new(
                &config.radosgw_admin_binary,
                &cluster.config_file,
                &cluster.user,
                config.rados_op_timeout,
            ));

            let exporter = Exporter::new(cluster.clone(), conn, admin, &options);
            info!(
                cluster = %cluster.cluster_label,
                config = %cluster.config_file.display(),
                collectors = exporter.collectors().len(),
                "exporting cluster"
            );
            Arc::new(exporter)
        })
        .collect()
}

/// Describes every cluster once on the blocking pool and logs the outcome.
/// Serving does not wait for it.
fn spawn_startup_describe(exporters: &[Arc<Exporter>]) {
    for exporter in exporters {
        let exporter = Arc::clone(exporter);
        tokio::task::spawn_blocking(move || {
            let cluster = &exporter.cluster().cluster_label;
            let descriptors = exporter.describe().len();
            if descriptors == 0 {
                warn!(cluster = %cluster, "cluster not reachable yet, metrics will appear once it is");
            } else {
                info!(cluster = %cluster, descriptors, "cluster reachable");
            }
        });
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main entry point: parses CLI arguments and starts the HTTP server.
#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Config-only modes print to stdout/stderr and never start logging.
    if args.check_config {
        match resolve_config(&args).and_then(|cfg| validate_effective_config(&cfg)) {
            Ok(()) => {
                println!("✅ Configuration is valid");
                return;
            }
            Err(e) => {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
        }
    }

    if args.show_config {
        let result = resolve_config(&args).and_then(|cfg| show_config(&cfg, args.config_format.clone()));
        if let Err(e) = result {
            eprintln!("❌ Failed to show configuration: {}", e);
            std::process::exit(1);
        }
        return;
    }

    setup_logging(&args.log_level);

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => fatal("failed to load cluster configuration", e),
    };
    if let Err(e) = validate_effective_config(&config) {
        fatal("configuration invalid", e);
    }

    info!(
        "Starting ceph-exporter v{} with {} cluster(s)",
        env!("CARGO_PKG_VERSION"),
        config.clusters.len()
    );

    let exporters = build_exporters(&config);
    spawn_startup_describe(&exporters);
    let state = match AppState::new(exporters, config.metrics_path.clone()) {
        Ok(state) => Arc::new(state),
        Err(e) => fatal("failed to register exporter metrics", e),
    };

    let app = Router::new()
        .route("/", get(root_handler))
        .route(&config.metrics_path, get(metrics_handler))
        .with_state(state);

    let listener = match FailFastListener::bind(config.listen_addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => fatal(&format!("failed to listen on {}", config.listen_addr), e),
    };

    info!(
        "ceph-exporter listening on http://{}{}",
        config.listen_addr, config.metrics_path
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        fatal("server error", e);
    }

    info!("ceph-exporter stopped gracefully");
}
