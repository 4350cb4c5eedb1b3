use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use fs2::FileExt;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use peerhttp_engine::LocalEngine;
use peerhttp_registry::SessionRegistry;
use peerhttp_rpc::{start_server, AppState, GatewayConfig};
use peerhttp_storage::SledStore;
use tempfile::TempDir;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod version;

use config::AppConfig;
use version::{git_commit_hash, PEERHTTP_VERSION};

fn cli() -> Command {
    Command::new("peerhttp-node")
        .version(PEERHTTP_VERSION)
        .about("Serve torrent session content over plain HTTP")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Override the HTTP bind host"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override the HTTP port"),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Work directory for the session database (temporary if unset)"),
        )
        .arg(
            Arg::new("library-dir")
                .long("library-dir")
                .value_name("DIR")
                .help("Directory whose entries are served as sessions"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format"),
        )
        .arg(
            Arg::new("request-timeout-secs")
                .long("request-timeout-secs")
                .value_name("SECS")
                .value_parser(value_parser!(u64))
                .help("How long a request may wait for session metadata"),
        )
        .arg(
            Arg::new("disable-metrics")
                .long("disable-metrics")
                .action(ArgAction::SetTrue)
                .help("Do not start the Prometheus exporter"),
        )
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = AppConfig::load(config_path.as_deref())?;
    config.apply_overrides(matches);
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config = load_config_with_overrides(&matches)?;

    init_logging(&config)?;
    init_metrics(&config);
    info!(
        version = PEERHTTP_VERSION,
        commit = git_commit_hash(),
        "starting peerhttp node"
    );

    let work_dir = WorkDir::prepare(config.storage.data_dir.as_deref())?;
    let _lock = DataDirLock::acquire(work_dir.path())?;

    let store = SledStore::open_in(
        work_dir.path(),
        Duration::from_secs(config.storage.open_timeout_secs),
    )
    .await
    .with_context(|| format!("failed to open session store in {}", work_dir.path().display()))?;

    let engine = match &config.engine.library_dir {
        Some(dir) => {
            let engine = LocalEngine::with_library(dir);
            let count = engine
                .scan()
                .await
                .with_context(|| format!("failed to scan library {}", dir.display()))?;
            info!(library = %dir.display(), sessions = count, "library scanned");
            engine
        }
        None => {
            warn!("no library directory configured; only stored sessions can be served");
            LocalEngine::new()
        }
    };

    let registry = SessionRegistry::new(
        Arc::new(engine),
        Arc::new(store),
        config.engine.peer_hints.clone(),
    );
    registry.load().context("failed to load stored sessions")?;

    let state = AppState::new(
        registry.clone(),
        GatewayConfig {
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            cors_origins: config.server.cors_origins.clone(),
        },
    );

    let addr = config.bind_addr();
    info!(addr = %addr, "gateway ready");
    start_server(state, &addr, shutdown_signal()).await?;

    info!("shutting down");
    registry.close().context("failed to flush session store")?;
    work_dir.cleanup()?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received interrupt"),
        Err(err) => warn!(error = %err, "failed to listen for interrupt"),
    }
}

fn init_metrics(config: &AppConfig) {
    if !config.metrics.enabled {
        info!("Prometheus metrics exporter disabled via configuration");
        return;
    }

    let listen: SocketAddr = match config.metrics.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            warn!(listen = %config.metrics.listen, error = %err, "invalid metrics address");
            return;
        }
    };

    match PrometheusBuilder::new().with_http_listener(listen).install() {
        Ok(()) => {
            info!(listen = %listen, "Prometheus metrics exporter registered");
            describe_counter!(
                "peerhttp_http_requests_total",
                "Gateway requests by route"
            );
            describe_counter!(
                "peerhttp_registry_persisted_total",
                "Session descriptors written to the store"
            );
            describe_counter!(
                "peerhttp_registry_track_timeouts_total",
                "Tracking calls that gave up waiting for metadata"
            );
            describe_counter!(
                "peerhttp_stream_failures_total",
                "Content responses that failed with an I/O error"
            );
            describe_gauge!("peerhttp_registry_sessions", "Sessions currently indexed");
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log.level))?;

    if config.log.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

/// Session database directory: the configured one, or a temporary directory
/// removed on shutdown.
enum WorkDir {
    Configured(PathBuf),
    Temporary(TempDir),
}

impl WorkDir {
    fn prepare(configured: Option<&Path>) -> Result<Self> {
        match configured {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create data dir {}", dir.display()))?;
                Ok(Self::Configured(dir.to_path_buf()))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("peerhttp-")
                    .tempdir()
                    .context("failed to create temporary work dir")?;
                info!(dir = %dir.path().display(), "using temporary work dir");
                Ok(Self::Temporary(dir))
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            Self::Configured(dir) => dir,
            Self::Temporary(dir) => dir.path(),
        }
    }

    fn cleanup(self) -> Result<()> {
        if let Self::Temporary(dir) = self {
            let path = dir.path().to_path_buf();
            dir.close()
                .with_context(|| format!("failed to remove work dir {}", path.display()))?;
            info!(dir = %path.display(), "removed temporary work dir");
        }
        Ok(())
    }
}

struct DataDirLock {
    path: PathBuf,
    file: File,
}

impl DataDirLock {
    fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let lock_path = dir.join(".peerhttp.lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&lock_path)?;

        if let Err(err) = file.try_lock_exclusive() {
            return Err(anyhow!(
                "Data directory {} is locked by another process ({}). \
                 Stop the running node or remove {} if you are sure it is stale.",
                dir.display(),
                err,
                lock_path.display()
            ));
        }

        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        file.set_len(0)?;
        writeln!(&file, "pid={};started={}", std::process::id(), started)?;

        Ok(Self {
            path: lock_path,
            file,
        })
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = fs::remove_file(&self.path);
    }
}
