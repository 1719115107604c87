use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use sealbox_server::api::version::VersionInfo;
use sealbox_server::blob::BlobStore;
use sealbox_server::config::Config;
use sealbox_server::db::items::Store;
use sealbox_server::db::pool;
use sealbox_server::engine::Engine;
use sealbox_server::pages::Pages;
use sealbox_server::state::AppState;
use sealbox_server::{api, reaper};

#[derive(Parser)]
#[command(
    name = "sealbox",
    about = "Ephemeral self-destructing secret-sharing service",
    version = VersionInfo::current().to_string()
)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log file (default stdout)
    #[arg(long)]
    log: Option<PathBuf>,
}

fn init_tracing(log: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sealbox_server=info,tower_http=info"));

    match log {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path.file_name().unwrap_or(path.as_os_str());
            let appender =
                tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log.as_deref());

    let version = VersionInfo::current();
    tracing::info!(version = version.version, revision = version.revision, "sealbox starting");

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration failed");
            std::process::exit(1);
        }
    };

    let db_pool = match pool::create_pool(&config.storage.file, config.db_timeout()).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "failed to open database");
            std::process::exit(1);
        }
    };
    if let Err(e) = pool::run_migrations(&db_pool).await {
        tracing::error!(error = %e, "failed to run migrations");
        std::process::exit(1);
    }
    let store = Store::new(db_pool);

    let blobs = BlobStore::new(config.storage.dir.clone(), config.capacity_bytes());
    match blobs.initialize().await {
        Ok(used) => tracing::info!(
            used,
            capacity = config.capacity_bytes(),
            dir = %config.storage.dir.display(),
            "blob store initialized"
        ),
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize blob store");
            std::process::exit(1);
        }
    }

    let pages = match Pages::load(config.settings.templates_dir.as_deref()) {
        Ok(pages) => pages,
        Err(e) => {
            tracing::error!(error = %e, "failed to load templates");
            std::process::exit(1);
        }
    };

    let (hint_tx, hint_rx) = mpsc::channel(reaper::QUEUE_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper_handle = reaper::spawn(
        store.clone(),
        blobs.clone(),
        config.gc_period(),
        hint_rx,
        shutdown_rx,
    );

    let engine = Engine::new(
        store.clone(),
        blobs,
        hint_tx,
        config.settings.salt.clone(),
        config.settings.password_length,
        config.max_file_bytes(),
    );

    let state = Arc::new(AppState {
        engine,
        store,
        pages,
        ttl_max: config.settings.ttl_max_seconds,
        times_max: config.settings.times_max,
        max_file_megabytes: config.settings.max_file_size_megabytes,
        secure: config.server.secure,
        static_dir: config.settings.static_dir.clone(),
        request_timeout: config.request_timeout(),
    });
    let router = api::build_router(state);

    let addr = config.addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "sealbox listening");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    // HTTP handlers are drained; stop the reaper and give it the bounded
    // shutdown window to finish an in-flight sweep.
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(config.shutdown_timeout(), reaper_handle)
        .await
        .is_err()
    {
        tracing::warn!("reaper did not stop within the shutdown timeout");
    }
    tracing::info!("sealbox stopped");
}
