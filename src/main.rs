//! Scan Ingest
//!
//! Watches a directory for scanned documents and ingests them into SQLite,
//! and serves synchronous OCR extraction over HTTP.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scan_ingest::config::Config;
use scan_ingest::db::{self, SqliteStore};
use scan_ingest::ingest::IngestOrchestrator;
use scan_ingest::ocr::OcrAdapter;
use scan_ingest::pages::PageNormalizer;
use scan_ingest::pdf::MupdfRasterizer;
use scan_ingest::routes;
use scan_ingest::state::AppState;
use scan_ingest::watcher::{DirectoryWatcher, WatchError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "scan_ingest=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Starting Scan Ingest v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Watch directory: {}", config.watch.dir.display());
    tracing::info!("OCR backend: {:?}", config.ocr.backend);

    let processed_dir = config.watch.processed_dir();
    tokio::fs::create_dir_all(&processed_dir)
        .await
        .with_context(|| format!("Failed to create {}", processed_dir.display()))?;

    // Initialize database
    let pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    // Extraction pipeline
    let ocr = Arc::new(OcrAdapter::new(&config.ocr.adapter_config()));
    if !ocr.is_available().await {
        tracing::warn!("OCR backend {:?} is not reachable yet; files will fail until it is", ocr.backend_kind());
    }
    let rasterizer = Arc::new(MupdfRasterizer::new(config.pdf.render_scale));
    let normalizer = Arc::new(PageNormalizer::new(ocr, rasterizer));

    let orchestrator = Arc::new(IngestOrchestrator::new(
        normalizer.clone(),
        Arc::new(SqliteStore::new(pool)),
        processed_dir,
        config.ocr.options.clone(),
    ));

    let cancel = CancellationToken::new();

    // Watcher
    let watcher = DirectoryWatcher::new(config.watch.watcher_config(), orchestrator);
    let watcher_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { watcher.run(cancel).await })
    };

    // HTTP server
    let app_state = AppState::new(
        normalizer,
        config.ocr.options.clone(),
        std::env::temp_dir(),
        config.server.upload_max_bytes,
    );
    let app = routes::app(app_state);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Scan Ingest listening on {}", addr);

    let server_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
        })
    };

    let signal_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        })
    };

    let result = supervise(server_task, watcher_task, cancel).await;
    signal_task.abort();
    result?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for the server or the watcher to finish, then stop the other.
///
/// A watcher that ends on its own is logged when it happens and shuts the
/// process down; its error takes precedence over the server's.
async fn supervise(
    mut server_task: JoinHandle<std::io::Result<()>>,
    mut watcher_task: JoinHandle<Result<(), WatchError>>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tokio::select! {
        joined = &mut watcher_task => {
            let watcher = watcher_exit(joined);
            match &watcher {
                Err(e) => tracing::error!("{:#}; shutting down", e),
                Ok(()) if !cancel.is_cancelled() => tracing::warn!("Watcher stopped; shutting down"),
                Ok(()) => {}
            }
            cancel.cancel();
            let server = server_exit(server_task.await);
            watcher.and(server)
        }
        joined = &mut server_task => {
            cancel.cancel();
            let server = server_exit(joined);
            let watcher = watcher_exit(watcher_task.await);
            if let Err(e) = &watcher {
                tracing::error!("{:#}", e);
            }
            watcher.and(server)
        }
    }
}

fn watcher_exit(joined: Result<Result<(), WatchError>, JoinError>) -> anyhow::Result<()> {
    joined
        .context("Watcher task failed")?
        .context("Directory watcher failed")
}

fn server_exit(joined: Result<std::io::Result<()>, JoinError>) -> anyhow::Result<()> {
    joined
        .context("HTTP server task failed")?
        .context("HTTP server failed")
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn idle_server(cancel: &CancellationToken) -> JoinHandle<std::io::Result<()>> {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_watcher_failure_stops_server() {
        let cancel = CancellationToken::new();
        let server = idle_server(&cancel);
        let watcher = tokio::spawn(async {
            Err(WatchError::Io {
                path: PathBuf::from("/srv/scans"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            })
        });

        let result = tokio::time::timeout(Duration::from_secs(5), supervise(server, watcher, cancel.clone()))
            .await
            .unwrap();

        assert!(result.is_err());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_request_stops_both() {
        let cancel = CancellationToken::new();
        let server = idle_server(&cancel);
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                Ok(())
            })
        };

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), supervise(server, watcher, cancel))
            .await
            .unwrap();

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_server_failure_stops_watcher() {
        let cancel = CancellationToken::new();
        let server = tokio::spawn(async { Err(std::io::Error::new(std::io::ErrorKind::Other, "accept failed")) });
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                Ok(())
            })
        };

        let result = tokio::time::timeout(Duration::from_secs(5), supervise(server, watcher, cancel.clone()))
            .await
            .unwrap();

        assert!(result.is_err());
        assert!(cancel.is_cancelled());
    }
}
