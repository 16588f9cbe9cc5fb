//! Watcher Module
//!
//! Watches one directory (non-recursively) for new scans, waits for each to
//! finish being written, and hands it to the ingestion orchestrator. Files
//! are processed one at a time, in arrival order.

mod stabilize;

pub use stabilize::{
    wait_for_stable_size, FsProbe, SizeProbe, StabilizeError, StabilizePolicy, Stabilized,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ingest::{IngestOrchestrator, IngestOutcome};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to watch directory: {0}")]
    Notify(#[from] notify::Error),

    #[error("Failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub watch_dir: PathBuf,
    /// Extensions picked up by the startup sweep
    pub sweep_extensions: Vec<String>,
    /// Extensions picked up from live events
    pub live_extensions: Vec<String>,
    pub stabilize: StabilizePolicy,
}

pub struct DirectoryWatcher {
    config: WatcherConfig,
    orchestrator: Arc<IngestOrchestrator>,
    probe: Arc<dyn SizeProbe>,
}

impl DirectoryWatcher {
    pub fn new(config: WatcherConfig, orchestrator: Arc<IngestOrchestrator>) -> Self {
        Self::with_probe(config, orchestrator, Arc::new(FsProbe))
    }

    pub fn with_probe(
        config: WatcherConfig,
        orchestrator: Arc<IngestOrchestrator>,
        probe: Arc<dyn SizeProbe>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            probe,
        }
    }

    /// Sweep existing files, then watch for new ones until cancelled.
    ///
    /// Only failing to list or watch the directory is an error; per-file
    /// failures are logged and the loop continues.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), WatchError> {
        // Register before sweeping; events buffer in the channel until the sweep is done.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.config.watch_dir, RecursiveMode::NonRecursive)?;

        self.sweep(&cancel).await?;

        tracing::info!("Watching {} for new scans", self.config.watch_dir.display());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(Ok(event)) => {
                        if let Some(path) = arrival_path(&event) {
                            self.handle_arrival(&path, &cancel).await;
                        }
                    }
                    Some(Err(e)) => tracing::warn!("Watch error: {}", e),
                    None => break,
                }
            }
        }

        tracing::info!("Stopped watching {}", self.config.watch_dir.display());
        Ok(())
    }

    /// Ingest every matching file already in the directory, sorted by name,
    /// without waiting for stabilization.
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<Vec<IngestOutcome>, WatchError> {
        let dir = &self.config.watch_dir;
        let io_err = |source| WatchError::Io {
            path: dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            // Follows symlinks
            let is_file = tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false);
            if is_file && has_extension(&path, &self.config.sweep_extensions) {
                paths.push(path);
            }
        }
        paths.sort();

        tracing::info!("Startup sweep found {} files in {}", paths.len(), dir.display());

        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            if cancel.is_cancelled() {
                break;
            }
            outcomes.push(self.orchestrator.process(&path).await);
        }

        Ok(outcomes)
    }

    async fn handle_arrival(&self, path: &Path, cancel: &CancellationToken) -> Option<IngestOutcome> {
        if !has_extension(path, &self.config.live_extensions) {
            tracing::debug!("Ignoring {}", path.display());
            return None;
        }

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => return None,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("{} disappeared before polling: {}", path.display(), e);
                return None;
            }
        }

        tracing::info!("New file {}, waiting for it to stabilize", path.display());

        match wait_for_stable_size(path, &self.config.stabilize, self.probe.as_ref(), cancel).await {
            Ok(_) => Some(self.orchestrator.process(path).await),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Path of a file that appeared in the directory, if the event is an arrival.
///
/// A rename inside the directory is reported as `To` and again as `Both`;
/// only `To` counts so the file is dispatched once.
fn arrival_path(event: &Event) -> Option<PathBuf> {
    match event.kind {
        EventKind::Create(_) => event.paths.first().cloned(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.first().cloned(),
        _ => None,
    }
}

/// Case-insensitive extension match
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, SqliteStore};
    use crate::ocr::{
        region, OcrAdapter, OcrBackend, OcrBackendKind, OcrError, OcrImage, OcrOptions, Region,
        ScriptedBackend,
    };
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat};
    use crate::pages::PageNormalizer;
    use crate::pdf::FixedRasterizer;
    use notify::event::{CreateKind, RemoveKind};
    use std::time::Duration;
    use tempfile::TempDir;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn watcher(dir: &TempDir, backend: Arc<dyn OcrBackend>) -> DirectoryWatcher {
        let adapter = OcrAdapter::with_backend(backend, OcrOptions::default());
        let normalizer = PageNormalizer::new(
            Arc::new(adapter),
            Arc::new(FixedRasterizer {
                pages: vec![(100, 100)],
            }),
        );
        let store = Arc::new(SqliteStore::new(memory_pool().await));
        let orchestrator = IngestOrchestrator::new(
            Arc::new(normalizer),
            store,
            dir.path().join("processed"),
            OcrOptions::default(),
        );

        DirectoryWatcher::new(
            WatcherConfig {
                watch_dir: dir.path().to_path_buf(),
                sweep_extensions: exts(&["pdf"]),
                live_extensions: exts(&["pdf", "png", "jpg", "jpeg", "gif"]),
                stabilize: StabilizePolicy {
                    interval: Duration::from_millis(50),
                    max_attempts: Some(100),
                },
            },
            Arc::new(orchestrator),
        )
    }

    #[test]
    fn test_has_extension() {
        let allowed = exts(&["pdf", "png"]);
        assert!(has_extension(Path::new("/w/a.pdf"), &allowed));
        assert!(has_extension(Path::new("/w/A.PNG"), &allowed));
        assert!(!has_extension(Path::new("/w/a.txt"), &allowed));
        assert!(!has_extension(Path::new("/w/pdf"), &allowed));
    }

    #[test]
    fn test_arrival_path() {
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/w/a.pdf"));
        assert_eq!(arrival_path(&create), Some(PathBuf::from("/w/a.pdf")));

        let renamed_to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/w/a.pdf"));
        assert_eq!(arrival_path(&renamed_to), Some(PathBuf::from("/w/a.pdf")));

        // Same rename, paired form
        let renamed_both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/w/a.tmp"))
            .add_path(PathBuf::from("/w/a.pdf"));
        assert_eq!(arrival_path(&renamed_both), None);

        let renamed_from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/w/a.pdf"));
        assert_eq!(arrival_path(&renamed_from), None);

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("/w/a.pdf"));
        assert_eq!(arrival_path(&remove), None);
    }

    #[tokio::test]
    async fn test_sweep_takes_sorted_pdfs_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF b").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"%PDF a").unwrap();
        std::fs::write(dir.path().join("c.png"), b"png").unwrap();
        std::fs::create_dir(dir.path().join("folder.pdf")).unwrap();

        let watcher = watcher(&dir, Arc::new(ScriptedBackend::new(Vec::new()))).await;
        let outcomes = watcher.sweep(&CancellationToken::new()).await.unwrap();

        let sources: Vec<PathBuf> = outcomes
            .iter()
            .map(|o| match o {
                IngestOutcome::Ingested(report) => report.source.clone(),
                IngestOutcome::Failed { path, .. } => path.clone(),
            })
            .collect();
        assert_eq!(sources, vec![dir.path().join("a.PDF"), dir.path().join("b.pdf")]);
        assert!(outcomes.iter().all(|o| o.is_ingested()));

        assert!(dir.path().join("c.png").exists());
        assert!(dir.path().join("folder.pdf").is_dir());
        assert!(dir.path().join("processed").join("a.PDF").exists());
    }

    #[tokio::test]
    async fn test_sweep_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("1.pdf"), b"%PDF 1").unwrap();
        std::fs::write(dir.path().join("2.pdf"), b"%PDF 2").unwrap();

        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(OcrError::ProcessingError("boom".to_string())),
            Ok(vec![region("ok", 0.0, 0.0, 10.0, 10.0)]),
        ]));
        let watcher = watcher(&dir, backend).await;
        let outcomes = watcher.sweep(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_ingested());
        assert!(outcomes[1].is_ingested());
        assert!(dir.path().join("1.pdf").exists());
        assert!(dir.path().join("processed").join("2.pdf").exists());
    }

    #[tokio::test]
    async fn test_arrival_with_other_extension_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"text").unwrap();

        let watcher = watcher(&dir, Arc::new(ScriptedBackend::new(Vec::new()))).await;
        let outcome = watcher.handle_arrival(&path, &CancellationToken::new()).await;

        assert!(outcome.is_none());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_arrival_is_stabilized_then_ingested() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF arrived").unwrap();

        let watcher = watcher(&dir, Arc::new(ScriptedBackend::new(Vec::new()))).await;
        let outcome = watcher.handle_arrival(&path, &CancellationToken::new()).await;

        assert!(outcome.map(|o| o.is_ingested()).unwrap_or(false));
        assert!(dir.path().join("processed").join("scan.pdf").exists());
    }

    /// Drops a PNG into the watched directory during its first recognition
    struct ArrivesDuringSweep {
        target: PathBuf,
        dropped: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl OcrBackend for ArrivesDuringSweep {
        fn kind(&self) -> OcrBackendKind {
            OcrBackendKind::Sidecar
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn recognize(&self, _image: &OcrImage, _options: &OcrOptions) -> Result<Vec<Region>, OcrError> {
            if !self.dropped.swap(true, std::sync::atomic::Ordering::SeqCst) {
                DynamicImage::new_rgb8(4, 4)
                    .save_with_format(&self.target, ImageFormat::Png)
                    .map_err(|e| OcrError::ProcessingError(e.to_string()))?;
            }
            Ok(Vec::new())
        }
    }

    async fn wait_for(path: &Path) -> bool {
        for _ in 0..100 {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_file_arriving_during_sweep_is_ingested_after_it() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.pdf"), b"%PDF old").unwrap();

        let backend = Arc::new(ArrivesDuringSweep {
            target: dir.path().join("late.png"),
            dropped: std::sync::atomic::AtomicBool::new(false),
        });
        let watcher = watcher(&dir, backend).await;
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { watcher.run(cancel).await })
        };

        let processed = dir.path().join("processed");
        assert!(wait_for(&processed.join("old.pdf")).await);
        assert!(wait_for(&processed.join("late.png")).await);
        assert!(!dir.path().join("late.png").exists());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sweep_follows_symlinked_files() {
        let dir = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let target = elsewhere.path().join("scan.pdf");
        std::fs::write(&target, b"%PDF linked").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("linked.pdf")).unwrap();

        let watcher = watcher(&dir, Arc::new(ScriptedBackend::new(Vec::new()))).await;
        let outcomes = watcher.sweep(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_ingested());
        assert!(dir.path().join("processed").join("linked.pdf").exists());
    }

    #[tokio::test]
    async fn test_run_fails_when_directory_is_missing() {
        let dir = TempDir::new().unwrap();
        let mut watcher = watcher(&dir, Arc::new(ScriptedBackend::new(Vec::new()))).await;
        watcher.config.watch_dir = dir.path().join("absent");

        let result = watcher.run(CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_picks_up_new_file_and_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let watcher = watcher(&dir, Arc::new(ScriptedBackend::new(Vec::new()))).await;
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { watcher.run(cancel).await })
        };

        // Give the observer time to register
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(dir.path().join("live.pdf"), b"%PDF live").unwrap();

        assert!(wait_for(&dir.path().join("processed").join("live.pdf")).await);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
