//! Size-based write stabilization
//!
//! A newly arrived file is considered complete once two consecutive size
//! samples, taken one interval apart, are equal.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct StabilizePolicy {
    /// Delay between size samples
    pub interval: Duration,
    /// Give up after this many re-samples; `None` polls forever
    pub max_attempts: Option<u32>,
}

impl Default for StabilizePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// A file whose size stopped changing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stabilized {
    pub size: u64,
    /// Total size samples taken, including the first
    pub samples: u32,
}

#[derive(Debug, Error)]
pub enum StabilizeError {
    #[error("{path} vanished while waiting for it to stabilize: {source}")]
    Vanished {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} still changing after {attempts} attempts")]
    Exhausted { path: PathBuf, attempts: u32 },

    #[error("stabilization of {0} cancelled")]
    Cancelled(PathBuf),
}

/// Reads the current size of a file
#[async_trait]
pub trait SizeProbe: Send + Sync {
    async fn size(&self, path: &Path) -> io::Result<u64>;
}

/// Probe backed by filesystem metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

#[async_trait]
impl SizeProbe for FsProbe {
    async fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }
}

/// Poll `path` until its size is unchanged across one interval.
pub async fn wait_for_stable_size(
    path: &Path,
    policy: &StabilizePolicy,
    probe: &dyn SizeProbe,
    cancel: &CancellationToken,
) -> Result<Stabilized, StabilizeError> {
    let vanished = |source| StabilizeError::Vanished {
        path: path.to_path_buf(),
        source,
    };

    let mut previous = probe.size(path).await.map_err(vanished)?;
    let mut samples = 1u32;

    loop {
        if let Some(max) = policy.max_attempts {
            if samples > max {
                return Err(StabilizeError::Exhausted {
                    path: path.to_path_buf(),
                    attempts: max,
                });
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(StabilizeError::Cancelled(path.to_path_buf())),
            _ = tokio::time::sleep(policy.interval) => {}
        }

        let current = probe.size(path).await.map_err(vanished)?;
        samples += 1;

        if current == previous {
            tracing::debug!("{} stable at {} bytes after {} samples", path.display(), current, samples);
            return Ok(Stabilized {
                size: current,
                samples,
            });
        }

        tracing::debug!("{} still growing: {} -> {} bytes", path.display(), previous, current);
        previous = current;
    }
}
