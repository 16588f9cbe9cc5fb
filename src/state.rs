//! Application state management

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ocr::OcrOptions;
use crate::pages::PageNormalizer;

/// Shared state for the HTTP surface
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    normalizer: Arc<PageNormalizer>,
    ocr_defaults: OcrOptions,
    staging_dir: PathBuf,
    upload_max_bytes: usize,
}

impl AppState {
    /// `staging_dir` holds uploads only for the duration of a request
    pub fn new(
        normalizer: Arc<PageNormalizer>,
        ocr_defaults: OcrOptions,
        staging_dir: PathBuf,
        upload_max_bytes: usize,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                normalizer,
                ocr_defaults,
                staging_dir,
                upload_max_bytes,
            }),
        }
    }

    pub fn normalizer(&self) -> &PageNormalizer {
        &self.inner.normalizer
    }

    pub fn ocr_defaults(&self) -> &OcrOptions {
        &self.inner.ocr_defaults
    }

    pub fn staging_dir(&self) -> &Path {
        &self.inner.staging_dir
    }

    pub fn upload_max_bytes(&self) -> usize {
        self.inner.upload_max_bytes
    }
}
