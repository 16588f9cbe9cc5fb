//! OCR Adapter
//!
//! Uniform entry point over the configured backend.

use std::sync::Arc;

use super::{
    provider::{OcrBackend, SidecarBackend, TesseractBackend},
    types::{OcrBackendKind, OcrError, OcrImage, OcrOptions, Region},
};

/// OCR adapter configuration
#[derive(Debug, Clone)]
pub struct OcrAdapterConfig {
    pub backend: OcrBackendKind,
    /// Sidecar base URL
    pub sidecar_url: String,
    /// Tesseract executable
    pub tesseract_binary: String,
    /// Options used when a caller does not override them
    pub defaults: OcrOptions,
}

impl Default for OcrAdapterConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::Sidecar,
            sidecar_url: "http://localhost:8765".to_string(),
            tesseract_binary: "tesseract".to_string(),
            defaults: OcrOptions::default(),
        }
    }
}

/// Adapter over a single recognition backend
pub struct OcrAdapter {
    backend: Arc<dyn OcrBackend>,
    defaults: OcrOptions,
}

impl OcrAdapter {
    /// Create an adapter for the configured backend
    pub fn new(config: &OcrAdapterConfig) -> Self {
        let backend: Arc<dyn OcrBackend> = match config.backend {
            OcrBackendKind::Sidecar => Arc::new(SidecarBackend::new(&config.sidecar_url)),
            OcrBackendKind::Tesseract => Arc::new(TesseractBackend::new(&config.tesseract_binary)),
        };

        Self::with_backend(backend, config.defaults.clone())
    }

    pub fn with_backend(backend: Arc<dyn OcrBackend>, defaults: OcrOptions) -> Self {
        Self { backend, defaults }
    }

    pub fn backend_kind(&self) -> OcrBackendKind {
        self.backend.kind()
    }

    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    /// Default options for callers without overrides
    pub fn defaults(&self) -> &OcrOptions {
        &self.defaults
    }

    /// Recognize regions in one image with one backend request.
    ///
    /// A blank image yields an empty list, not an error.
    pub async fn recognize(&self, image: &OcrImage, options: &OcrOptions) -> Result<Vec<Region>, OcrError> {
        tracing::debug!(
            "Recognizing {}x{} image ({} bytes) with {:?} backend, level={}, languages={:?}",
            image.width,
            image.height,
            image.png.len(),
            self.backend.kind(),
            options.recognition_level().as_str(),
            options.languages()
        );

        let regions = self.backend.recognize(image, options).await?;

        if regions.is_empty() {
            tracing::debug!("OCR backend returned no regions");
        }

        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::provider::{region, ScriptedBackend};

    fn blank_image() -> OcrImage {
        let img = image::DynamicImage::new_rgb8(4, 4);
        OcrImage::from_dynamic(&img).unwrap()
    }

    #[test]
    fn test_adapter_creation() {
        let adapter = OcrAdapter::new(&OcrAdapterConfig::default());
        assert_eq!(adapter.backend_kind(), OcrBackendKind::Sidecar);
        assert_eq!(adapter.defaults(), &OcrOptions::default());
    }

    #[tokio::test]
    async fn test_recognize_passes_regions_through() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![
            region("Invoice", 10.0, 20.0, 50.0, 10.0),
            region("Total", 5.0, 80.0, 20.0, 5.0),
        ])]));
        let adapter = OcrAdapter::with_backend(backend.clone(), OcrOptions::default());

        let regions = adapter
            .recognize(&blank_image(), adapter.defaults())
            .await
            .unwrap();

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].text, "Invoice");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_blank_image_yields_empty_list() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(Vec::new())]));
        let adapter = OcrAdapter::with_backend(backend, OcrOptions::default());

        let regions = adapter
            .recognize(&blank_image(), &OcrOptions::default())
            .await
            .unwrap();

        assert!(regions.is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(OcrError::ApiError(
            "sidecar down".to_string(),
        ))]));
        let adapter = OcrAdapter::with_backend(backend, OcrOptions::default());

        let result = adapter.recognize(&blank_image(), &OcrOptions::default()).await;
        assert!(matches!(result, Err(OcrError::ApiError(_))));
    }
}
