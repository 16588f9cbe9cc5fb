//! Page Normalizer
//!
//! Turns a source file (PDF or image) into an ordered list of pages, each
//! carrying pixel dimensions and OCR regions with densities.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;

use super::types::{NormalizedDocument, PageResult, RegionResult, SourceKind};
use crate::ocr::{OcrAdapter, OcrError, OcrImage, OcrOptions};
use crate::pdf::{PageRasterizer, PdfError};

/// Extraction error type
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("Task join error: {0}")]
    Join(String),
}

pub struct PageNormalizer {
    ocr: Arc<OcrAdapter>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl PageNormalizer {
    pub fn new(ocr: Arc<OcrAdapter>, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self { ocr, rasterizer }
    }

    /// Extract every page of `path`.
    ///
    /// One OCR request is issued per page. A page with no text yields an
    /// empty region list; it is never dropped.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub async fn normalize(
        &self,
        path: &Path,
        options: &OcrOptions,
    ) -> Result<NormalizedDocument, ExtractionError> {
        match SourceKind::classify(path) {
            SourceKind::Pdf => self.normalize_pdf(path, options).await,
            SourceKind::Image => self.normalize_image(path, options).await,
        }
    }

    async fn normalize_pdf(
        &self,
        path: &Path,
        options: &OcrOptions,
    ) -> Result<NormalizedDocument, ExtractionError> {
        let rendered = self.rasterizer.rasterize(path).await?;
        let mut pages = Vec::with_capacity(rendered.len());

        for page in rendered {
            let regions = self.recognize(page.image, options).await?;
            tracing::debug!(
                "Page {} of {}: {} regions",
                page.page_number,
                path.display(),
                regions.len()
            );

            pages.push(PageResult {
                page_number: page.page_number,
                width: page.width,
                height: page.height,
                regions,
            });
        }

        Ok(NormalizedDocument {
            filetype: "pdf".to_string(),
            pages,
        })
    }

    async fn normalize_image(
        &self,
        path: &Path,
        options: &OcrOptions,
    ) -> Result<NormalizedDocument, ExtractionError> {
        let owned = path.to_path_buf();
        let (format, image) = tokio::task::spawn_blocking(move || decode_image(&owned))
            .await
            .map_err(|e| ExtractionError::Join(e.to_string()))??;

        let (width, height) = (image.width(), image.height());
        let regions = self.recognize(image, options).await?;

        Ok(NormalizedDocument {
            filetype: format_name(format),
            pages: vec![PageResult {
                page_number: 1,
                width,
                height,
                regions,
            }],
        })
    }

    async fn recognize(
        &self,
        image: DynamicImage,
        options: &OcrOptions,
    ) -> Result<Vec<RegionResult>, ExtractionError> {
        let encoded = tokio::task::spawn_blocking(move || OcrImage::from_dynamic(&image))
            .await
            .map_err(|e| ExtractionError::Join(e.to_string()))??;

        let regions = self.ocr.recognize(&encoded, options).await?;
        Ok(regions.into_iter().map(RegionResult::from_region).collect())
    }
}

fn decode_image(path: &Path) -> Result<(ImageFormat, DynamicImage), ExtractionError> {
    let io_err = |source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    };

    let reader = ImageReader::open(path)
        .map_err(io_err)?
        .with_guessed_format()
        .map_err(io_err)?;

    let format = reader.format().ok_or_else(|| ExtractionError::Decode {
        path: path.to_path_buf(),
        reason: "unrecognized image format".to_string(),
    })?;

    let image = reader.decode().map_err(|e| ExtractionError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok((format, image))
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "png".to_string(),
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        other => other
            .extensions_str()
            .first()
            .map(|ext| ext.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}
