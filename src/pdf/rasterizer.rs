//! PDF page rasterization
//!
//! Renders every page of a PDF to an RGB bitmap via MuPDF.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use mupdf::{Colorspace, Document, Matrix};

use super::{PdfError, PdfResult};

/// One rendered page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-indexed page number
    pub page_number: u32,
    /// Bitmap width in pixels
    pub width: u32,
    /// Bitmap height in pixels
    pub height: u32,
    pub image: DynamicImage,
}

/// Turns a PDF into page bitmaps in document order
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, path: &Path) -> PdfResult<Vec<RenderedPage>>;
}

/// MuPDF-backed rasterizer
#[derive(Debug, Clone)]
pub struct MupdfRasterizer {
    scale: f32,
}

impl MupdfRasterizer {
    /// `scale` 1.0 renders at 72 dpi
    pub fn new(scale: f32) -> Self {
        Self {
            scale: scale.clamp(0.1, 8.0),
        }
    }
}

impl Default for MupdfRasterizer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl PageRasterizer for MupdfRasterizer {
    async fn rasterize(&self, path: &Path) -> PdfResult<Vec<RenderedPage>> {
        let path: PathBuf = path.to_path_buf();
        let scale = self.scale;

        // MuPDF documents are not Send; open, render and drop on one blocking thread.
        tokio::task::spawn_blocking(move || render_all(&path, scale))
            .await
            .map_err(|e| PdfError::RenderError(format!("Task join error: {}", e)))?
    }
}

fn render_all(path: &Path, scale: f32) -> PdfResult<Vec<RenderedPage>> {
    let path_str = path.to_string_lossy();
    let doc = Document::open(&*path_str)
        .map_err(|e| PdfError::OpenError(format!("{}: {}", path.display(), e)))?;

    let page_count = doc.page_count()?;
    let matrix = Matrix::new_scale(scale, scale);
    let colorspace = Colorspace::device_rgb();

    let mut pages = Vec::with_capacity(page_count.max(0) as usize);
    for index in 0..page_count {
        let page = doc.load_page(index)?;
        let pixmap = page.to_pixmap(&matrix, &colorspace, false, true)?;
        let image = pixmap_to_image(&pixmap)?;

        pages.push(RenderedPage {
            page_number: index as u32 + 1,
            width: image.width(),
            height: image.height(),
            image,
        });
    }

    tracing::debug!("Rendered {} pages from {}", pages.len(), path.display());
    Ok(pages)
}

fn pixmap_to_image(pixmap: &mupdf::Pixmap) -> PdfResult<DynamicImage> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgb_buffer = Vec::with_capacity((width * height * 3) as usize);

    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(r);
            let b = samples.get(offset + 2).copied().unwrap_or(r);
            rgb_buffer.extend_from_slice(&[r, g, b]);
        }
    }

    let img = RgbImage::from_raw(width, height, rgb_buffer)
        .ok_or_else(|| PdfError::ImageError("Failed to create image buffer".to_string()))?;

    Ok(DynamicImage::ImageRgb8(img))
}

/// Rasterizer returning blank pages of fixed sizes, for testing
#[cfg(test)]
pub(crate) struct FixedRasterizer {
    pub pages: Vec<(u32, u32)>,
}

#[cfg(test)]
#[async_trait]
impl PageRasterizer for FixedRasterizer {
    async fn rasterize(&self, path: &Path) -> PdfResult<Vec<RenderedPage>> {
        if !path.exists() {
            return Err(PdfError::OpenError(format!("{} not found", path.display())));
        }

        Ok(self
            .pages
            .iter()
            .enumerate()
            .map(|(i, &(width, height))| RenderedPage {
                page_number: i as u32 + 1,
                width,
                height,
                image: DynamicImage::new_rgb8(width, height),
            })
            .collect())
    }
}
