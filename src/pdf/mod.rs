//! PDF Module
//!
//! Page rasterization for multi-page PDFs, backed by MuPDF.

mod rasterizer;

pub use rasterizer::{MupdfRasterizer, PageRasterizer, RenderedPage};

#[cfg(test)]
pub(crate) use rasterizer::FixedRasterizer;

use thiserror::Error;

/// PDF error type
#[derive(Debug, Error)]
pub enum PdfError {
    /// Failed to open or parse the document
    #[error("Failed to open PDF: {0}")]
    OpenError(String),

    /// Failed to render a page
    #[error("Render error: {0}")]
    RenderError(String),

    /// MuPDF context error
    #[error("MuPDF context error: {0}")]
    ContextError(String),

    /// Image processing error
    #[error("Image error: {0}")]
    ImageError(String),
}

/// Result type alias for PDF operations
pub type PdfResult<T> = std::result::Result<T, PdfError>;

impl From<mupdf::Error> for PdfError {
    fn from(err: mupdf::Error) -> Self {
        PdfError::ContextError(err.to_string())
    }
}
