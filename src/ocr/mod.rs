//! OCR Module
//!
//! Converts a single image into recognized text regions with bounding boxes
//! expressed as percentages of the image size.
//!
//! Supports multiple backends:
//! - HTTP sidecar (e.g. a macOS Vision helper)
//! - Tesseract (local CLI, requires installation)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scan_ingest::ocr::{OcrAdapter, OcrAdapterConfig, OcrImage};
//!
//! let adapter = OcrAdapter::new(&OcrAdapterConfig::default());
//! let image = OcrImage::from_dynamic(&decoded)?;
//! let regions = adapter.recognize(&image, adapter.defaults()).await?;
//! ```

mod provider;
mod service;
mod types;

pub use provider::{OcrBackend, SidecarBackend, TesseractBackend};
pub use service::{OcrAdapter, OcrAdapterConfig};
pub use types::{
    BoundingBox, OcrBackendKind, OcrError, OcrImage, OcrOptions, RecognitionLevel, Region,
};

#[cfg(test)]
pub(crate) use provider::{region, ScriptedBackend};
