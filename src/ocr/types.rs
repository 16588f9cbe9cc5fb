//! OCR Types
//!
//! Defines the region model returned by recognition backends and the
//! validated option set forwarded to them.

use std::io::Cursor;
use std::str::FromStr;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// OCR backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendKind {
    /// HTTP recognition sidecar (e.g. a Vision framework helper)
    Sidecar,
    /// Tesseract CLI (local)
    Tesseract,
}

impl Default for OcrBackendKind {
    fn default() -> Self {
        Self::Sidecar
    }
}

impl FromStr for OcrBackendKind {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sidecar" => Ok(Self::Sidecar),
            "tesseract" => Ok(Self::Tesseract),
            other => Err(OcrError::InvalidConfiguration(format!(
                "unknown OCR backend '{}'; expected 'sidecar' or 'tesseract'",
                other
            ))),
        }
    }
}

/// Recognition level requested from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionLevel {
    Fast,
    Accurate,
}

impl Default for RecognitionLevel {
    fn default() -> Self {
        Self::Accurate
    }
}

impl RecognitionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Accurate => "accurate",
        }
    }
}

impl FromStr for RecognitionLevel {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "accurate" => Ok(Self::Accurate),
            other => Err(OcrError::InvalidConfiguration(format!(
                "invalid recognition level '{}'; use 'fast' or 'accurate'",
                other
            ))),
        }
    }
}

/// Validated recognition options.
///
/// Fields are private so an `OcrOptions` value can only exist once its
/// recognition level and language list have been checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrOptions {
    recognition_level: RecognitionLevel,
    uses_language_correction: bool,
    custom_words: Vec<String>,
    languages: Vec<String>,
}

/// Loosely typed overrides as they arrive over the wire
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionOverrides {
    recognition_level: Option<String>,
    uses_language_correction: Option<bool>,
    custom_words: Option<Vec<String>>,
    languages: Option<Vec<String>>,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            recognition_level: RecognitionLevel::Accurate,
            uses_language_correction: false,
            custom_words: Vec::new(),
            languages: vec!["en".to_string()],
        }
    }
}

impl OcrOptions {
    /// Create options, rejecting an empty or blank language list
    pub fn new(recognition_level: RecognitionLevel, languages: Vec<String>) -> Result<Self, OcrError> {
        validate_languages(&languages)?;
        Ok(Self {
            recognition_level,
            uses_language_correction: false,
            custom_words: Vec::new(),
            languages,
        })
    }

    pub fn with_language_correction(mut self, enabled: bool) -> Self {
        self.uses_language_correction = enabled;
        self
    }

    pub fn with_custom_words(mut self, words: Vec<String>) -> Self {
        self.custom_words = words;
        self
    }

    /// Parse a JSON document of options, using defaults for missing keys
    pub fn from_json(value: &serde_json::Value) -> Result<Self, OcrError> {
        Self::default().merged_with(value)
    }

    /// Apply JSON overrides on top of these options.
    ///
    /// Wrong types (e.g. a number inside `languages`) and unknown keys are
    /// configuration errors, as is an unknown recognition level.
    pub fn merged_with(&self, overrides: &serde_json::Value) -> Result<Self, OcrError> {
        let overrides: OptionOverrides = serde_json::from_value(overrides.clone())
            .map_err(|e| OcrError::InvalidConfiguration(format!("invalid OCR options: {}", e)))?;

        let mut merged = self.clone();
        if let Some(level) = overrides.recognition_level {
            merged.recognition_level = level.parse()?;
        }
        if let Some(languages) = overrides.languages {
            validate_languages(&languages)?;
            merged.languages = languages;
        }
        if let Some(enabled) = overrides.uses_language_correction {
            merged.uses_language_correction = enabled;
        }
        if let Some(words) = overrides.custom_words {
            merged.custom_words = words;
        }
        Ok(merged)
    }

    pub fn recognition_level(&self) -> RecognitionLevel {
        self.recognition_level
    }

    pub fn uses_language_correction(&self) -> bool {
        self.uses_language_correction
    }

    pub fn custom_words(&self) -> &[String] {
        &self.custom_words
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }
}

fn validate_languages(languages: &[String]) -> Result<(), OcrError> {
    if languages.is_empty() {
        return Err(OcrError::InvalidConfiguration(
            "recognition languages must be a non-empty list of strings".to_string(),
        ));
    }
    if languages.iter().any(|l| l.trim().is_empty()) {
        return Err(OcrError::InvalidConfiguration(
            "recognition languages must not contain blank entries".to_string(),
        ));
    }
    Ok(())
}

/// Bounding box as percentages of the image's own width/height.
///
/// The origin and axis direction are whatever the backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_pct: f64,
    pub y_pct: f64,
    pub w_pct: f64,
    pub h_pct: f64,
}

impl BoundingBox {
    /// Convert normalized 0-1 coordinates to percentages
    pub fn from_normalized(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x_pct: x * 100.0,
            y_pct: y * 100.0,
            w_pct: width * 100.0,
            h_pct: height * 100.0,
        }
    }

    /// Convert a pixel rectangle to percentages of the image dimensions
    pub fn from_pixels(left: u32, top: u32, width: u32, height: u32, image_width: u32, image_height: u32) -> Self {
        let iw = image_width.max(1) as f64;
        let ih = image_height.max(1) as f64;
        Self {
            x_pct: left as f64 / iw * 100.0,
            y_pct: top as f64 / ih * 100.0,
            w_pct: width as f64 / iw * 100.0,
            h_pct: height as f64 / ih * 100.0,
        }
    }
}

/// One recognized text span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub text: String,
    /// Backend confidence (0-1)
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// PNG-encoded image handed to a backend, with its pixel dimensions
#[derive(Debug, Clone)]
pub struct OcrImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl OcrImage {
    /// Encode a decoded image as PNG
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self, OcrError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| OcrError::ImageEncoding(e.to_string()))?;

        Ok(Self {
            png,
            width: image.width(),
            height: image.height(),
        })
    }
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Invalid OCR configuration: {0}")]
    InvalidConfiguration(String),

    #[error("OCR backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Failed to encode image: {0}")]
    ImageEncoding(String),

    #[error("OCR processing failed: {0}")]
    ProcessingError(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl OcrError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            Self::BackendNotAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
