//! OCR Backends
//!
//! Defines the backend trait and implementations for different recognition
//! engines.

use std::collections::BTreeMap;
use std::io::Write;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{
    BoundingBox, OcrBackendKind, OcrError, OcrImage, OcrOptions, RecognitionLevel, Region,
};

/// OCR backend trait
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Get the backend type
    fn kind(&self) -> OcrBackendKind;

    /// Check if the backend is reachable/installed
    async fn is_available(&self) -> bool;

    /// Recognize text regions in one image.
    ///
    /// Issues exactly one request to the engine. Any resources acquired for
    /// the request are released before returning, on success and on error.
    async fn recognize(&self, image: &OcrImage, options: &OcrOptions) -> Result<Vec<Region>, OcrError>;
}

/// HTTP recognition sidecar backend.
///
/// The sidecar receives a base64 PNG plus the recognition options and answers
/// with observations whose boxes are normalized to 0-1.
pub struct SidecarBackend {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SidecarRequest<'a> {
    image: String,
    recognition_level: &'static str,
    languages: &'a [String],
    uses_language_correction: bool,
    custom_words: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SidecarResponse {
    #[serde(default)]
    observations: Vec<SidecarObservation>,
}

#[derive(Debug, Deserialize)]
struct SidecarObservation {
    text: String,
    confidence: f64,
    bbox: SidecarBox,
}

#[derive(Debug, Deserialize)]
struct SidecarBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl SidecarBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl OcrBackend for SidecarBackend {
    fn kind(&self) -> OcrBackendKind {
        OcrBackendKind::Sidecar
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn recognize(&self, image: &OcrImage, options: &OcrOptions) -> Result<Vec<Region>, OcrError> {
        use base64::Engine;

        let url = format!("{}/recognize", self.base_url);

        let request = SidecarRequest {
            image: base64::engine::general_purpose::STANDARD.encode(&image.png),
            recognition_level: options.recognition_level().as_str(),
            languages: options.languages(),
            uses_language_correction: options.uses_language_correction(),
            custom_words: options.custom_words(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::ApiError(format!("Failed to call OCR sidecar: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::ApiError(format!(
                "OCR sidecar returned {}: {}",
                status, body
            )));
        }

        let result: SidecarResponse = response
            .json()
            .await
            .map_err(|e| OcrError::ApiError(format!("Failed to parse sidecar response: {}", e)))?;

        Ok(result
            .observations
            .into_iter()
            .map(|o| Region {
                text: o.text,
                confidence: o.confidence,
                bbox: BoundingBox::from_normalized(o.bbox.x, o.bbox.y, o.bbox.width, o.bbox.height),
            })
            .collect())
    }
}

/// Tesseract CLI backend.
///
/// Runs `tesseract <png> stdout ... tsv` and folds word rows into line regions.
pub struct TesseractBackend {
    binary: String,
}

impl TesseractBackend {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn kind(&self) -> OcrBackendKind {
        OcrBackendKind::Tesseract
    }

    async fn is_available(&self) -> bool {
        tokio::process::Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn recognize(&self, image: &OcrImage, options: &OcrOptions) -> Result<Vec<Region>, OcrError> {
        // Temp files are removed when the guards drop, including on early return.
        let mut input = tempfile::Builder::new()
            .prefix("scan_ingest_ocr_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to create temp file: {}", e)))?;
        input
            .write_all(&image.png)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to write temp file: {}", e)))?;

        let user_words = if options.custom_words().is_empty() {
            None
        } else {
            let mut words = tempfile::Builder::new()
                .prefix("scan_ingest_words_")
                .tempfile()
                .map_err(|e| OcrError::ProcessingError(format!("Failed to create temp file: {}", e)))?;
            words
                .write_all(options.custom_words().join("\n").as_bytes())
                .map_err(|e| OcrError::ProcessingError(format!("Failed to write temp file: {}", e)))?;
            Some(words)
        };

        if options.recognition_level() == RecognitionLevel::Fast {
            tracing::debug!("Tesseract has no fast recognition mode; using default engine");
        }

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(tesseract_languages(options.languages()))
            .arg("--psm")
            .arg("3");
        if let Some(words) = &user_words {
            command.arg("--user-words").arg(words.path());
        }
        command.arg("tsv");

        let output = command
            .output()
            .await
            .map_err(|e| OcrError::BackendNotAvailable(format!("Failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ProcessingError(format!(
                "Tesseract failed: {}",
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tsv(&tsv, image.width, image.height))
    }
}

/// Join languages into a `-l` argument, mapping two-letter codes to
/// Tesseract's traineddata names. Unknown codes pass through unchanged.
pub(crate) fn tesseract_languages(languages: &[String]) -> String {
    languages
        .iter()
        .map(|lang| tesseract_language(lang))
        .collect::<Vec<_>>()
        .join("+")
}

fn tesseract_language(lang: &str) -> String {
    let lower = lang.trim().to_ascii_lowercase().replace('_', "-");
    let code = match lower.as_str() {
        "zh-hans" | "zh-cn" | "zh-sg" | "zh" => return "chi_sim".to_string(),
        "zh-hant" | "zh-tw" | "zh-hk" => return "chi_tra".to_string(),
        other => other.split('-').next().unwrap_or(other),
    };

    let mapped = match code {
        "en" => "eng",
        "de" => "deu",
        "fr" => "fra",
        "es" => "spa",
        "it" => "ita",
        "pt" => "por",
        "nl" => "nld",
        "sv" => "swe",
        "da" => "dan",
        "no" | "nb" => "nor",
        "fi" => "fin",
        "pl" => "pol",
        "cs" => "ces",
        "ru" => "rus",
        "uk" => "ukr",
        "tr" => "tur",
        "el" => "ell",
        "ja" => "jpn",
        "ko" => "kor",
        "ar" => "ara",
        "he" => "heb",
        "hi" => "hin",
        _ => return lang.trim().to_string(),
    };
    mapped.to_string()
}

/// Accumulates the words of one TSV line
struct LineAccumulator {
    words: Vec<String>,
    confidences: Vec<f64>,
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

/// Fold Tesseract TSV word rows (level 5) into one region per text line
pub(crate) fn parse_tsv(tsv: &str, image_width: u32, image_height: u32) -> Vec<Region> {
    let mut lines: BTreeMap<(u32, u32, u32, u32), LineAccumulator> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }

        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }

        let nums: Option<Vec<u32>> = cols[1..10].iter().map(|c| c.parse().ok()).collect();
        let Some(nums) = nums else {
            continue;
        };
        let conf: f64 = cols[10].parse().unwrap_or(-1.0);

        let key = (nums[0], nums[1], nums[2], nums[3]);
        let (left, top, width, height) = (nums[5], nums[6], nums[7], nums[8]);

        let line = lines.entry(key).or_insert_with(|| LineAccumulator {
            words: Vec::new(),
            confidences: Vec::new(),
            left,
            top,
            right: left + width,
            bottom: top + height,
        });

        line.words.push(text.to_string());
        if conf >= 0.0 {
            line.confidences.push(conf / 100.0);
        }
        line.left = line.left.min(left);
        line.top = line.top.min(top);
        line.right = line.right.max(left + width);
        line.bottom = line.bottom.max(top + height);
    }

    lines
        .into_values()
        .map(|line| {
            let confidence = if line.confidences.is_empty() {
                0.0
            } else {
                line.confidences.iter().sum::<f64>() / line.confidences.len() as f64
            };

            Region {
                text: line.words.join(" "),
                confidence,
                bbox: BoundingBox::from_pixels(
                    line.left,
                    line.top,
                    line.right - line.left,
                    line.bottom - line.top,
                    image_width,
                    image_height,
                ),
            }
        })
        .collect()
}

/// Scripted backend for testing
#[cfg(test)]
pub(crate) struct ScriptedBackend {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<Vec<Region>, OcrError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ScriptedBackend {
    /// Each call pops the next response; an exhausted script yields no regions
    pub fn new(responses: Vec<Result<Vec<Region>, OcrError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(crate) fn region(text: &str, x: f64, y: f64, w: f64, h: f64) -> Region {
    Region {
        text: text.to_string(),
        confidence: 0.9,
        bbox: BoundingBox {
            x_pct: x,
            y_pct: y,
            w_pct: w,
            h_pct: h,
        },
    }
}

#[cfg(test)]
#[async_trait]
impl OcrBackend for ScriptedBackend {
    fn kind(&self) -> OcrBackendKind {
        OcrBackendKind::Sidecar
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn recognize(&self, _image: &OcrImage, _options: &OcrOptions) -> Result<Vec<Region>, OcrError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
