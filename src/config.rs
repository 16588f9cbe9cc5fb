//! Configuration management for Scan Ingest
//!
//! Everything comes from the environment (optionally seeded from `.env`).
//! `WATCH_DIR` and `DATABASE_URL` are required; the rest have defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::ocr::{OcrAdapterConfig, OcrBackendKind, OcrOptions, RecognitionLevel};
use crate::watcher::{StabilizePolicy, WatcherConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub watch: WatchConfig,
    pub database: DatabaseConfig,
    pub ocr: OcrConfig,
    pub pdf: PdfConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub upload_max_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub dir: PathBuf,
    pub processed_dir_name: String,
    pub stabilize_interval: Duration,
    pub stabilize_max_attempts: Option<u32>,
    pub sweep_extensions: Vec<String>,
    pub live_extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub backend: OcrBackendKind,
    pub sidecar_url: String,
    pub tesseract_binary: String,
    pub options: OcrOptions,
}

#[derive(Debug, Clone)]
pub struct PdfConfig {
    pub render_scale: f32,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid {
                key: "SERVER_HOST",
                reason: format!("{}", e),
            })
    }
}

impl WatchConfig {
    pub fn processed_dir(&self) -> PathBuf {
        self.dir.join(&self.processed_dir_name)
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            watch_dir: self.dir.clone(),
            sweep_extensions: self.sweep_extensions.clone(),
            live_extensions: self.live_extensions.clone(),
            stabilize: StabilizePolicy {
                interval: self.stabilize_interval,
                max_attempts: self.stabilize_max_attempts,
            },
        }
    }
}

impl OcrConfig {
    pub fn adapter_config(&self) -> OcrAdapterConfig {
        OcrAdapterConfig {
            backend: self.backend,
            sidecar_url: self.sidecar_url.clone(),
            tesseract_binary: self.tesseract_binary.clone(),
            defaults: self.options.clone(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let watch_dir = get("WATCH_DIR").ok_or(ConfigError::Missing("WATCH_DIR"))?;
        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let recognition_level: RecognitionLevel =
            parse_or(get("OCR_RECOGNITION_LEVEL"), "OCR_RECOGNITION_LEVEL", RecognitionLevel::Accurate)?;
        let languages = get("OCR_LANGUAGES")
            .map(|v| split_list(&v))
            .unwrap_or_else(|| vec!["en".to_string()]);
        let options = OcrOptions::new(recognition_level, languages)
            .map_err(|e| ConfigError::Invalid {
                key: "OCR_LANGUAGES",
                reason: e.to_string(),
            })?
            .with_language_correction(parse_or(get("OCR_LANGUAGE_CORRECTION"), "OCR_LANGUAGE_CORRECTION", false)?)
            .with_custom_words(get("OCR_CUSTOM_WORDS").map(|v| split_list(&v)).unwrap_or_default());

        let interval_secs: u64 = parse_or(get("STABILIZE_INTERVAL_SECS"), "STABILIZE_INTERVAL_SECS", 5)?;
        let max_attempts = match get("STABILIZE_MAX_ATTEMPTS") {
            Some(v) => Some(parse_value::<u32>(&v, "STABILIZE_MAX_ATTEMPTS")?),
            None => None,
        };
        if max_attempts == Some(0) {
            return Err(ConfigError::Invalid {
                key: "STABILIZE_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }

        let render_scale: f32 = parse_or(get("PDF_RENDER_SCALE"), "PDF_RENDER_SCALE", 1.0)?;
        if !(render_scale.is_finite() && render_scale > 0.0) {
            return Err(ConfigError::Invalid {
                key: "PDF_RENDER_SCALE",
                reason: "must be a positive number".to_string(),
            });
        }

        Ok(Config {
            server: ServerConfig {
                host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(get("SERVER_PORT"), "SERVER_PORT", 5000)?,
                upload_max_bytes: parse_or(get("UPLOAD_MAX_BYTES"), "UPLOAD_MAX_BYTES", 50 * 1024 * 1024)?,
            },
            watch: WatchConfig {
                dir: PathBuf::from(watch_dir),
                processed_dir_name: get("PROCESSED_DIR_NAME").unwrap_or_else(|| "processed".to_string()),
                stabilize_interval: Duration::from_secs(interval_secs),
                stabilize_max_attempts: max_attempts,
                sweep_extensions: get("SWEEP_EXTENSIONS")
                    .map(|v| split_extensions(&v))
                    .unwrap_or_else(|| vec!["pdf".to_string()]),
                live_extensions: get("WATCH_EXTENSIONS")
                    .map(|v| split_extensions(&v))
                    .unwrap_or_else(|| {
                        ["pdf", "png", "jpg", "jpeg", "gif"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect()
                    }),
            },
            database: DatabaseConfig { url: database_url },
            ocr: OcrConfig {
                backend: parse_or(get("OCR_BACKEND"), "OCR_BACKEND", OcrBackendKind::Sidecar)?,
                sidecar_url: get("OCR_SIDECAR_URL").unwrap_or_else(|| "http://localhost:8765".to_string()),
                tesseract_binary: get("TESSERACT_BINARY").unwrap_or_else(|| "tesseract".to_string()),
                options,
            },
            pdf: PdfConfig { render_scale },
        })
    }
}

fn parse_value<T>(value: &str, key: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn parse_or<T>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => parse_value(&v, key),
        None => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn split_extensions(value: &str) -> Vec<String> {
    split_list(value)
        .into_iter()
        .map(|s| s.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [("WATCH_DIR", "/srv/scans"), ("DATABASE_URL", "sqlite://ingest.db")];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.watch.processed_dir(), PathBuf::from("/srv/scans/processed"));
        assert_eq!(config.watch.stabilize_interval, Duration::from_secs(5));
        assert_eq!(config.watch.stabilize_max_attempts, None);
        assert_eq!(config.watch.sweep_extensions, vec!["pdf"]);
        assert_eq!(config.watch.live_extensions, vec!["pdf", "png", "jpg", "jpeg", "gif"]);
        assert_eq!(config.ocr.backend, OcrBackendKind::Sidecar);
        assert_eq!(config.ocr.options, OcrOptions::default());
        assert_eq!(config.pdf.render_scale, 1.0);
    }

    #[test]
    fn test_missing_required() {
        let result = Config::from_lookup(lookup(&[("WATCH_DIR", "/srv/scans")]));
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));

        let result = Config::from_lookup(lookup(&[("DATABASE_URL", "sqlite://x.db"), ("WATCH_DIR", "  ")]));
        assert!(matches!(result, Err(ConfigError::Missing("WATCH_DIR"))));
    }

    #[test]
    fn test_invalid_recognition_level_fails_fast() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OCR_RECOGNITION_LEVEL", "slow"));

        let result = Config::from_lookup(lookup(&pairs));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                key: "OCR_RECOGNITION_LEVEL",
                ..
            })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("SERVER_PORT", "8080"),
            ("STABILIZE_INTERVAL_SECS", "2"),
            ("STABILIZE_MAX_ATTEMPTS", "30"),
            ("WATCH_EXTENSIONS", ".PDF, tiff"),
            ("OCR_BACKEND", "tesseract"),
            ("OCR_RECOGNITION_LEVEL", "fast"),
            ("OCR_LANGUAGES", "en, de"),
            ("OCR_LANGUAGE_CORRECTION", "true"),
            ("OCR_CUSTOM_WORDS", "Rechnung,MwSt"),
        ]);

        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.watch.stabilize_interval, Duration::from_secs(2));
        assert_eq!(config.watch.stabilize_max_attempts, Some(30));
        assert_eq!(config.watch.live_extensions, vec!["pdf", "tiff"]);
        assert_eq!(config.ocr.backend, OcrBackendKind::Tesseract);
        assert_eq!(config.ocr.options.recognition_level(), RecognitionLevel::Fast);
        assert_eq!(config.ocr.options.languages(), ["en", "de"]);
        assert!(config.ocr.options.uses_language_correction());
        assert_eq!(config.ocr.options.custom_words(), ["Rechnung", "MwSt"]);
    }

    #[test]
    fn test_invalid_numbers() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SERVER_PORT", "eighty"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: "SERVER_PORT", .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STABILIZE_MAX_ATTEMPTS", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid {
                key: "STABILIZE_MAX_ATTEMPTS",
                ..
            })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PDF_RENDER_SCALE", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: "PDF_RENDER_SCALE", .. })
        ));
    }
}
