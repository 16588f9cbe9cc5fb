//! Scan Ingest Library
//!
//! Watched-folder ingestion of scanned documents: stabilize new files, run
//! OCR on every page, and store the document/page/content hierarchy in one
//! transaction per file. The same extraction is exposed over HTTP without
//! persistence. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `ocr`: Recognition backends and validated options
//! - `pdf`: Page rasterization via MuPDF
//! - `pages`: Source classification and region normalization
//! - `db`: SQLite store and transactional writer
//! - `ingest`: Per-file orchestration and relocation
//! - `watcher`: Directory watching and write stabilization
//! - `routes`: HTTP upload and health endpoints

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod ocr;
pub mod pages;
pub mod pdf;
pub mod routes;
pub mod state;
pub mod watcher;
