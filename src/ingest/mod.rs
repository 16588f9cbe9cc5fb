//! Ingest Module
//!
//! End-to-end handling of one watched file: extraction, transactional
//! persistence and relocation into the processed directory.

mod orchestrator;
mod relocate;

pub use orchestrator::{IngestOrchestrator, IngestOutcome, IngestReport, Relocation};
pub use relocate::relocate;

use std::fmt;

use thiserror::Error;

use crate::db::StoreError;
use crate::pages::ExtractionError;

/// Per-file ingestion error
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Step at which a file's ingestion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Extraction,
    Connect,
    Write,
    Commit,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Extraction => "extraction",
            IngestStage::Connect => "connect",
            IngestStage::Write => "write",
            IngestStage::Commit => "commit",
        };
        f.write_str(name)
    }
}
