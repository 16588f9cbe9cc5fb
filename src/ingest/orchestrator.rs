//! Ingestion Orchestrator
//!
//! Drives one file from extraction through a single transaction to
//! relocation. Failures are contained per file and reported as an
//! [`IngestOutcome`]; the caller never sees an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::relocate::relocate;
use super::{IngestError, IngestStage};
use crate::db::{DocumentStore, NewDocument, StoreWriter};
use crate::ocr::OcrOptions;
use crate::pages::{NormalizedDocument, PageNormalizer};

/// Where a committed file ended up
#[derive(Debug, Clone, PartialEq)]
pub enum Relocation {
    Moved(PathBuf),
    /// Rows are committed but the file is still in the watched directory
    Failed(String),
}

/// Summary of a committed file
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: Uuid,
    pub source: PathBuf,
    pub filetype: String,
    pub pages: usize,
    pub regions: usize,
    pub relocation: Relocation,
}

/// Per-file result
#[derive(Debug)]
pub enum IngestOutcome {
    Ingested(IngestReport),
    Failed {
        path: PathBuf,
        stage: IngestStage,
        error: IngestError,
    },
}

impl IngestOutcome {
    pub fn is_ingested(&self) -> bool {
        matches!(self, IngestOutcome::Ingested(_))
    }
}

pub struct IngestOrchestrator {
    normalizer: Arc<PageNormalizer>,
    store: Arc<dyn DocumentStore>,
    processed_dir: PathBuf,
    options: OcrOptions,
}

impl IngestOrchestrator {
    pub fn new(
        normalizer: Arc<PageNormalizer>,
        store: Arc<dyn DocumentStore>,
        processed_dir: PathBuf,
        options: OcrOptions,
    ) -> Self {
        Self {
            normalizer,
            store,
            processed_dir,
            options,
        }
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Ingest one file. Any failure before commit leaves no rows and leaves
    /// the file where it was.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub async fn process(&self, path: &Path) -> IngestOutcome {
        match self.run(path).await {
            Ok(report) => {
                match &report.relocation {
                    Relocation::Moved(target) => tracing::info!(
                        "Ingested {} as document {} ({} pages, {} regions) -> {}",
                        path.display(),
                        report.document_id,
                        report.pages,
                        report.regions,
                        target.display()
                    ),
                    Relocation::Failed(reason) => tracing::error!(
                        "Ingested {} as document {} but could not relocate it: {}",
                        path.display(),
                        report.document_id,
                        reason
                    ),
                }
                IngestOutcome::Ingested(report)
            }
            Err((stage, error)) => {
                tracing::error!("Failed to ingest {} during {}: {}", path.display(), stage, error);
                IngestOutcome::Failed {
                    path: path.to_path_buf(),
                    stage,
                    error,
                }
            }
        }
    }

    async fn run(&self, path: &Path) -> Result<IngestReport, (IngestStage, IngestError)> {
        let document = self
            .normalizer
            .normalize(path, &self.options)
            .await
            .map_err(|e| (IngestStage::Extraction, e.into()))?;

        let mut writer = self
            .store
            .begin()
            .await
            .map_err(|e| (IngestStage::Connect, e.into()))?;

        let document_id = match write_document(writer.as_mut(), path, &document).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(rollback_err) = writer.rollback().await {
                    tracing::warn!("Rollback failed for {}: {}", path.display(), rollback_err);
                }
                return Err((IngestStage::Write, e.into()));
            }
        };

        writer
            .commit()
            .await
            .map_err(|e| (IngestStage::Commit, e.into()))?;

        let relocation = match relocate(path, &self.processed_dir, document_id).await {
            Ok(target) => Relocation::Moved(target),
            Err(e) => Relocation::Failed(e.to_string()),
        };

        Ok(IngestReport {
            document_id,
            source: path.to_path_buf(),
            filetype: document.filetype.clone(),
            pages: document.pages.len(),
            regions: document.region_count(),
            relocation,
        })
    }
}

async fn write_document(
    writer: &mut dyn StoreWriter,
    path: &Path,
    document: &NormalizedDocument,
) -> crate::db::StoreResult<Uuid> {
    let location = path.to_string_lossy().into_owned();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| location.clone());

    let document_id = writer
        .insert_document(&NewDocument {
            filename,
            filetype: document.filetype.clone(),
            current_path: location.clone(),
            original_path: location,
        })
        .await?;

    for page in &document.pages {
        let page_id = writer
            .insert_page(document_id, page.page_number, page.width, page.height)
            .await?;

        for region in &page.regions {
            writer.insert_content(page_id, region).await?;
        }
    }

    Ok(document_id)
}
