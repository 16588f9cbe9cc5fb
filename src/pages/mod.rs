//! Pages Module
//!
//! Source file classification, page extraction and region normalization.

mod normalizer;
mod types;

pub use normalizer::{ExtractionError, PageNormalizer};
pub use types::{round4, NormalizedDocument, PageResult, RegionResult, SourceKind};
