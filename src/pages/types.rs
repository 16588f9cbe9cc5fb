//! Page/region result types

use std::path::Path;

use serde::Serialize;

use crate::ocr::{BoundingBox, Region};

/// Decimal places kept for percentages, density and confidence
pub const PRECISION_DECIMALS: i32 = 4;

/// Round to [`PRECISION_DECIMALS`] places
pub fn round4(value: f64) -> f64 {
    let factor = 10f64.powi(PRECISION_DECIMALS);
    (value * factor).round() / factor
}

/// How a source file is turned into pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Image,
}

impl SourceKind {
    /// `.pdf` (any case) is a PDF; everything else is decoded as an image
    pub fn classify(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => Self::Pdf,
            _ => Self::Image,
        }
    }
}

/// A recognized region with its density on the page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionResult {
    pub text: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    /// Fraction of the page covered by the bbox: `w_pct * h_pct / 10000`
    pub density: f64,
}

impl RegionResult {
    /// Clamp the box into 0-100, compute density and round everything
    pub fn from_region(region: Region) -> Self {
        let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 100.0) } else { 0.0 };

        let x = clamp(region.bbox.x_pct);
        let y = clamp(region.bbox.y_pct);
        let w = clamp(region.bbox.w_pct);
        let h = clamp(region.bbox.h_pct);
        let density = (w * h / 10_000.0).clamp(0.0, 1.0);

        let confidence = if region.confidence.is_finite() {
            region.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            text: region.text,
            confidence: round4(confidence),
            bbox: BoundingBox {
                x_pct: round4(x),
                y_pct: round4(y),
                w_pct: round4(w),
                h_pct: round4(h),
            },
            density: round4(density),
        }
    }
}

/// One page of a source file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    /// 1-indexed, in document order
    pub page_number: u32,
    /// Pixel width of the image or rendered page
    pub width: u32,
    /// Pixel height of the image or rendered page
    pub height: u32,
    pub regions: Vec<RegionResult>,
}

/// Everything extracted from one source file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedDocument {
    /// Lowercase type name: `pdf`, `png`, `jpeg`, ...
    pub filetype: String,
    pub pages: Vec<PageResult>,
}

impl NormalizedDocument {
    pub fn region_count(&self) -> usize {
        self.pages.iter().map(|p| p.regions.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::region;

    #[test]
    fn test_classify() {
        assert_eq!(SourceKind::classify(Path::new("/scans/a.pdf")), SourceKind::Pdf);
        assert_eq!(SourceKind::classify(Path::new("/scans/A.PDF")), SourceKind::Pdf);
        assert_eq!(SourceKind::classify(Path::new("/scans/a.png")), SourceKind::Image);
        assert_eq!(SourceKind::classify(Path::new("/scans/noext")), SourceKind::Image);
    }

    #[test]
    fn test_density_from_bbox() {
        let result = RegionResult::from_region(region("x", 10.0, 20.0, 50.0, 10.0));
        assert_eq!(result.density, 0.05);
        assert_eq!(result.bbox.x_pct, 10.0);
        assert_eq!(result.bbox.h_pct, 10.0);
    }

    #[test]
    fn test_rounding_to_four_places() {
        let result = RegionResult::from_region(region("x", 12.345678, 0.000049, 33.333333, 33.333333));
        assert_eq!(result.bbox.x_pct, 12.3457);
        assert_eq!(result.bbox.y_pct, 0.0);
        assert_eq!(result.bbox.w_pct, 33.3333);
        assert_eq!(result.density, 0.1111);
    }

    #[test]
    fn test_out_of_range_boxes_are_clamped() {
        let result = RegionResult::from_region(region("x", -0.5, 99.0, 120.0, f64::NAN));
        assert_eq!(result.bbox.x_pct, 0.0);
        assert_eq!(result.bbox.w_pct, 100.0);
        assert_eq!(result.bbox.h_pct, 0.0);
        assert_eq!(result.density, 0.0);
        assert!((0.0..=1.0).contains(&result.density));
    }
}
