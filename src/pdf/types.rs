//! PDF pipeline data types
//!
//! All box geometry is normalized to a fixed-precision integer unit, tenths
//! of a percent of the page dimension (0..=1000), so it is independent of
//! the zoom tier used for rendering. Crop requests use a finer 1/10000 unit.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Box geometry unit: tenths of a percent of the page dimension.
pub const GEOMETRY_SCALE: i64 = 1000;

/// Crop coordinate unit: 1/10000 of the page dimension.
pub const CROP_SCALE: u32 = 10_000;

/// Supported rasterization resolutions. A closed set: any other value is a
/// validation error, rejected before any binary invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Zoom {
    Z200,
    Z250,
    Z300,
}

impl Zoom {
    pub const ALL: [Zoom; 3] = [Zoom::Z200, Zoom::Z250, Zoom::Z300];

    /// DPI passed to the rasterizer; the tier value is the DPI.
    pub fn dpi(self) -> u32 {
        u32::from(self)
    }
}

impl TryFrom<u32> for Zoom {
    type Error = AppError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            200 => Ok(Zoom::Z200),
            250 => Ok(Zoom::Z250),
            300 => Ok(Zoom::Z300),
            other => Err(AppError::Validation(format!(
                "unsupported zoom {} (supported: 200, 250, 300)",
                other
            ))),
        }
    }
}

impl From<Zoom> for u32 {
    fn from(zoom: Zoom) -> u32 {
        match zoom {
            Zoom::Z200 => 200,
            Zoom::Z250 => 250,
            Zoom::Z300 => 300,
        }
    }
}

/// Extraction lifecycle of an uploaded PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    /// Imported, nothing extracted yet
    Uploaded,
    /// Native text layer extracted
    TextExtracted,
    /// No extractable text layer; OCR required
    OcrPending,
    /// Word boxes and links indexed
    Indexed,
}

impl ExtractionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionState::Uploaded => "uploaded",
            ExtractionState::TextExtracted => "text_extracted",
            ExtractionState::OcrPending => "ocr_pending",
            ExtractionState::Indexed => "indexed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "uploaded" => Ok(ExtractionState::Uploaded),
            "text_extracted" => Ok(ExtractionState::TextExtracted),
            "ocr_pending" => Ok(ExtractionState::OcrPending),
            "indexed" => Ok(ExtractionState::Indexed),
            other => Err(AppError::Internal(format!(
                "unknown extraction state '{}'",
                other
            ))),
        }
    }
}

/// One word-level bounding box, used to render search-highlight and
/// selection overlays on a page image. Immutable once written for a given
/// extraction pass; fully replaced on re-extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PageBox {
    pub item_id: String,
    /// 1-based page number
    pub page: i64,
    /// Ordinal within the page
    pub position: i64,
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
    pub word: String,
}

/// A hyperlink region on a rendered page. Same replace-on-reextract
/// semantics as [`PageBox`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PageLink {
    pub item_id: String,
    pub page: i64,
    pub link: String,
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
}

/// A bookmark/outline entry: (title, target page) with nested children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub title: String,
    pub page: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Bookmark>,
}

/// Crop of a cached page raster, in 1/10000 page units.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRequest {
    /// 1-based page number
    pub page: i64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub zoom: Zoom,
}

impl CropRequest {
    /// Validate coordinates before any binary invocation: x,y in
    /// [0, 10000], width/height in [1, 10000], page >= 1. The zoom tier is
    /// already validated by construction of [`Zoom`].
    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(AppError::Validation(format!(
                "page {} out of range",
                self.page
            )));
        }
        if self.x > CROP_SCALE || self.y > CROP_SCALE {
            return Err(AppError::Validation(format!(
                "crop origin ({}, {}) outside [0, {}]",
                self.x, self.y, CROP_SCALE
            )));
        }
        if self.width == 0 || self.height == 0 || self.width > CROP_SCALE || self.height > CROP_SCALE
        {
            return Err(AppError::Validation(format!(
                "crop size {}x{} outside [1, {}]",
                self.width, self.height, CROP_SCALE
            )));
        }
        Ok(())
    }
}

/// Normalize a coordinate against a page dimension into tenths of a
/// percent, clamped to the valid range.
pub(crate) fn normalize(value: f64, total: f64) -> i64 {
    if total <= 0.0 {
        return 0;
    }
    let scaled = (value / total * GEOMETRY_SCALE as f64).round() as i64;
    scaled.clamp(0, GEOMETRY_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_closed_enum() {
        assert_eq!(Zoom::try_from(200).unwrap(), Zoom::Z200);
        assert_eq!(Zoom::try_from(250).unwrap(), Zoom::Z250);
        assert_eq!(Zoom::try_from(300).unwrap(), Zoom::Z300);
        for bad in [0, 100, 150, 201, 400] {
            assert!(matches!(
                Zoom::try_from(bad),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_zoom_dpi_mapping() {
        assert_eq!(Zoom::Z200.dpi(), 200);
        assert_eq!(Zoom::Z300.dpi(), 300);
    }

    #[test]
    fn test_zoom_serde_roundtrip() {
        let json = serde_json::to_string(&Zoom::Z250).unwrap();
        assert_eq!(json, "250");
        let zoom: Zoom = serde_json::from_str("300").unwrap();
        assert_eq!(zoom, Zoom::Z300);
        assert!(serde_json::from_str::<Zoom>("999").is_err());
    }

    #[test]
    fn test_extraction_state_roundtrip() {
        for state in [
            ExtractionState::Uploaded,
            ExtractionState::TextExtracted,
            ExtractionState::OcrPending,
            ExtractionState::Indexed,
        ] {
            assert_eq!(ExtractionState::parse(state.as_str()).unwrap(), state);
        }
        assert!(ExtractionState::parse("bogus").is_err());
    }

    #[test]
    fn test_crop_validation() {
        let ok = CropRequest {
            page: 1,
            x: 0,
            y: 0,
            width: 5000,
            height: 5000,
            zoom: Zoom::Z200,
        };
        assert!(ok.validate().is_ok());

        let zero_size = CropRequest { width: 0, ..ok.clone() };
        assert!(zero_size.validate().is_err());

        let out_of_range = CropRequest { x: 10_001, ..ok.clone() };
        assert!(out_of_range.validate().is_err());

        let bad_page = CropRequest { page: 0, ..ok };
        assert!(bad_page.validate().is_err());
    }

    #[test]
    fn test_normalize_clamps() {
        assert_eq!(normalize(0.0, 612.0), 0);
        assert_eq!(normalize(612.0, 612.0), 1000);
        assert_eq!(normalize(306.0, 612.0), 500);
        assert_eq!(normalize(-5.0, 612.0), 0);
        assert_eq!(normalize(700.0, 612.0), 1000);
        assert_eq!(normalize(10.0, 0.0), 0);
    }
}
