//! PDF extraction pipeline
//!
//! Given an uploaded PDF, produces plain text, per-page word bounding boxes,
//! page rasters at the supported zoom tiers, the bookmark outline, hyperlink
//! regions, and crops of cached rasters. All rendering/extraction work is
//! delegated to external poppler binaries; this module orchestrates them and
//! normalizes their output.

pub mod crop;
pub mod extract;
pub mod types;

pub use crop::crop_page;
pub use extract::{PdfExtractor, PdfInfo};
pub use types::{Bookmark, CropRequest, ExtractionState, PageBox, PageLink, Zoom, GEOMETRY_SCALE};
