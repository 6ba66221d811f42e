//! Folium
//!
//! Document extraction and page-serving backend for a self-hosted
//! reference manager. Uploaded PDFs (and office documents converted on the
//! way in) are indexed into SQLite: full text, per-word bounding boxes and
//! hyperlink regions, plus user highlights and notes. Page rasters at
//! fixed zoom tiers are produced by external poppler binaries through a
//! garbage-collected file cache, with OCR as the fallback for scanned
//! documents.
//!
//! # Modules
//!
//! - `index`: item-centric facade (import, lazy indexing, pages, search)
//! - `pdf`: extraction pipeline over the poppler binaries
//! - `ocr`: recognition engine abstraction and page-by-page coordination
//! - `cache`: derived-artifact file cache and its garbage collector
//! - `queue`: named in-process locks serializing binary invocations
//! - `db`: SQLite repositories

pub mod binaries;
pub mod cache;
pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod index;
pub mod logging;
pub mod ocr;
pub mod pdf;
pub mod queue;
pub mod state;

pub use error::{AppError, Result};
pub use state::AppState;
