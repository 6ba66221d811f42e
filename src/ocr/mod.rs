//! OCR for scanned documents
//!
//! Items whose PDFs carry no usable text layer are rasterized page by page
//! and run through an external recognition engine. The engine sits behind
//! [`OcrEngine`] so tests can substitute a deterministic implementation.

mod coordinator;
mod engine;

pub use coordinator::{OcrCoordinator, PAGE_SEPARATOR};
pub use engine::{OcrEngine, OcrPage, OcrWord, TesseractEngine};
