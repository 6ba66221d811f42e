//! Page-by-page OCR orchestration

use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::db::PageBoxRepository;
use crate::error::Result;
use crate::pdf::{PageBox, PdfExtractor, Zoom};
use crate::queue::{LockQueue, BINARY_LOCK};

use super::engine::OcrEngine;

/// Separates page texts in the accumulated document text (form feed, same
/// separator pdftotext emits between pages).
pub const PAGE_SEPARATOR: char = '\u{000C}';

/// Zoom tier used for recognition rasters. The highest tier; recognition
/// quality drops sharply below 300 DPI.
const OCR_ZOOM: Zoom = Zoom::Z300;

/// Runs recognition across all pages of an item and persists word boxes as
/// it goes. A failed page is logged and skipped: partial OCR output is
/// more useful than none, and the per-page writes mean completed pages
/// survive a crash mid-document.
pub struct OcrCoordinator {
    engine: Arc<dyn OcrEngine>,
    extractor: PdfExtractor,
    queue: Arc<LockQueue>,
    pool: SqlitePool,
    language: String,
}

impl OcrCoordinator {
    pub fn new(
        engine: Arc<dyn OcrEngine>,
        extractor: PdfExtractor,
        queue: Arc<LockQueue>,
        pool: SqlitePool,
        language: &str,
    ) -> Self {
        Self {
            engine,
            extractor,
            queue,
            pool,
            language: language.to_string(),
        }
    }

    pub async fn is_available(&self) -> bool {
        self.engine.is_available().await
    }

    /// Recognize every page and return the accumulated document text with
    /// form-feed page separators. Page ordinals in the text stay aligned
    /// with page numbers even when individual pages fail.
    pub async fn ocr_item(&self, item_id: &str, pdf: &Path, page_count: i64) -> Result<String> {
        let boxes = PageBoxRepository::new(&self.pool);
        let mut text = String::new();

        for page in 1..=page_count {
            if page > 1 {
                text.push(PAGE_SEPARATOR);
            }

            match self.ocr_page(item_id, pdf, page).await {
                Ok((page_text, page_boxes)) => {
                    boxes.replace_page(item_id, page, &page_boxes).await?;
                    text.push_str(&page_text);
                }
                Err(e) => {
                    tracing::warn!(item_id, page, error = %e, "ocr failed for page, skipping");
                }
            }
        }

        Ok(text)
    }

    async fn ocr_page(
        &self,
        item_id: &str,
        pdf: &Path,
        page: i64,
    ) -> Result<(String, Vec<PageBox>)> {
        let image = self
            .extractor
            .render_page(item_id, pdf, page, OCR_ZOOM)
            .await?;

        // Lock held only around the engine invocation, not the raster
        let recognized = {
            let _guard = self.queue.wait(BINARY_LOCK).await?;
            self.engine.recognize(&image, &self.language).await?
        };

        let page_boxes = recognized
            .words
            .iter()
            .enumerate()
            .map(|(i, w)| PageBox {
                item_id: item_id.to_string(),
                page,
                position: (i + 1) as i64,
                top: w.top,
                left: w.left,
                width: w.width,
                height: w.height,
                word: w.word.clone(),
            })
            .collect();

        Ok((recognized.text, page_boxes))
    }
}
