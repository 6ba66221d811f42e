//! Page index store
//!
//! Ties the extraction pipeline, the SQLite repositories and the artifact
//! cache together behind one item-centric API: import on upload, lazy
//! indexing of word boxes and links, page image serving with a hot LRU
//! layer, and search over the indexed words.

mod search;

pub use search::{search_stream, SearchChunk, SearchEvent, Snippet, SEARCH_CHUNK_PAGES};

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::Stream;
use lru::LruCache;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::cache::GarbageCollector;
use crate::db::{ItemRecord, ItemRepository, PageBoxRepository, PageLinkRepository};
use crate::error::{AppError, Result};
use crate::ocr::OcrCoordinator;
use crate::pdf::{
    crop_page, Bookmark, CropRequest, ExtractionState, PageBox, PageLink, PdfExtractor, Zoom,
};

pub struct PageIndex {
    pool: SqlitePool,
    extractor: PdfExtractor,
    gc: Arc<GarbageCollector>,
    coordinator: Arc<OcrCoordinator>,
    /// Hot layer over the on-disk page cache, keyed by page cache key.
    hot: RwLock<LruCache<String, PathBuf>>,
}

impl PageIndex {
    pub fn new(
        pool: SqlitePool,
        extractor: PdfExtractor,
        gc: Arc<GarbageCollector>,
        coordinator: Arc<OcrCoordinator>,
        hot_pages: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(hot_pages.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            pool,
            extractor,
            gc,
            coordinator,
            hot: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Upload-time extraction: page count, text layer probe, thumbnail.
    /// Leaves the item in `TextExtracted` or `OcrPending`.
    pub async fn import(&self, item_id: &str, pdf: &Path) -> Result<ItemRecord> {
        let info = self.extractor.info(pdf).await?;
        let text = self.extractor.extract_text(pdf).await?;

        let items = ItemRepository::new(&self.pool);
        let record = if PdfExtractor::has_text(&text) {
            items
                .import(item_id, info.pages, ExtractionState::TextExtracted, Some(&text))
                .await?
        } else {
            items
                .import(item_id, info.pages, ExtractionState::OcrPending, None)
                .await?
        };

        self.extractor.thumbnail(item_id, pdf).await?;
        Ok(record)
    }

    /// Bring the item to `Indexed`, doing whatever extraction is still
    /// missing. Idempotent; cheap when already indexed.
    pub async fn ensure_indexed(&self, item_id: &str, pdf: &Path) -> Result<ItemRecord> {
        let items = ItemRepository::new(&self.pool);
        let mut record = match items.get(item_id).await? {
            Some(r) => r,
            None => self.import(item_id, pdf).await?,
        };
        if record.extraction_state()? == ExtractionState::Uploaded {
            record = self.import(item_id, pdf).await?;
        }

        match record.extraction_state()? {
            ExtractionState::Indexed => Ok(record),
            ExtractionState::TextExtracted => {
                let boxes = self.extractor.word_boxes(item_id, pdf).await?;
                PageBoxRepository::new(&self.pool)
                    .replace_item(item_id, &boxes)
                    .await?;
                self.index_links(item_id, pdf).await?;
                items.set_state(item_id, ExtractionState::Indexed).await?;
                self.fetch(item_id).await
            }
            ExtractionState::OcrPending => {
                if !self.coordinator.is_available().await {
                    return Err(AppError::Unavailable(
                        "no text layer and no OCR engine installed".to_string(),
                    ));
                }
                self.index_links(item_id, pdf).await?;
                let text = self
                    .coordinator
                    .ocr_item(item_id, pdf, record.page_count)
                    .await?;
                items
                    .set_full_text(item_id, &text, ExtractionState::Indexed)
                    .await?;
                self.fetch(item_id).await
            }
            ExtractionState::Uploaded => Err(AppError::Internal(
                "item still unprocessed after import".to_string(),
            )),
        }
    }

    /// Index link regions for an item. Link extraction rides on a separate
    /// binary, so its failure degrades the item to an empty link set rather
    /// than failing the whole indexing pass.
    async fn index_links(&self, item_id: &str, pdf: &Path) -> Result<()> {
        let links = match self.extractor.links(item_id, pdf).await {
            Ok(links) => links,
            Err(err) => {
                tracing::warn!(item = item_id, error = %err, "link extraction failed, item indexed without links");
                Vec::new()
            }
        };
        PageLinkRepository::new(&self.pool)
            .replace_item(item_id, &links)
            .await
    }

    async fn fetch(&self, item_id: &str) -> Result<ItemRecord> {
        ItemRepository::new(&self.pool)
            .get(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("item {}", item_id)))
    }

    /// Serve one rendered page, through the hot LRU layer. Every call is
    /// also a GC trigger point.
    pub async fn page_image(
        &self,
        item_id: &str,
        pdf: &Path,
        page: i64,
        zoom: Zoom,
    ) -> Result<PathBuf> {
        let record = self.fetch(item_id).await?;
        if page < 1 || page > record.page_count {
            return Err(AppError::Validation(format!(
                "page {} out of range for item {} ({} pages)",
                page, item_id, record.page_count
            )));
        }

        let key = crate::cache::FileCache::page_key(item_id, page, zoom);

        {
            let mut hot = self.hot.write().await;
            if let Some(path) = hot.get(&key) {
                if path.is_file() {
                    return Ok(path.clone());
                }
                // Swept from disk since it was cached
                hot.pop(&key);
            }
        }

        let path = self.extractor.render_page(item_id, pdf, page, zoom).await?;
        self.hot.write().await.put(key, path.clone());
        self.gc.maybe_clean();
        Ok(path)
    }

    /// Crop of one rendered page.
    pub async fn page_crop(
        &self,
        item_id: &str,
        pdf: &Path,
        request: &CropRequest,
    ) -> Result<PathBuf> {
        request.validate()?;
        let rendered = self
            .page_image(item_id, pdf, request.page, request.zoom)
            .await?;
        crop_page(self.extractor.cache(), item_id, &rendered, request)
    }

    /// Item thumbnail.
    pub async fn icon(&self, item_id: &str, pdf: &Path) -> Result<PathBuf> {
        self.extractor.thumbnail(item_id, pdf).await
    }

    /// Word boxes within an inclusive page window, grouped by page. Lazily
    /// indexes the item first, so a caller always reads its own extraction.
    pub async fn boxes(
        &self,
        item_id: &str,
        pdf: &Path,
        first_page: i64,
        last_page: i64,
    ) -> Result<BTreeMap<i64, Vec<PageBox>>> {
        self.ensure_indexed(item_id, pdf).await?;
        let all = PageBoxRepository::new(&self.pool)
            .for_pages(item_id, first_page, last_page)
            .await?;
        let mut grouped: BTreeMap<i64, Vec<PageBox>> = BTreeMap::new();
        for b in all {
            grouped.entry(b.page).or_default().push(b);
        }
        Ok(grouped)
    }

    /// Link regions within an inclusive page window, grouped by page. Same
    /// lazy-indexing contract as [`Self::boxes`].
    pub async fn links(
        &self,
        item_id: &str,
        pdf: &Path,
        first_page: i64,
        last_page: i64,
    ) -> Result<BTreeMap<i64, Vec<PageLink>>> {
        self.ensure_indexed(item_id, pdf).await?;
        let all = PageLinkRepository::new(&self.pool)
            .for_pages(item_id, first_page, last_page)
            .await?;
        let mut grouped: BTreeMap<i64, Vec<PageLink>> = BTreeMap::new();
        for l in all {
            grouped.entry(l.page).or_default().push(l);
        }
        Ok(grouped)
    }

    /// Bookmark outline, parsed once per item and cached as an artifact.
    pub async fn bookmarks(&self, item_id: &str, pdf: &Path) -> Result<Vec<Bookmark>> {
        let cache = self.extractor.cache();
        let key = crate::cache::FileCache::outline_key(item_id);
        if let Some(bytes) = cache.read(crate::cache::Namespace::Temp, &key)? {
            if let Ok(outline) = serde_json::from_slice(&bytes) {
                return Ok(outline);
            }
            // Unreadable cached outline, re-extract below.
        }

        let outline = self.extractor.bookmarks(pdf).await?;
        cache.put(
            crate::cache::Namespace::Temp,
            &key,
            &serde_json::to_vec(&outline)?,
        )?;
        Ok(outline)
    }

    /// Search the indexed words of an item, lazily, in ascending page
    /// order starting at `from_page`. The item must be indexed first.
    pub async fn search(
        &self,
        item_id: &str,
        term: &str,
        from_page: i64,
    ) -> Result<impl Stream<Item = Result<SearchEvent>>> {
        if term.trim().is_empty() {
            return Err(AppError::Validation("empty search term".to_string()));
        }
        let record = self.fetch(item_id).await?;
        if record.extraction_state()? != ExtractionState::Indexed {
            return Err(AppError::Validation(format!(
                "item {} is not indexed yet",
                item_id
            )));
        }

        Ok(search_stream(
            self.pool.clone(),
            item_id.to_string(),
            term.trim().to_string(),
            record.page_count,
            from_page.max(1),
        ))
    }

    /// Drop everything stored for an item: rows and cached artifacts.
    pub async fn remove_item(&self, item_id: &str) -> Result<()> {
        ItemRepository::new(&self.pool).delete(item_id).await?;
        PageBoxRepository::new(&self.pool)
            .delete_item(item_id)
            .await?;
        PageLinkRepository::new(&self.pool)
            .delete_item(item_id)
            .await?;
        crate::db::HighlightRepository::new(&self.pool)
            .delete_item(item_id)
            .await?;
        crate::db::NoteRepository::new(&self.pool)
            .delete_item(item_id)
            .await?;

        let cache = self.extractor.cache();
        cache.remove(
            crate::cache::Namespace::Icons,
            &crate::cache::FileCache::icon_key(item_id),
        )?;
        cache.remove(
            crate::cache::Namespace::Temp,
            &crate::cache::FileCache::outline_key(item_id),
        )?;
        // Page rasters are left to the sweeper; there is one per
        // (page, zoom) and enumerating them here is not worth it.
        self.hot.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binaries::Binaries;
    use crate::config::Config;
    use crate::db::{CreateHighlight, HighlightColor, HighlightRepository, ItemRepository};
    use crate::ocr::{OcrEngine, OcrPage};
    use crate::queue::LockQueue;

    use async_trait::async_trait;
    use futures::StreamExt;

    struct NullEngine;

    #[async_trait]
    impl OcrEngine for NullEngine {
        async fn is_available(&self) -> bool {
            false
        }

        async fn recognize(&self, _image: &Path, _language: &str) -> Result<OcrPage> {
            Err(AppError::Unavailable("no engine".to_string()))
        }
    }

    async fn index() -> (PageIndex, SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = crate::cache::FileCache::new(dir.path().join("cache")).unwrap();

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::initialize_schema(&pool).await.unwrap();

        let config = Config::default();
        let binaries = Binaries::new(config.binaries.clone());
        let extractor = PdfExtractor::new(binaries, cache.clone());
        let gc = Arc::new(GarbageCollector::new(cache, config.gc.clone()));
        let queue = Arc::new(LockQueue::new(&config.queue));
        let coordinator = Arc::new(OcrCoordinator::new(
            Arc::new(NullEngine),
            extractor.clone(),
            queue,
            pool.clone(),
            "eng",
        ));

        let index = PageIndex::new(pool.clone(), extractor, gc, coordinator, 10);
        (index, pool, dir)
    }

    fn word(page: i64, position: i64, text: &str) -> PageBox {
        PageBox {
            item_id: "item-1".to_string(),
            page,
            position,
            top: 0,
            left: 0,
            width: 10,
            height: 10,
            word: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_boxes_grouped_by_page() {
        let (index, pool, _dir) = index().await;
        ItemRepository::new(&pool)
            .import("item-1", 2, ExtractionState::Indexed, Some("text"))
            .await
            .unwrap();
        PageBoxRepository::new(&pool)
            .replace_item(
                "item-1",
                &[word(2, 1, "b"), word(1, 1, "a"), word(2, 2, "c")],
            )
            .await
            .unwrap();

        let grouped = index
            .boxes("item-1", Path::new("/nonexistent.pdf"), 1, 2)
            .await
            .unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&1].len(), 1);
        assert_eq!(grouped[&2].len(), 2);
        // BTreeMap iteration is page-ordered
        let pages: Vec<i64> = grouped.keys().copied().collect();
        assert_eq!(pages, [1, 2]);

        // The window is honored
        let only_second = index
            .boxes("item-1", Path::new("/nonexistent.pdf"), 2, 2)
            .await
            .unwrap();
        assert_eq!(only_second.len(), 1);
        assert!(only_second.contains_key(&2));
    }

    #[tokio::test]
    async fn test_page_image_rejects_out_of_range_page() {
        let (index, pool, _dir) = index().await;
        ItemRepository::new(&pool)
            .import("item-1", 3, ExtractionState::Indexed, Some("text"))
            .await
            .unwrap();

        for page in [0, 4, 9999] {
            let err = index
                .page_image("item-1", Path::new("/nonexistent.pdf"), page, Zoom::Z200)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "page {page}");
        }

        let err = index
            .page_image("missing", Path::new("/nonexistent.pdf"), 1, Zoom::Z200)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_link_indexing_failure_stores_empty_set() {
        let (index, pool, _dir) = index().await;
        // No extraction binaries are installed here; the failure must
        // degrade to an empty link set instead of erroring out.
        index
            .index_links("item-1", Path::new("/nonexistent.pdf"))
            .await
            .unwrap();
        assert!(PageLinkRepository::new(&pool)
            .for_item("item-1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_bookmarks_served_from_cached_outline() {
        let (index, _pool, _dir) = index().await;
        let outline = vec![Bookmark {
            title: "Chapter 1".to_string(),
            page: 3,
            children: Vec::new(),
        }];
        index
            .extractor
            .cache()
            .put(
                crate::cache::Namespace::Temp,
                &crate::cache::FileCache::outline_key("item-1"),
                &serde_json::to_vec(&outline).unwrap(),
            )
            .unwrap();

        // No extraction binaries are installed, so this only succeeds if
        // the cached outline is served.
        let served = index
            .bookmarks("item-1", Path::new("/nonexistent.pdf"))
            .await
            .unwrap();
        assert_eq!(served, outline);
    }

    #[tokio::test]
    async fn test_search_requires_indexed_item() {
        let (index, pool, _dir) = index().await;
        let items = ItemRepository::new(&pool);

        let err = index.search("missing", "term", 1).await.err().unwrap();
        assert!(matches!(err, AppError::NotFound(_)));

        items
            .import("item-1", 5, ExtractionState::OcrPending, None)
            .await
            .unwrap();
        let err = index.search("item-1", "term", 1).await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));

        items
            .import("item-1", 5, ExtractionState::Indexed, Some("text"))
            .await
            .unwrap();
        PageBoxRepository::new(&pool)
            .replace_item("item-1", &[word(2, 1, "needle")])
            .await
            .unwrap();

        let events: Vec<_> = index
            .search("item-1", "needle", 1)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_search_rejects_blank_term() {
        let (index, _pool, _dir) = index().await;
        let err = index.search("item-1", "  ", 1).await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_ensure_indexed_without_engine_is_unavailable() {
        let (index, pool, _dir) = index().await;
        ItemRepository::new(&pool)
            .import("item-1", 3, ExtractionState::OcrPending, None)
            .await
            .unwrap();

        let err = index
            .ensure_indexed("item-1", Path::new("/nonexistent.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_ensure_indexed_noop_when_indexed() {
        let (index, pool, _dir) = index().await;
        ItemRepository::new(&pool)
            .import("item-1", 3, ExtractionState::Indexed, Some("done"))
            .await
            .unwrap();

        // No binaries installed in the test environment; an already
        // indexed item must not touch them.
        let record = index
            .ensure_indexed("item-1", Path::new("/nonexistent.pdf"))
            .await
            .unwrap();
        assert_eq!(record.extraction_state().unwrap(), ExtractionState::Indexed);
    }

    #[tokio::test]
    async fn test_remove_item_clears_rows() {
        let (index, pool, _dir) = index().await;
        ItemRepository::new(&pool)
            .import("item-1", 1, ExtractionState::Indexed, None)
            .await
            .unwrap();
        PageBoxRepository::new(&pool)
            .replace_item("item-1", &[word(1, 1, "x")])
            .await
            .unwrap();
        HighlightRepository::new(&pool)
            .create(
                "item-1",
                &CreateHighlight {
                    page: 1,
                    color: HighlightColor::Yellow,
                    top: 0,
                    left: 0,
                    width: 10,
                    height: 10,
                    snippet: None,
                },
            )
            .await
            .unwrap();

        index.remove_item("item-1").await.unwrap();

        assert!(ItemRepository::new(&pool)
            .get("item-1")
            .await
            .unwrap()
            .is_none());
        assert!(PageBoxRepository::new(&pool)
            .for_item("item-1")
            .await
            .unwrap()
            .is_empty());
        assert!(HighlightRepository::new(&pool)
            .for_item("item-1")
            .await
            .unwrap()
            .is_empty());
    }
}
