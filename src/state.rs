//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::binaries::Binaries;
use crate::cache::{FileCache, GarbageCollector};
use crate::config::Config;
use crate::convert::OfficeConverter;
use crate::error::Result;
use crate::index::PageIndex;
use crate::ocr::{OcrCoordinator, OcrEngine, TesseractEngine};
use crate::pdf::PdfExtractor;
use crate::queue::LockQueue;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    cache: FileCache,
    binaries: Binaries,
    queue: Arc<LockQueue>,
    index: PageIndex,
    converter: OfficeConverter,
}

impl AppState {
    /// Wire the default (Tesseract) recognition engine.
    pub async fn new(config: Config) -> Result<Self> {
        let binaries = Binaries::new(config.binaries.clone());
        let engine = Arc::new(TesseractEngine::new(binaries.clone()));
        Self::with_engine(config, engine).await
    }

    /// Wire an explicit recognition engine; tests substitute their own.
    pub async fn with_engine(config: Config, engine: Arc<dyn OcrEngine>) -> Result<Self> {
        let db = crate::db::create_pool(&config.database.url).await?;
        let cache = FileCache::new(&config.cache.root)?;
        let binaries = Binaries::new(config.binaries.clone());
        let queue = Arc::new(LockQueue::new(&config.queue));
        let gc = Arc::new(GarbageCollector::new(cache.clone(), config.gc.clone()));

        let extractor = PdfExtractor::new(binaries.clone(), cache.clone());
        let coordinator = Arc::new(OcrCoordinator::new(
            engine,
            extractor.clone(),
            queue.clone(),
            db.clone(),
            &config.ocr.language,
        ));
        let index = PageIndex::new(
            db.clone(),
            extractor,
            gc,
            coordinator,
            config.cache.hot_pages,
        );
        let converter = OfficeConverter::new(binaries.clone(), cache.clone(), queue.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                cache,
                binaries,
                queue,
                index,
                converter,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    pub fn cache(&self) -> &FileCache {
        &self.inner.cache
    }

    pub fn binaries(&self) -> &Binaries {
        &self.inner.binaries
    }

    pub fn queue(&self) -> &Arc<LockQueue> {
        &self.inner.queue
    }

    pub fn index(&self) -> &PageIndex {
        &self.inner.index
    }

    pub fn converter(&self) -> &OfficeConverter {
        &self.inner.converter
    }
}
