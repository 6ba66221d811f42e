//! Office document to PDF conversion
//!
//! Uses a headless LibreOffice invocation to turn word-processor and
//! spreadsheet uploads into PDFs that the extraction pipeline can handle.
//! LibreOffice refuses to run concurrently against the same profile, so
//! every conversion holds the shared binary lock for its duration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::binaries::{Binaries, Tool};
use crate::cache::{FileCache, Namespace};
use crate::error::{AppError, Result};
use crate::queue::{LockQueue, BINARY_LOCK};

/// Upload extensions accepted for conversion.
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "txt", "xls", "xlsx", "ods", "ppt", "pptx", "odp", "epub",
];

#[derive(Debug, Clone)]
pub struct OfficeConverter {
    binaries: Binaries,
    cache: FileCache,
    queue: Arc<LockQueue>,
}

impl OfficeConverter {
    pub fn new(binaries: Binaries, cache: FileCache, queue: Arc<LockQueue>) -> Self {
        Self {
            binaries,
            cache,
            queue,
        }
    }

    /// Whether the file extension is one we can convert.
    pub fn is_convertible(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| CONVERTIBLE_EXTENSIONS.contains(&e.as_str()))
    }

    /// Convert an office document to PDF and return the cached PDF path in
    /// the temp namespace. Idempotent per input content.
    pub async fn to_pdf(&self, source: &Path) -> Result<PathBuf> {
        let bytes = std::fs::read(source)?;
        let key = FileCache::content_key(&bytes, "pdf");
        if let Some(cached) = self.cache.get(Namespace::Temp, &key)? {
            return Ok(cached);
        }

        let out_dir = tempfile::tempdir()?;
        let _guard = self.queue.wait(BINARY_LOCK).await?;
        self.binaries
            .run_status(
                Tool::Soffice,
                [
                    "--headless".as_ref(),
                    "--convert-to".as_ref(),
                    "pdf".as_ref(),
                    "--outdir".as_ref(),
                    out_dir.path().as_os_str(),
                    source.as_os_str(),
                ],
            )
            .await?;

        let produced = find_pdf(out_dir.path())?;
        let pdf_bytes = std::fs::read(produced)?;
        self.cache.put(Namespace::Temp, &key, &pdf_bytes)
    }
}

/// LibreOffice derives the output filename from the input; locate whatever
/// single PDF landed in the output directory.
fn find_pdf(dir: &Path) -> Result<PathBuf> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "pdf") {
            return Ok(path);
        }
    }
    Err(AppError::Command(
        "soffice produced no PDF output".to_string(),
    ))
}
