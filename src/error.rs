//! Error types for the Folium pipeline
//!
//! The taxonomy follows the recovery policy of the pipeline: validation and
//! not-found errors are client errors, `Unavailable` marks a feature that
//! degrades because an external binary is missing, and `LockContention` is
//! the retryable failure surfaced when the mutual-exclusion queue never
//! becomes free. Everything affecting a single page/artifact is recovered
//! component-locally and never reaches this type.

use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected before any binary invocation (zoom tier, crop bounds, keys)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Dependent feature degraded because an external tool is missing
    #[error("Feature unavailable: {0}")]
    Unavailable(String),

    /// The named lock never became free; callers should surface "try again"
    #[error("Lock contention: {0}")]
    LockContention(String),

    #[error("External command failed: {0}")]
    Command(String),

    #[error("External command timed out after {0}s")]
    CommandTimeout(u64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may simply retry the operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::LockContention(_))
    }

    /// Whether this is a client-side error (nothing was executed).
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::NotFound(_))
    }
}
