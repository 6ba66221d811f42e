//! Configuration for the Folium pipeline
//!
//! An explicit, immutable config struct is built once and passed into each
//! component at construction. Merging with defaults is a pure function:
//! explicit overrides win, everything else comes from `Config::default()`.

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cache: CacheConfig,
    pub gc: GcConfig,
    pub binaries: BinaryConfig,
    pub queue: QueueConfig,
    pub ocr: OcrConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Root directory holding the `icons`, `pages` and `temp` namespaces
    pub root: PathBuf,
    /// Capacity of the in-memory hot-page layer (rendered pages)
    pub hot_pages: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GcConfig {
    /// Most-recently-modified files to keep in the icons namespace
    pub keep_icons: usize,
    /// Most-recently-modified files to keep in the pages namespace
    pub keep_pages: usize,
    /// Age in seconds after which temp files are collected
    pub temp_ttl_secs: u64,
    /// One in `probability` calls to `maybe_clean` actually sweeps
    pub probability: u32,
}

/// Configured override paths for external tools. `None` falls back to a
/// PATH lookup at invocation time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BinaryConfig {
    pub pdftotext: Option<PathBuf>,
    pub pdfinfo: Option<PathBuf>,
    pub pdftohtml: Option<PathBuf>,
    pub pdftoppm: Option<PathBuf>,
    pub gs: Option<PathBuf>,
    pub tesseract: Option<PathBuf>,
    pub soffice: Option<PathBuf>,
    /// Per-invocation timeout for external commands
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum total time a caller blocks waiting for a named lock
    pub wait_timeout_secs: u64,
    /// A lock held longer than this is treated as abandoned
    pub max_hold_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Default language hint passed to the OCR engine
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache: CacheConfig {
                root: PathBuf::from("./cache"),
                hot_pages: 100,
            },
            gc: GcConfig {
                keep_icons: 1000,
                keep_pages: 1000,
                temp_ttl_secs: 86_400,
                probability: 100,
            },
            binaries: BinaryConfig {
                timeout_secs: 120,
                ..BinaryConfig::default()
            },
            queue: QueueConfig {
                wait_timeout_secs: 120,
                max_hold_secs: 300,
            },
            ocr: OcrConfig {
                language: "eng".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite:./folium.db".to_string(),
            },
        }
    }
}

/// Explicit overrides merged onto the defaults. Every field is optional;
/// a `None` keeps the default value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverrides {
    pub cache_root: Option<PathBuf>,
    pub hot_pages: Option<usize>,
    pub keep_icons: Option<usize>,
    pub keep_pages: Option<usize>,
    pub temp_ttl_secs: Option<u64>,
    pub gc_probability: Option<u32>,
    pub binaries: Option<BinaryConfig>,
    pub command_timeout_secs: Option<u64>,
    pub wait_timeout_secs: Option<u64>,
    pub max_hold_secs: Option<u64>,
    pub ocr_language: Option<String>,
    pub database_url: Option<String>,
}

/// Merge overrides onto the defaults. Pure: same inputs, same output.
pub fn merge_defaults(overrides: ConfigOverrides) -> Config {
    let mut config = Config::default();

    if let Some(root) = overrides.cache_root {
        config.cache.root = root;
    }
    if let Some(n) = overrides.hot_pages {
        config.cache.hot_pages = n;
    }
    if let Some(n) = overrides.keep_icons {
        config.gc.keep_icons = n;
    }
    if let Some(n) = overrides.keep_pages {
        config.gc.keep_pages = n;
    }
    if let Some(ttl) = overrides.temp_ttl_secs {
        config.gc.temp_ttl_secs = ttl;
    }
    if let Some(p) = overrides.gc_probability {
        config.gc.probability = p.max(1);
    }
    if let Some(binaries) = overrides.binaries {
        let timeout = if binaries.timeout_secs == 0 {
            config.binaries.timeout_secs
        } else {
            binaries.timeout_secs
        };
        config.binaries = BinaryConfig {
            timeout_secs: timeout,
            ..binaries
        };
    }
    if let Some(t) = overrides.command_timeout_secs {
        config.binaries.timeout_secs = t;
    }
    if let Some(t) = overrides.wait_timeout_secs {
        config.queue.wait_timeout_secs = t;
    }
    if let Some(t) = overrides.max_hold_secs {
        config.queue.max_hold_secs = t;
    }
    if let Some(lang) = overrides.ocr_language {
        config.ocr.language = lang;
    }
    if let Some(url) = overrides.database_url {
        config.database.url = url;
    }

    config
}

impl Config {
    /// Build overrides from environment variables and merge them onto the
    /// defaults. `.env` files are honored via dotenvy.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        merge_defaults(ConfigOverrides::from_env())
    }
}

impl ConfigOverrides {
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(key: &str) -> Option<T> {
            env::var(key).ok().and_then(|v| v.parse().ok())
        }

        let binaries = {
            let overrides = BinaryConfig {
                pdftotext: env::var("FOLIUM_PDFTOTEXT").ok().map(PathBuf::from),
                pdfinfo: env::var("FOLIUM_PDFINFO").ok().map(PathBuf::from),
                pdftohtml: env::var("FOLIUM_PDFTOHTML").ok().map(PathBuf::from),
                pdftoppm: env::var("FOLIUM_PDFTOPPM").ok().map(PathBuf::from),
                gs: env::var("FOLIUM_GS").ok().map(PathBuf::from),
                tesseract: env::var("FOLIUM_TESSERACT").ok().map(PathBuf::from),
                soffice: env::var("FOLIUM_SOFFICE").ok().map(PathBuf::from),
                timeout_secs: 0,
            };
            let any_set = overrides.pdftotext.is_some()
                || overrides.pdfinfo.is_some()
                || overrides.pdftohtml.is_some()
                || overrides.pdftoppm.is_some()
                || overrides.gs.is_some()
                || overrides.tesseract.is_some()
                || overrides.soffice.is_some();
            any_set.then_some(overrides)
        };

        ConfigOverrides {
            cache_root: env::var("FOLIUM_CACHE_ROOT").ok().map(PathBuf::from),
            hot_pages: parse("FOLIUM_HOT_PAGES"),
            keep_icons: parse("FOLIUM_GC_KEEP_ICONS"),
            keep_pages: parse("FOLIUM_GC_KEEP_PAGES"),
            temp_ttl_secs: parse("FOLIUM_GC_TEMP_TTL_SECS"),
            gc_probability: parse("FOLIUM_GC_PROBABILITY"),
            binaries,
            command_timeout_secs: parse("FOLIUM_COMMAND_TIMEOUT_SECS"),
            wait_timeout_secs: parse("FOLIUM_QUEUE_WAIT_SECS"),
            max_hold_secs: parse("FOLIUM_QUEUE_MAX_HOLD_SECS"),
            ocr_language: env::var("FOLIUM_OCR_LANGUAGE").ok(),
            database_url: env::var("DATABASE_URL").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gc.keep_pages, 1000);
        assert_eq!(config.gc.temp_ttl_secs, 86_400);
        assert_eq!(config.gc.probability, 100);
        assert_eq!(config.queue.max_hold_secs, 300);
    }

    #[test]
    fn test_merge_defaults_overrides_win() {
        let merged = merge_defaults(ConfigOverrides {
            keep_pages: Some(50),
            ocr_language: Some("deu".to_string()),
            ..ConfigOverrides::default()
        });
        assert_eq!(merged.gc.keep_pages, 50);
        assert_eq!(merged.ocr.language, "deu");
        // Untouched fields keep their defaults
        assert_eq!(merged.gc.keep_icons, 1000);
    }

    #[test]
    fn test_merge_defaults_is_pure() {
        let a = merge_defaults(ConfigOverrides::default());
        let b = merge_defaults(ConfigOverrides::default());
        assert_eq!(a.gc.keep_pages, b.gc.keep_pages);
        assert_eq!(a.database.url, b.database.url);
    }

    #[test]
    fn test_binary_overrides_preserve_timeout() {
        let merged = merge_defaults(ConfigOverrides {
            binaries: Some(BinaryConfig {
                pdftotext: Some(PathBuf::from("/opt/poppler/bin/pdftotext")),
                timeout_secs: 0,
                ..BinaryConfig::default()
            }),
            ..ConfigOverrides::default()
        });
        assert_eq!(merged.binaries.timeout_secs, 120);
        assert!(merged.binaries.pdftotext.is_some());
    }
}
