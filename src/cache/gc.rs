//! Cache garbage collection
//!
//! There is no persistent background-task runner in the serving model, so
//! collection cost is amortized probabilistically: `maybe_clean` runs the
//! sweep on roughly one in `probability` calls, and each sweep covers ONE
//! randomly chosen namespace (listing and stat-ing thousands of files three
//! times per request would be too expensive inline).
//!
//! A failed delete is never fatal to the serving request: every error here
//! is logged and skipped.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use rand::Rng;

use super::store::{FileCache, Namespace, SETTINGS_FILE};
use crate::config::GcConfig;

/// Sweeps the cache namespaces to their configured bounds.
#[derive(Debug, Clone)]
pub struct GarbageCollector {
    cache: FileCache,
    config: GcConfig,
}

impl GarbageCollector {
    pub fn new(cache: FileCache, config: GcConfig) -> Self {
        Self { cache, config }
    }

    /// Probabilistic inline trigger for the request path.
    pub fn maybe_clean(&self) {
        if rand::thread_rng().gen_range(0..self.config.probability.max(1)) == 0 {
            self.clean_garbage();
        }
    }

    /// Sweep one randomly chosen namespace. Returns the number of files
    /// deleted.
    pub fn clean_garbage(&self) -> usize {
        let namespace = Namespace::ALL[rand::thread_rng().gen_range(0..Namespace::ALL.len())];
        self.sweep(namespace)
    }

    /// Sweep a specific namespace to its bound.
    pub fn sweep(&self, namespace: Namespace) -> usize {
        let deleted = match namespace {
            Namespace::Icons => self.sweep_keep_recent(namespace, self.config.keep_icons),
            Namespace::Pages => self.sweep_keep_recent(namespace, self.config.keep_pages),
            Namespace::Temp => {
                self.sweep_ttl(namespace, Duration::from_secs(self.config.temp_ttl_secs))
            }
        };
        if deleted > 0 {
            tracing::debug!(namespace = namespace.dir_name(), deleted, "cache swept");
        }
        deleted
    }

    /// Delete every file in a namespace (reset points). The reserved
    /// settings file in temp is still spared.
    pub fn delete_all(&self, namespace: Namespace) -> usize {
        let mut deleted = 0;
        for (path, _) in list_files(&self.cache.dir(namespace)) {
            if namespace == Namespace::Temp && is_settings_file(&path) {
                continue;
            }
            if try_delete(&path) {
                deleted += 1;
            }
        }
        deleted
    }

    /// Keep the `keep` most-recently-modified files, delete the rest.
    fn sweep_keep_recent(&self, namespace: Namespace, keep: usize) -> usize {
        let mut files = list_files(&self.cache.dir(namespace));
        if files.len() <= keep {
            return 0;
        }
        // Most recent first; everything beyond the keep bound goes.
        files.sort_by(|a, b| b.1.cmp(&a.1));
        let mut deleted = 0;
        for (path, _) in files.into_iter().skip(keep) {
            if try_delete(&path) {
                deleted += 1;
            }
        }
        deleted
    }

    /// Delete files older than `ttl`, sparing the reserved settings file.
    fn sweep_ttl(&self, namespace: Namespace, ttl: Duration) -> usize {
        let now = SystemTime::now();
        let mut deleted = 0;
        for (path, mtime) in list_files(&self.cache.dir(namespace)) {
            if is_settings_file(&path) {
                continue;
            }
            let age = now.duration_since(mtime).unwrap_or(Duration::ZERO);
            if age > ttl && try_delete(&path) {
                deleted += 1;
            }
        }
        deleted
    }
}

fn is_settings_file(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()) == Some(SETTINGS_FILE)
}

/// List plain files with their mtimes; unreadable entries are skipped.
fn list_files(dir: &Path) -> Vec<(std::path::PathBuf, SystemTime)> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot list cache directory");
            return files;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, mtime));
    }
    files
}

fn try_delete(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete cache file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(config: GcConfig) -> (TempDir, FileCache, GarbageCollector) {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        let gc = GarbageCollector::new(cache.clone(), config);
        (dir, cache, gc)
    }

    fn gc_config() -> GcConfig {
        GcConfig {
            keep_icons: 5,
            keep_pages: 5,
            temp_ttl_secs: 0,
            probability: 100,
        }
    }

    #[test]
    fn test_keep_recent_bound() {
        let (_dir, cache, gc) = setup(gc_config());
        for i in 0..8 {
            cache
                .put(Namespace::Pages, &format!("item-{}-200.png", i), b"x")
                .unwrap();
            // Distinct mtimes so the recency ordering is well-defined
            std::thread::sleep(Duration::from_millis(15));
        }

        let deleted = gc.sweep(Namespace::Pages);
        assert_eq!(deleted, 3);

        // The survivors are the most recently written ones.
        for i in 3..8 {
            assert!(cache
                .get(Namespace::Pages, &format!("item-{}-200.png", i))
                .unwrap()
                .is_some());
        }
        for i in 0..3 {
            assert!(cache
                .get(Namespace::Pages, &format!("item-{}-200.png", i))
                .unwrap()
                .is_none());
        }
    }

    #[test]
    fn test_keep_recent_noop_under_bound() {
        let (_dir, cache, gc) = setup(gc_config());
        for i in 0..3 {
            cache
                .put(Namespace::Icons, &format!("{}.png", i), b"x")
                .unwrap();
        }
        assert_eq!(gc.sweep(Namespace::Icons), 0);
    }

    #[test]
    fn test_temp_ttl_spares_settings() {
        let (_dir, cache, gc) = setup(gc_config());
        cache.put(Namespace::Temp, "a.pdf", b"x").unwrap();
        cache.put(Namespace::Temp, SETTINGS_FILE, b"{}").unwrap();
        std::thread::sleep(Duration::from_millis(15));

        // ttl=0: everything with nonzero age is stale
        let deleted = gc.sweep(Namespace::Temp);
        assert_eq!(deleted, 1);
        assert!(cache.get(Namespace::Temp, "a.pdf").unwrap().is_none());
        assert!(cache.get(Namespace::Temp, SETTINGS_FILE).unwrap().is_some());
    }

    #[test]
    fn test_delete_all_spares_settings() {
        let (_dir, cache, gc) = setup(gc_config());
        cache.put(Namespace::Temp, "a.pdf", b"x").unwrap();
        cache.put(Namespace::Temp, "b.pdf", b"x").unwrap();
        cache.put(Namespace::Temp, SETTINGS_FILE, b"{}").unwrap();

        assert_eq!(gc.delete_all(Namespace::Temp), 2);
        assert!(cache.get(Namespace::Temp, SETTINGS_FILE).unwrap().is_some());
    }

    #[test]
    fn test_delete_all_pages() {
        let (_dir, cache, gc) = setup(gc_config());
        for i in 0..4 {
            cache
                .put(Namespace::Pages, &format!("{}.png", i), b"x")
                .unwrap();
        }
        assert_eq!(gc.delete_all(Namespace::Pages), 4);
    }

    #[test]
    fn test_clean_garbage_sweeps_one_namespace() {
        let (_dir, _cache, gc) = setup(gc_config());
        // Empty cache: whichever namespace is picked, nothing to delete and
        // nothing panics.
        assert_eq!(gc.clean_garbage(), 0);
    }
}
