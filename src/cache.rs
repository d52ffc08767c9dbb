// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Raw-page cache — store and retrieve search-result HTML by fingerprint.
//!
//! Keys are the filesystem-safe fingerprints produced by
//! `SearchRequest::fingerprint`, so repeated searches skip the form
//! submission entirely. Entries expire after a TTL; concurrent processes
//! sharing the directory are not coordinated (last writer wins).

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default TTL for cached result pages. Register data changes daily at
/// most, so a day of staleness is acceptable.
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct CacheEntry {
    path: PathBuf,
    cached_at: SystemTime,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        SystemTime::now()
            .duration_since(self.cached_at)
            .map(|elapsed| elapsed > self.ttl)
            .unwrap_or(true)
    }
}

/// Fingerprint-keyed file store for raw result pages.
pub struct PageCache {
    cache_dir: PathBuf,
    index: HashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl PageCache {
    /// Create a page cache in the given directory, rebuilding the index
    /// from any `.html` files already present.
    pub fn new(cache_dir: PathBuf, default_ttl: Duration) -> Result<Self> {
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

        let mut index = HashMap::new();
        if let Ok(entries) = fs::read_dir(&cache_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("html") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    let cached_at = entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .unwrap_or_else(|_| SystemTime::now());
                    index.insert(
                        stem.to_string(),
                        CacheEntry {
                            path,
                            cached_at,
                            ttl: default_ttl,
                        },
                    );
                }
            }
        }

        tracing::debug!(
            "PageCache initialized: {} entries from {}",
            index.len(),
            cache_dir.display()
        );

        Ok(Self {
            cache_dir,
            index,
            default_ttl,
        })
    }

    /// Cache with default settings (`~/.handelsregister/pages/`, 24 h TTL).
    pub fn default_cache() -> Result<Self> {
        let cache_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".handelsregister")
            .join("pages");
        Self::new(cache_dir, DEFAULT_TTL)
    }

    /// Cached HTML for the fingerprint, if present and fresh.
    pub fn get(&self, fingerprint: &str) -> Option<String> {
        let entry = self.index.get(fingerprint)?;
        if entry.is_expired() {
            return None;
        }
        fs::read_to_string(&entry.path).ok()
    }

    /// Store raw HTML under the fingerprint.
    pub fn put(&mut self, fingerprint: &str, html: &str) -> Result<PathBuf> {
        let path = self.cache_dir.join(format!("{fingerprint}.html"));
        fs::write(&path, html)
            .with_context(|| format!("failed to write cache file: {}", path.display()))?;

        self.index.insert(
            fingerprint.to_string(),
            CacheEntry {
                path: path.clone(),
                cached_at: SystemTime::now(),
                ttl: self.default_ttl,
            },
        );
        Ok(path)
    }

    /// Remove a single entry.
    pub fn invalidate(&mut self, fingerprint: &str) {
        if let Some(entry) = self.index.remove(fingerprint) {
            let _ = fs::remove_file(&entry.path);
        }
    }

    /// Remove all entries.
    pub fn clear(&mut self) -> Result<usize> {
        let count = self.index.len();
        for (_, entry) in self.index.drain() {
            fs::remove_file(&entry.path)
                .with_context(|| format!("failed to remove {}", entry.path.display()))?;
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
