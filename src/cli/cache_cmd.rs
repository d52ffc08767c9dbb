// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! `handelsregister cache clear` — manage the results-page cache.

use crate::cache::PageCache;
use crate::cli::output;
use anyhow::Result;

/// Clear all cached results pages.
pub async fn run_clear() -> Result<()> {
    let mut cache = PageCache::default_cache()?;
    let dir = cache.cache_dir().to_path_buf();
    let removed = cache.clear()?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "cleared": removed,
            "cache_dir": dir.display().to_string(),
        }));
    } else if !output::is_quiet() {
        eprintln!("  Cleared {removed} cached pages from {}", dir.display());
    }
    Ok(())
}
