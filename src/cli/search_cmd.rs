// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! `handelsregister search <keywords>` — keyword search of the registry.

use crate::cache::PageCache;
use crate::cli::output;
use crate::engine::Engine;
use crate::extract::results::extract_companies;
use crate::model::{CompanyRecord, KeywordMatch, SearchRequest};
use crate::session::chromium::ChromiumDriver;
use anyhow::Result;

/// Run the search command.
pub async fn run(keywords: &str, mode: KeywordMatch, force: bool) -> Result<()> {
    let request = SearchRequest::keywords(keywords, mode);
    let cache = PageCache::default_cache()?;

    // A fresh cache hit needs no browser at all.
    if !force {
        if let Some(html) = cache.get(&request.fingerprint()) {
            tracing::debug!("serving search from cache without a session");
            return print_results(&extract_companies(&html));
        }
    }

    let driver = ChromiumDriver::launch().await?;
    let mut engine = Engine::new(driver, cache)?.force_refresh(force);
    let searched = engine.search(&request).await;
    if let Err(e) = engine.close().await {
        tracing::warn!("failed to close browser session: {e}");
    }

    let companies = searched?;
    print_results(&companies)
}

fn print_results(companies: &[CompanyRecord]) -> Result<()> {
    if output::is_json() {
        output::print_json(&companies);
        return Ok(());
    }

    if companies.is_empty() {
        if !output::is_quiet() {
            eprintln!("  No matches.");
        }
        return Ok(());
    }

    for company in companies {
        output::print_company(company);
        println!();
    }
    Ok(())
}
