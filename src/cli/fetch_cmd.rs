// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! `handelsregister fetch <register-number>` — look up one company and
//! its document list.

use crate::cache::PageCache;
use crate::cli::output;
use crate::engine::Engine;
use crate::session::chromium::ChromiumDriver;
use anyhow::{bail, Result};

/// Run the fetch command.
pub async fn run(
    register_number: &str,
    name: Option<&str>,
    with_shareholder_list: bool,
    force: bool,
) -> Result<()> {
    // Register numbers are not unique across register courts, so content
    // retrieval insists on a name to disambiguate. Validated before any
    // network traffic.
    if with_shareholder_list && name.is_none() {
        bail!("--with-shareholder-list requires --name to disambiguate the company");
    }

    let cache = PageCache::default_cache()?;
    let driver = ChromiumDriver::launch().await?;
    let mut engine = Engine::new(driver, cache)?.force_refresh(force);
    let fetched = engine
        .get_company(register_number, name, with_shareholder_list)
        .await;
    if let Err(e) = engine.close().await {
        tracing::warn!("failed to close browser session: {e}");
    }

    let Some(company) = fetched? else {
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "found": false,
                "register_number": register_number,
            }));
        } else if !output::is_quiet() {
            eprintln!("  No company matched '{register_number}'.");
        }
        return Ok(());
    };

    if output::is_json() {
        // Document payloads are part of the record, base64-encoded.
        output::print_json(&company);
        return Ok(());
    }

    output::print_company(&company);
    for doc in &company.documents {
        if let Some(payload) = &doc.payload {
            let path = payload_filename(register_number);
            std::fs::write(&path, payload)?;
            if !output::is_quiet() {
                eprintln!("  Shareholder list saved to {path}");
            }
        }
    }
    Ok(())
}

fn payload_filename(register_number: &str) -> String {
    let slug: String = register_number
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("gesellschafterliste_{slug}.pdf")
}
