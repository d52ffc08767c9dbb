// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Output helpers shared by the subcommands.
//!
//! The global `--json`, `--quiet` and `--verbose` flags are published as
//! environment variables by `main` so every module can check them without
//! threading a config value through.

use crate::model::{format_german_date, CompanyRecord};

pub fn is_json() -> bool {
    std::env::var("HANDELSREGISTER_JSON").is_ok()
}

pub fn is_quiet() -> bool {
    std::env::var("HANDELSREGISTER_QUIET").is_ok()
}

pub fn is_verbose() -> bool {
    std::env::var("HANDELSREGISTER_VERBOSE").is_ok()
}

pub fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}

/// Human-readable company printout.
pub fn print_company(company: &CompanyRecord) {
    println!("name: {}", company.name);
    println!("court: {}", company.court);
    if let Some(register) = &company.register_number {
        println!("register number: {register}");
    }
    if let Some(city) = &company.city {
        println!("city: {city}");
    }
    println!("state: {}", company.federal_state);
    println!("status: {}", company.status_label);

    if !company.history.is_empty() {
        println!("history:");
        for (i, entry) in company.history.iter().enumerate() {
            println!("  {}) {} ({})", i + 1, entry.name, entry.location);
        }
    }

    if !company.documents.is_empty() {
        println!("documents:");
        for doc in &company.documents {
            match &doc.category_label {
                Some(category) => println!(
                    "  {}  {}  [{category}]",
                    format_german_date(doc.date),
                    doc.display_name
                ),
                None => println!("  {}  {}", format_german_date(doc.date), doc.display_name),
            }
        }
    }
}
