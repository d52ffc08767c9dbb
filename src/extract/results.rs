// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extraction of company records from a full search-results page.
//!
//! The results grid is the one `<table role="grid">` on the page; data
//! rows carry a `data-ri` row index. Cells map positionally: court
//! string, name, federal state, status. The register number and city are
//! recovered from the court string, and the documents handle from a
//! marked indicator in the sixth cell. Rows that do not look like data
//! rows are skipped, never fatal.

use crate::model::{normalize_code, CompanyRecord, HistoryEntry, RegisterType};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// Cell offset where the (name, location) history groups begin.
const HISTORY_START: usize = 8;
/// Cells per history group.
const HISTORY_STRIDE: usize = 3;
/// Minimum cells for a usable data row (court..status).
const MIN_CELLS: usize = 5;

/// Register number inside a court string: a known type code, digits, and
/// an optional single-letter suffix. Word boundaries keep the match from
/// bleeding into a following word (e.g. "Formerly").
static REGISTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(HRA|HRB|GnR|VR|PR)\s*\d+\b(\s+[A-Z]\b)?").unwrap());

/// City between the court-type designator and the register-type token.
static CITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:District court|Amtsgericht)\s+(.*?)\s+(?:HRA|HRB|GnR|VR|PR)\b").unwrap()
});

/// Fallback: everything after the court-type designator.
static CITY_FALLBACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:District court|Amtsgericht)\s+(.*)").unwrap());

/// Mandatory register-number suffixes some states leave implicit.
const SUFFIX_TABLE: &[(&str, &[RegisterType], &str)] = &[
    ("Berlin", &[RegisterType::HRB], " B"),
    ("Bremen", &RegisterType::ALL, " HB"),
];

/// Parse a search-results page into company records.
///
/// A page without a grid or without data rows yields an empty list.
pub fn extract_companies(html: &str) -> Vec<CompanyRecord> {
    let document = Html::parse_document(html);
    let grid_sel = Selector::parse(r#"table[role="grid"]"#).unwrap();
    let row_sel = Selector::parse("tr").unwrap();

    let grid = match document.select(&grid_sel).next() {
        Some(g) => g,
        None => return Vec::new(),
    };

    let mut companies = Vec::new();
    for row in grid.select(&row_sel) {
        // Only rows with a row-index marker are data rows.
        if row.value().attr("data-ri").is_none() {
            continue;
        }
        if let Some(record) = parse_row(row) {
            companies.push(record);
        }
    }

    tracing::debug!("extracted {} companies from results grid", companies.len());
    companies
}

fn parse_row(row: ElementRef) -> Option<CompanyRecord> {
    let td_sel = Selector::parse("td").unwrap();
    let tds: Vec<ElementRef> = row.select(&td_sel).collect();
    let cells: Vec<String> = tds.iter().map(|td| cell_text(*td)).collect();

    if cells.len() < MIN_CELLS {
        tracing::debug!("skipping row with {} cells", cells.len());
        return None;
    }

    let court = cells[1].clone();
    let name = cells[2].clone();
    let federal_state = cells[3].clone();
    let status_label = cells[4].clone();

    let register_number = REGISTER_RE
        .find(&court)
        .map(|m| normalize_register_suffix(&federal_state, m.as_str()));

    let city = CITY_RE
        .captures(&court)
        .or_else(|| CITY_FALLBACK_RE.captures(&court))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    let document_handle = tds.get(5).and_then(|td| documents_handle(*td));

    let mut history = Vec::new();
    let mut i = HISTORY_START;
    while i + 1 < cells.len() {
        if cells[i].contains("Branches") || cells[i].contains("Niederlassungen") {
            break;
        }
        history.push(HistoryEntry {
            name: cells[i].clone(),
            location: cells[i + 1].clone(),
        });
        i += HISTORY_STRIDE;
    }

    Some(CompanyRecord {
        court,
        register_number,
        name,
        federal_state,
        city,
        status_code: normalize_code(&status_label),
        status_label,
        history,
        document_handle,
        documents: Vec::new(),
    })
}

/// Identifier of the documents link: an anchor in the designated cell
/// whose indicator span reads `DK`.
fn documents_handle(td: ElementRef) -> Option<String> {
    let a_sel = Selector::parse("a").unwrap();
    let span_sel = Selector::parse("span").unwrap();
    for anchor in td.select(&a_sel) {
        let has_dk = anchor
            .select(&span_sel)
            .any(|span| span.text().collect::<String>().contains("DK"));
        if has_dk {
            if let Some(id) = anchor.value().id() {
                return Some(id.to_string());
            }
        }
    }
    None
}

/// Append the state's mandatory register-number suffix when the portal
/// left it implicit. Applying the rule twice yields the same string as
/// applying it once.
pub fn normalize_register_suffix(state: &str, register: &str) -> String {
    let reg_type = register
        .split_whitespace()
        .next()
        .and_then(RegisterType::from_code);
    let Some(reg_type) = reg_type else {
        return register.to_string();
    };

    for (suffix_state, types, suffix) in SUFFIX_TABLE {
        if *suffix_state == state && types.contains(&reg_type) && !register.ends_with(suffix) {
            return format!("{register}{suffix}");
        }
    }
    register.to_string()
}

fn cell_text(td: ElementRef) -> String {
    td.text().collect::<String>().trim().to_string()
}
