// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Record types shared across the engine.
//!
//! Everything the extractors produce is plain serde-serializable data:
//! company rows from the results grid, document entries from the filing
//! tree, and the search request that drives a lookup. Register numbers,
//! `dd.mm.yyyy` dates, and upper-snake status codes each get a small
//! normalization helper here so every module agrees on the rules.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Register types issued by the German register courts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterType {
    /// Commercial register, section A (partnerships).
    HRA,
    /// Commercial register, section B (corporations).
    HRB,
    /// Cooperative register.
    GnR,
    /// Register of associations.
    VR,
    /// Partnership register.
    PR,
}

impl RegisterType {
    /// All known type codes, longest-prefix-safe order.
    pub const ALL: [RegisterType; 5] = [
        RegisterType::HRA,
        RegisterType::HRB,
        RegisterType::GnR,
        RegisterType::VR,
        RegisterType::PR,
    ];

    /// The code as it appears in court strings and form fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterType::HRA => "HRA",
            RegisterType::HRB => "HRB",
            RegisterType::GnR => "GnR",
            RegisterType::VR => "VR",
            RegisterType::PR => "PR",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == code)
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword match modes of the extended search form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KeywordMatch {
    /// Results contain all keywords.
    All,
    /// Results contain at least one keyword.
    Min,
    /// Results contain the exact company name.
    Exact,
}

impl KeywordMatch {
    /// Option value the search form expects.
    pub fn form_value(&self) -> &'static str {
        match self {
            KeywordMatch::All => "1",
            KeywordMatch::Min => "2",
            KeywordMatch::Exact => "3",
        }
    }
}

/// A search query in either keyword or register-number mode.
///
/// When `register_number` parses into a known `(type, number)` pair it
/// takes precedence over `keywords`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keywords: Option<String>,
    pub match_mode: KeywordMatch,
    pub register_number: Option<String>,
}

impl SearchRequest {
    pub fn keywords(keywords: &str, match_mode: KeywordMatch) -> Self {
        Self {
            keywords: Some(keywords.to_string()),
            match_mode,
            register_number: None,
        }
    }

    pub fn register_number(register_number: &str) -> Self {
        Self {
            // Free-text fallback in case the number does not parse into
            // dedicated form fields.
            keywords: Some(register_number.to_string()),
            match_mode: KeywordMatch::All,
            register_number: Some(register_number.to_string()),
        }
    }

    /// Filesystem-safe cache key for this query.
    ///
    /// Lowercased, non-alphanumeric runs collapsed to single underscores,
    /// prefixed with the match mode so `all` and `exact` searches for the
    /// same words never collide.
    pub fn fingerprint(&self) -> String {
        let effective = self
            .register_number
            .as_deref()
            .or(self.keywords.as_deref())
            .unwrap_or_default();
        let mut out = String::with_capacity(effective.len() + 8);
        out.push_str(match self.match_mode {
            KeywordMatch::All => "all-",
            KeywordMatch::Min => "min-",
            KeywordMatch::Exact => "exact-",
        });
        let mut last_underscore = false;
        for ch in effective.to_lowercase().chars() {
            if ch.is_ascii_alphanumeric() {
                out.push(ch);
                last_underscore = false;
            } else if !last_underscore {
                out.push('_');
                last_underscore = true;
            }
        }
        out.trim_end_matches('_').to_string()
    }
}

static REGISTER_QUERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(HRA|HRB|GnR|VR|PR)\s*(\d+)").unwrap());

/// Split a register-number query like `"HRB 44343 B"` into its type code
/// and numeric part. Trailing suffix letters are ignored here; they only
/// matter when comparing against returned records.
pub fn parse_register_number(input: &str) -> Option<(RegisterType, String)> {
    let caps = REGISTER_QUERY_RE.captures(input)?;
    let reg_type = RegisterType::from_code(caps.get(1)?.as_str())?;
    Some((reg_type, caps.get(2)?.as_str().to_string()))
}

/// One former (name, location) pair from a company's history block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub name: String,
    pub location: String,
}

/// How a document's content can be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum DownloadRef {
    /// A direct URL.
    Url(String),
    /// An element identifier that must be clicked to reach the content.
    Interaction(String),
}

impl DownloadRef {
    pub fn as_str(&self) -> &str {
        match self {
            DownloadRef::Url(s) | DownloadRef::Interaction(s) => s,
        }
    }
}

/// A single filed document discovered in the document tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Download reference, or the node label when no reference exists.
    pub id: String,
    /// Label as presented in the tree.
    pub display_name: String,
    /// Filing date.
    pub date: NaiveDate,
    /// Label of the enclosing tree branch, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_label: Option<String>,
    /// Upper-snake form of `category_label`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadRef>,
    /// Tree-position identifier, recorded when no download reference exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_key: Option<String>,
    /// Retrieved bytes, base64 in serialized form.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_base64",
        skip_deserializing,
        default
    )]
    pub payload: Option<Vec<u8>>,
}

fn serialize_base64<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    use base64::Engine;
    match v {
        Some(bytes) => s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
        None => s.serialize_none(),
    }
}

/// One row of the search-results grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Raw court string, e.g. `"Berlin   Amtsgericht Berlin (Charlottenburg) HRB 138434 B"`.
    pub court: String,
    /// Normalized register number including any mandatory jurisdiction suffix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_number: Option<String>,
    pub name: String,
    pub federal_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Status exactly as presented.
    pub status_label: String,
    /// Upper-snake form of `status_label`.
    pub status_code: String,
    /// Former names and seats, insertion order = chronological as presented.
    pub history: Vec<HistoryEntry>,
    /// Server-side identifier of the documents link; absent when the row
    /// exposes no documents.
    #[serde(skip_serializing)]
    pub document_handle: Option<String>,
    /// Filled in after a later document fetch.
    pub documents: Vec<DocumentRecord>,
}

/// Upper-snake normalization used for status and category codes:
/// separators become underscores, runs of underscores merge, the result
/// is uppercased and trimmed of leading/trailing underscores.
pub fn normalize_code(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_underscore = true;
    for ch in label.chars() {
        if ch.is_alphanumeric() {
            for up in ch.to_uppercase() {
                out.push(up);
            }
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

static FULL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{4}$").unwrap());

/// Parse a `dd.mm.yyyy` date as used throughout the portal.
///
/// The shape is checked first; chrono alone would also accept abbreviated
/// forms like `14.3.22`.
pub fn parse_german_date(s: &str) -> Option<NaiveDate> {
    if !FULL_DATE_RE.is_match(s) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%d.%m.%Y").ok()
}

/// Render a date back to its `dd.mm.yyyy` presentation form.
pub fn format_german_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}
