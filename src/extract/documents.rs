// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extraction of document records from documents pages and tree fragments.
//!
//! The markup varies between a lazily-expanded tree view and a plain
//! table, so extraction runs an ordered fallback chain: a date-anchored
//! scan over text nodes first, then a grid-table pass when the scan finds
//! nothing. Both strategies are total — they return a (possibly empty)
//! list rather than failing on unexpected markup.

use crate::model::{normalize_code, parse_german_date, DocumentRecord, DownloadRef};
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Textual markers the portal uses for an expired session, either language.
pub const SESSION_EXPIRED_MARKERS: [&str; 2] = ["session has expired", "sitzung abgelaufen"];

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{2}\.\d{2}\.\d{4}").unwrap());

/// Outcome of a document-extraction pass.
#[derive(Debug, Clone)]
pub enum DocumentExtraction {
    /// The response carried a session-expiry marker; no documents can be
    /// trusted from it.
    Expired,
    /// Extracted records, deduplicated and sorted by date descending.
    Documents(Vec<DocumentRecord>),
}

impl DocumentExtraction {
    /// The extracted records, empty when the session had expired.
    pub fn into_documents(self) -> Vec<DocumentRecord> {
        match self {
            DocumentExtraction::Expired => Vec::new(),
            DocumentExtraction::Documents(docs) => docs,
        }
    }
}

/// Whether a response body carries one of the known expiry markers.
pub fn is_session_expired(html: &str) -> bool {
    let lower = html.to_lowercase();
    SESSION_EXPIRED_MARKERS.iter().any(|m| lower.contains(m))
}

/// Parse a documents page or tree fragment into document records.
///
/// `category` is the label of the enclosing tree branch, when the caller
/// expanded a specific folder node.
pub fn extract_documents(html: &str, category: Option<&str>) -> DocumentExtraction {
    if is_session_expired(html) {
        return DocumentExtraction::Expired;
    }

    let document = Html::parse_document(html);

    let mut docs = scan_dated_text_nodes(&document, category);
    if docs.is_empty() {
        docs = scan_grid_tables(&document, category);
    }

    DocumentExtraction::Documents(dedupe_and_sort(docs))
}

/// Primary strategy: every text node containing a date is a candidate
/// document label. The download reference comes from an enclosing anchor;
/// failing that, the enclosing tree node's position identifier is kept
/// for a later interaction.
fn scan_dated_text_nodes(document: &Html, category: Option<&str>) -> Vec<DocumentRecord> {
    let mut docs = Vec::new();

    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let Some(m) = DATE_RE.find(text) else {
            continue;
        };
        let Some(date) = parse_german_date(m.as_str()) else {
            continue;
        };

        let mut download = None;
        let mut row_key = None;

        for ancestor in node.ancestors() {
            let Some(el) = ancestor.value().as_element() else {
                continue;
            };
            if el.name() == "a" {
                download = anchor_reference(el);
                if download.is_some() {
                    break;
                }
            }
        }
        if download.is_none() {
            for ancestor in node.ancestors() {
                let Some(el) = ancestor.value().as_element() else {
                    continue;
                };
                if let Some(key) = el.attr("data-rowkey") {
                    row_key = Some(key.to_string());
                    break;
                }
            }
        }

        let display_name = text.trim().to_string();
        let id = download
            .as_ref()
            .map(|d: &DownloadRef| d.as_str().to_string())
            .unwrap_or_else(|| display_name.clone());

        docs.push(DocumentRecord {
            id,
            display_name,
            date,
            category_label: category.map(str::to_string),
            category_code: category.map(normalize_code),
            download,
            row_key,
            payload: None,
        });
    }

    docs
}

/// An anchor's download reference. A placeholder href (`#` or a bare
/// fragment) signals that an additional click is required rather than a
/// direct download, so the element identifier (or the fragment itself)
/// becomes an interaction token.
fn anchor_reference(el: &scraper::node::Element) -> Option<DownloadRef> {
    let href = el.attr("href")?;
    if let Some(fragment) = href.strip_prefix('#') {
        let token = el.id().map(str::to_string).or_else(|| {
            (!fragment.is_empty()).then(|| fragment.to_string())
        })?;
        Some(DownloadRef::Interaction(token))
    } else {
        Some(DownloadRef::Url(href.to_string()))
    }
}

/// Fallback strategy: tabular documents views. Rows need at least three
/// cells, one dated cell, and one linked cell; anything else is skipped.
fn scan_grid_tables(document: &Html, category: Option<&str>) -> Vec<DocumentRecord> {
    let table_sel = Selector::parse(r#"table[role="grid"]"#).unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();
    let link_sel = Selector::parse("a[href]").unwrap();

    let mut docs = Vec::new();
    for table in document.select(&table_sel) {
        for row in table.select(&row_sel) {
            let cells: Vec<_> = row.select(&cell_sel).collect();
            if cells.len() < 3 {
                continue;
            }

            let mut date: Option<(NaiveDate, String)> = None;
            for cell in &cells {
                let text = cell.text().collect::<String>();
                if let Some(m) = DATE_RE.find(&text) {
                    if let Some(parsed) = parse_german_date(m.as_str()) {
                        date = Some((parsed, m.as_str().to_string()));
                        break;
                    }
                }
            }
            let Some((date, date_str)) = date else {
                continue;
            };

            let href = cells
                .iter()
                .flat_map(|cell| cell.select(&link_sel))
                .find_map(|a| a.value().attr("href").map(str::to_string));
            let Some(href) = href else {
                continue;
            };

            docs.push(DocumentRecord {
                id: href.clone(),
                display_name: date_str,
                date,
                category_label: category.map(str::to_string),
                category_code: category.map(normalize_code),
                download: Some(DownloadRef::Url(href)),
                row_key: None,
                payload: None,
            });
        }
    }
    docs
}

/// Deduplicate by `(date, id)` — later entries overwrite earlier ones —
/// and sort by date descending. Ties carry no required order.
pub fn dedupe_and_sort(docs: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    let mut unique: HashMap<(NaiveDate, String), DocumentRecord> = HashMap::new();
    for doc in docs {
        unique.insert((doc.date, doc.id.clone()), doc);
    }
    let mut out: Vec<DocumentRecord> = unique.into_values().collect();
    out.sort_by(|a, b| b.date.cmp(&a.date));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn doc(id: &str, date_: NaiveDate, name: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            display_name: name.to_string(),
            date: date_,
            category_label: None,
            category_code: None,
            download: None,
            row_key: None,
            payload: None,
        }
    }

    #[test]
    fn test_anchor_with_fragment_reference() {
        let html = r##"<ul><li><a href="#node42"><span>14.03.2022 Gesellschafterliste</span></a></li></ul>"##;
        let docs = extract_documents(html, None).into_documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].date, date(2022, 3, 14));
        assert!(docs[0].display_name.contains("Gesellschafterliste"));
        assert_eq!(
            docs[0].download,
            Some(DownloadRef::Interaction("node42".to_string()))
        );
        assert_eq!(docs[0].id, "node42");
    }

    #[test]
    fn test_placeholder_href_uses_element_id() {
        let html = r##"<a id="dk_form:j_idt99" href="#">02.11.2021 Satzung</a>"##;
        let docs = extract_documents(html, None).into_documents();
        assert_eq!(
            docs[0].download,
            Some(DownloadRef::Interaction("dk_form:j_idt99".to_string()))
        );
    }

    #[test]
    fn test_direct_href_is_kept() {
        let html = r#"<a href="/rp_web/download/doc123.pdf">05.06.2020 Jahresabschluss</a>"#;
        let docs = extract_documents(html, None).into_documents();
        assert_eq!(
            docs[0].download,
            Some(DownloadRef::Url("/rp_web/download/doc123.pdf".to_string()))
        );
    }

    #[test]
    fn test_row_key_without_link() {
        let html = r#"<li data-rowkey="0_0_2"><span>21.08.2019 Protokoll</span></li>"#;
        let docs = extract_documents(html, None).into_documents();
        assert_eq!(docs[0].download, None);
        assert_eq!(docs[0].row_key.as_deref(), Some("0_0_2"));
        // Synthetic fallback id = node label.
        assert_eq!(docs[0].id, "21.08.2019 Protokoll");
    }

    #[test]
    fn test_category_is_attached_and_normalized() {
        let html = r##"<a href="#n1">14.03.2022 Liste</a>"##;
        let docs = extract_documents(html, Some("Liste der Gesellschafter")).into_documents();
        assert_eq!(docs[0].category_label.as_deref(), Some("Liste der Gesellschafter"));
        assert_eq!(docs[0].category_code.as_deref(), Some("LISTE_DER_GESELLSCHAFTER"));
    }

    #[test]
    fn test_tabular_fallback() {
        // Dates split across inline elements defeat the per-text-node scan;
        // the grid pass works on concatenated cell text instead.
        let html = r#"<table role="grid">
            <tr><td>Dokument</td><td><span>14.03.</span><span>2022</span></td><td><a href="/doc/1.pdf">PDF</a></td></tr>
            <tr><td>ohne Link</td><td><span>01.01.</span><span>2021</span></td><td>nichts</td></tr>
            <tr><td>zu kurz</td></tr>
        </table>"#;
        let docs = extract_documents(html, None).into_documents();
        // Only the row with both a date and a link survives.
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].download, Some(DownloadRef::Url("/doc/1.pdf".to_string())));
        assert_eq!(docs[0].display_name, "14.03.2022");
    }

    #[test]
    fn test_session_expired_short_circuits() {
        let html = r#"<div><a href="/doc/1.pdf">14.03.2022</a>
            <p>Ihre Sitzung abgelaufen ist.</p></div>"#;
        assert!(matches!(
            extract_documents(html, None),
            DocumentExtraction::Expired
        ));
        assert!(extract_documents(html, None).into_documents().is_empty());

        assert!(is_session_expired("Your session has EXPIRED."));
        assert!(!is_session_expired("<html>alles gut</html>"));
    }

    #[test]
    fn test_dedupe_later_entry_wins() {
        let d = date(2022, 3, 14);
        let docs = dedupe_and_sort(vec![
            doc("node1", d, "first version"),
            doc("node1", d, "second version"),
        ]);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].display_name, "second version");
    }

    #[test]
    fn test_sorted_date_descending() {
        let docs = dedupe_and_sort(vec![
            doc("a", date(2020, 1, 1), "alt"),
            doc("b", date(2023, 6, 30), "neu"),
            doc("c", date(2021, 12, 24), "mittel"),
        ]);
        let dates: Vec<NaiveDate> = docs.iter().map(|d| d.date).collect();
        assert_eq!(
            dates,
            vec![date(2023, 6, 30), date(2021, 12, 24), date(2020, 1, 1)]
        );
    }

    #[test]
    fn test_invalid_calendar_date_is_skipped() {
        let html = r##"<a href="#n1">31.02.2022 kaputt</a>"##;
        assert!(extract_documents(html, None).into_documents().is_empty());
    }
}
