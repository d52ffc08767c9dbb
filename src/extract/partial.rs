// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reader for JSF partial-update payloads.
//!
//! Tree expansions come back as a `<partial-response>` XML envelope whose
//! `<update>` blocks carry the refreshed view-state token and the
//! newly-revealed tree markup, both wrapped in CDATA. The envelope is
//! decoded with a streaming XML reader; a regex pass covers envelopes the
//! portal occasionally emits with technically-invalid XML.

use crate::error::{RegistryError, RegistryResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::LazyLock;

/// Fragment identifier of the view-state update block.
const STATE_TOKEN_ID: &str = "javax.faces.ViewState";
/// Fragment identifier of the document-tree update block.
const TREE_FRAGMENT_ID: &str = "dktree";

/// Decoded contents of one partial-update payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialUpdate {
    /// Refreshed state token, required on the next follow-up request.
    pub state_token: Option<String>,
    /// HTML fragment of the updated tree region.
    pub fragment: Option<String>,
}

static VIEWSTATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<update id="[^"]*javax\.faces\.ViewState[^"]*"><!\[CDATA\[(.*?)\]\]></update>"#)
        .unwrap()
});

static TREE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<update id="[^"]*dktree[^"]*">(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?</update>"#)
        .unwrap()
});

/// Decode a partial-update payload into its state token and tree fragment.
///
/// Returns an error only when the input is not a partial response at all;
/// an envelope missing one of the blocks yields `None` in that slot so the
/// caller can decide whether the absence is fatal for its step.
pub fn read_partial_response(xml: &str) -> RegistryResult<PartialUpdate> {
    if !xml.contains("<partial-response") {
        return Err(RegistryError::PartialResponseParse(
            "payload is not a <partial-response> envelope".to_string(),
        ));
    }

    match read_with_xml_reader(xml) {
        Ok(update) if update.state_token.is_some() || update.fragment.is_some() => Ok(update),
        _ => {
            tracing::debug!("XML reader found no update blocks, trying regex fallback");
            Ok(read_with_regex(xml))
        }
    }
}

fn read_with_xml_reader(xml: &str) -> RegistryResult<PartialUpdate> {
    let mut reader = Reader::from_str(xml);
    let mut update = PartialUpdate::default();
    let mut current_id: Option<String> = None;
    let mut current_body = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"update" => {
                current_id = e
                    .try_get_attribute("id")
                    .map_err(|e| RegistryError::PartialResponseParse(e.to_string()))?
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                current_body.clear();
            }
            Ok(Event::CData(t)) => {
                current_body.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Ok(Event::Text(t)) => {
                if let Ok(text) = t.unescape() {
                    current_body.push_str(&text);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"update" => {
                if let Some(id) = current_id.take() {
                    if id.contains(STATE_TOKEN_ID) {
                        update.state_token = Some(current_body.clone());
                    } else if id.contains(TREE_FRAGMENT_ID) {
                        update.fragment = Some(current_body.clone());
                    }
                }
                current_body.clear();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(RegistryError::PartialResponseParse(e.to_string()));
            }
        }
    }

    Ok(update)
}

fn read_with_regex(xml: &str) -> PartialUpdate {
    PartialUpdate {
        state_token: VIEWSTATE_RE
            .captures(xml)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        fragment: TREE_RE
            .captures(xml)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
    }
}

/// State token carried as a hidden input on a full page.
///
/// Every full-page response reissues the token; follow-up requests must
/// use this value, not one harvested from an earlier view.
pub fn page_state_token(html: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let sel = scraper::Selector::parse(r#"input[name="javax.faces.ViewState"]"#).unwrap();
    document
        .select(&sel)
        .find_map(|input| input.value().attr("value").map(str::to_string))
}
