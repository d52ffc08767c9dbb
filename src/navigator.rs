// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Navigation of a company's lazily-expanded document tree.
//!
//! Opening the documents view is a full postback through the results
//! form; everything after that is the node-expansion protocol: post an
//! expansion request for a node id, receive a partial update carrying a
//! refreshed state token and a fragment of newly-revealed markup. Every
//! expansion must carry forward the latest token from the previous
//! response, and the flow always returns to the results view afterwards
//! so the next lookup can use the grid form again.

use crate::error::RegistryError;
use crate::extract::documents::{self, DocumentExtraction};
use crate::extract::partial;
use crate::model::DocumentRecord;
use crate::session::{PageKind, SessionDriver, SessionState};
use anyhow::Result;
use scraper::{Html, Selector};

const RESULTS_FORM: &str = "ergebnissForm";
const TREE_FORM: &str = "dk_form";
const TREE_ID: &str = "dk_form:dktree";
/// Row key of the tree root.
const ROOT_NODE: &str = "0_0";
/// Node-type marker of a folder (non-leaf) entry.
const FOLDER_NODE_TYPE: &str = "list";

/// A folder child discovered in an expansion fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FolderNode {
    row_key: String,
    label: String,
}

/// Fetch the document list behind a results-row document handle.
///
/// Degrades to an empty list on session expiry or expansion failure;
/// only driver-level breakage propagates as an error. The session is
/// returned to the results view in every case.
pub async fn fetch_documents(
    driver: &mut dyn SessionDriver,
    state: &mut SessionState,
    handle: &str,
) -> Result<Vec<DocumentRecord>> {
    let result = fetch_documents_inner(driver, state, handle).await;

    // Interactions leave the session on the documents view; return to the
    // results page so the next lookup can reach its form.
    if let Err(e) = driver.go_back().await {
        tracing::warn!("failed to return to results view: {e}");
    }
    state.page = PageKind::Results;

    result
}

async fn fetch_documents_inner(
    driver: &mut dyn SessionDriver,
    state: &mut SessionState,
    handle: &str,
) -> Result<Vec<DocumentRecord>> {
    // Full postback through the results form opens the documents view.
    driver
        .submit_form(
            RESULTS_FORM,
            &[
                ("javax.faces.source".to_string(), handle.to_string()),
                (handle.to_string(), handle.to_string()),
            ],
        )
        .await?;
    state.page = PageKind::DocumentTree;

    let html = driver.page_html().await?;
    // The documents view reissues the state token; expansions must carry
    // this one, not the results page's.
    state.refresh_token(partial::page_state_token(&html));

    let mut docs = match documents::extract_documents(&html, None) {
        DocumentExtraction::Expired => {
            tracing::warn!("session expired while opening the documents view");
            return Ok(Vec::new());
        }
        DocumentExtraction::Documents(docs) => docs,
    };

    // Nothing directly visible: the entries live behind collapsed tree
    // nodes and have to be revealed one folder at a time.
    if docs.is_empty() {
        match expand_tree(driver, state).await {
            Ok(expanded) => docs = expanded,
            Err(e) => tracing::warn!("document tree expansion abandoned: {e}"),
        }
    }

    Ok(documents::dedupe_and_sort(docs))
}

/// Expand the root node, then each folder child, collecting documents
/// from every revealed fragment.
async fn expand_tree(
    driver: &mut dyn SessionDriver,
    state: &mut SessionState,
) -> Result<Vec<DocumentRecord>> {
    let Some(fragment) = expand_node(driver, state, ROOT_NODE).await? else {
        return Ok(Vec::new());
    };

    let mut docs = Vec::new();
    for folder in folder_nodes(&fragment) {
        match expand_node(driver, state, &folder.row_key).await {
            Ok(Some(child_fragment)) => {
                match documents::extract_documents(&child_fragment, Some(&folder.label)) {
                    DocumentExtraction::Expired => {
                        tracing::warn!("session expired during tree expansion");
                        break;
                    }
                    DocumentExtraction::Documents(child_docs) => docs.extend(child_docs),
                }
            }
            Ok(None) => {}
            Err(e) => {
                // One unexpandable node loses that branch, not the lookup.
                tracing::warn!(row_key = %folder.row_key, "node expansion failed: {e}");
            }
        }
    }

    Ok(docs)
}

/// Request expansion of one node and adopt the refreshed state token.
async fn expand_node(
    driver: &mut dyn SessionDriver,
    state: &mut SessionState,
    node: &str,
) -> Result<Option<String>> {
    let mut fields: Vec<(String, String)> = vec![
        ("javax.faces.partial.ajax".to_string(), "true".to_string()),
        ("javax.faces.source".to_string(), TREE_ID.to_string()),
        ("javax.faces.partial.execute".to_string(), TREE_ID.to_string()),
        ("javax.faces.partial.render".to_string(), TREE_ID.to_string()),
        (format!("{TREE_FORM}:dktree_expandNode"), node.to_string()),
        (format!("{TREE_FORM}:dktree_scrollState"), "0,0".to_string()),
    ];
    if let Some(token) = &state.token {
        fields.push(("javax.faces.ViewState".to_string(), token.clone()));
    }

    let body = driver.post_partial(TREE_FORM, &fields).await?;

    if documents::is_session_expired(&body) {
        return Err(RegistryError::SessionExpired.into());
    }

    let update = partial::read_partial_response(&body)?;
    if update.state_token.is_none() && update.fragment.is_none() {
        // The server answered but revealed nothing; a stale token is the
        // usual cause.
        return Err(RegistryError::StaleStateToken(node.to_string()).into());
    }
    state.refresh_token(update.state_token);
    Ok(update.fragment)
}

/// Children of an expanded node whose type marker indicates a folder.
fn folder_nodes(fragment: &str) -> Vec<FolderNode> {
    let document = Html::parse_document(fragment);
    let sel = Selector::parse(&format!(r#"li[data-nodetype="{FOLDER_NODE_TYPE}"]"#)).unwrap();

    document
        .select(&sel)
        .filter_map(|li| {
            let row_key = li.value().attr("data-rowkey")?;
            Some(FolderNode {
                row_key: row_key.to_string(),
                label: li.text().collect::<String>().trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DownloadRef;
    use crate::session::testing::ScriptedDriver;

    fn envelope(token: &str, fragment: &str) -> String {
        format!(
            r#"<?xml version='1.0' encoding='UTF-8'?><partial-response><changes>
<update id="dk_form:dktree"><![CDATA[{fragment}]]></update>
<update id="j_id1:javax.faces.ViewState:0"><![CDATA[{token}]]></update>
</changes></partial-response>"#
        )
    }

    #[tokio::test]
    async fn test_documents_visible_without_expansion() {
        let mut driver = ScriptedDriver::with_pages(&[
            r#"<div><a href="/download/1.pdf">14.03.2022 Gesellschafterliste</a></div>"#,
        ]);
        let mut state = SessionState::new();

        let docs = fetch_documents(&mut driver, &mut state, "ergebnissForm:j_idt99")
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[0].download,
            Some(DownloadRef::Url("/download/1.pdf".to_string()))
        );
        // No expansion round-trips were needed.
        assert!(driver.partial_posts.is_empty());
        // The flow posted back through the results form and then returned.
        assert_eq!(driver.submitted[0].0, "ergebnissForm");
        assert_eq!(driver.back_count, 1);
        assert_eq!(state.page, PageKind::Results);
    }

    #[tokio::test]
    async fn test_expansion_threads_state_token() {
        let mut driver = ScriptedDriver::with_pages(&["<div>leer</div>"]);
        driver.partials = [
            envelope(
                "token-1",
                r#"<ul><li data-rowkey="0_0_0" data-nodetype="list">Liste der Gesellschafter</li>
                   <li data-rowkey="0_0_1" data-nodetype="document">direktes Blatt</li></ul>"#,
            ),
            envelope(
                "token-2",
                r##"<ul><li><a href="#node7">14.03.2022 Gesellschafterliste</a></li></ul>"##,
            ),
        ]
        .into_iter()
        .collect();
        let mut state = SessionState::new();
        state.token = Some("token-0".to_string());

        let docs = fetch_documents(&mut driver, &mut state, "ergebnissForm:j_idt99")
            .await
            .unwrap();

        // Root expansion plus one folder child; the leaf node is skipped.
        assert_eq!(driver.partial_posts.len(), 2);

        let token_of = |post: &(String, Vec<(String, String)>)| {
            post.1
                .iter()
                .find(|(k, _)| k == "javax.faces.ViewState")
                .map(|(_, v)| v.clone())
        };
        assert_eq!(token_of(&driver.partial_posts[0]).as_deref(), Some("token-0"));
        // The second call carries the token refreshed by the first reply.
        assert_eq!(token_of(&driver.partial_posts[1]).as_deref(), Some("token-1"));
        assert_eq!(state.token.as_deref(), Some("token-2"));

        let expand_node_of = |post: &(String, Vec<(String, String)>)| {
            post.1
                .iter()
                .find(|(k, _)| k == "dk_form:dktree_expandNode")
                .map(|(_, v)| v.clone())
        };
        assert_eq!(expand_node_of(&driver.partial_posts[0]).as_deref(), Some("0_0"));
        assert_eq!(expand_node_of(&driver.partial_posts[1]).as_deref(), Some("0_0_0"));

        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[0].category_label.as_deref(),
            Some("Liste der Gesellschafter")
        );
        assert_eq!(docs[0].category_code.as_deref(), Some("LISTE_DER_GESELLSCHAFTER"));
    }

    #[tokio::test]
    async fn test_documents_view_token_replaces_results_token() {
        // The documents view reissues the state token as a hidden input;
        // the first expansion must carry that value, not the one the
        // results page handed over.
        let mut driver = ScriptedDriver::with_pages(&[
            r#"<html><body><form id="dk_form">
            <input type="hidden" name="javax.faces.ViewState" value="T2" />
            </form></body></html>"#,
        ]);
        driver.partials = [envelope("T3", "<ul></ul>")].into_iter().collect();
        let mut state = SessionState::new();
        state.token = Some("T1".to_string());

        fetch_documents(&mut driver, &mut state, "h").await.unwrap();

        let posted_token = driver.partial_posts[0]
            .1
            .iter()
            .find(|(k, _)| k == "javax.faces.ViewState")
            .map(|(_, v)| v.clone());
        assert_eq!(posted_token.as_deref(), Some("T2"));
        assert_eq!(state.token.as_deref(), Some("T3"));
    }

    #[tokio::test]
    async fn test_session_expiry_on_documents_view() {
        let mut driver =
            ScriptedDriver::with_pages(&["<p>Ihre Sitzung ist abgelaufen. Session has expired.</p>"]);
        let mut state = SessionState::new();

        let docs = fetch_documents(&mut driver, &mut state, "h")
            .await
            .unwrap();
        assert!(docs.is_empty());
        assert!(driver.partial_posts.is_empty());
        assert_eq!(driver.back_count, 1);
    }

    #[tokio::test]
    async fn test_empty_expansion_reply_is_abandoned_not_fatal() {
        let mut driver = ScriptedDriver::with_pages(&["<div>leer</div>"]);
        driver.partials = ["<partial-response><changes></changes></partial-response>".to_string()]
            .into_iter()
            .collect();
        let mut state = SessionState::new();

        // Root expansion reveals neither token nor fragment (stale token);
        // the lookup degrades to no documents.
        let docs = fetch_documents(&mut driver, &mut state, "h").await.unwrap();
        assert!(docs.is_empty());
        assert_eq!(state.page, PageKind::Results);
    }

    #[test]
    fn test_folder_nodes_requires_type_and_rowkey() {
        let fragment = r#"<ul>
            <li data-rowkey="0_0_0" data-nodetype="list"> Dokumentart A </li>
            <li data-rowkey="0_0_1" data-nodetype="document">Blatt</li>
            <li data-nodetype="list">ohne rowkey</li>
        </ul>"#;
        let folders = folder_nodes(fragment);
        assert_eq!(
            folders,
            vec![FolderNode {
                row_key: "0_0_0".to_string(),
                label: "Dokumentart A".to_string(),
            }]
        );
    }
}
