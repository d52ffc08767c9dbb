// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Retrieval of document content behind a download reference.
//!
//! Direct URLs are fetched over plain HTTP. Interaction tokens and row
//! keys need the browser session: a node-selection interaction reveals a
//! download control, the originating page is reloaded to re-synchronize
//! state, and the control's target is read from within the session.
//! Payloads wrapped in an archive are unwrapped to their first
//! document-type entry. Every failure degrades to absence with a
//! diagnostic reason; retrieval is attempted at most once per document.

use crate::error::RegistryError;
use crate::model::{DocumentRecord, DownloadRef};
use crate::session::{SessionDriver, SessionState};
use regex::Regex;
use std::io::Read;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const PDF_MAGIC: &[u8] = b"%PDF";

/// Entry extensions accepted as document content inside an archive.
const DOCUMENT_EXTENSIONS: [&str; 4] = [".pdf", ".tif", ".tiff", ".xml"];

/// Placeholder markers for script-dependent content, either language.
const PLEASE_WAIT_MARKERS: [&str; 2] = ["bitte warten", "please wait"];

const TREE_FORM: &str = "dk_form";
const TREE_ID: &str = "dk_form:dktree";

/// Navigation budget for the interactive path.
const NAV_TIMEOUT_MS: u64 = 10_000;
/// Wait budget for the download control to appear.
const CONTROL_TIMEOUT_MS: u64 = 5_000;
const CONTROL_SELECTOR: &str = r#"a[id*="download"], a[href*="download"], button[id*="download"]"#;

static DOWNLOAD_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]*download[^"]*)""#).unwrap());

/// Resolves document references to binary content.
pub struct ArtifactRetriever {
    http: reqwest::Client,
    base_url: Url,
}

impl ArtifactRetriever {
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .build()?;
        let base_url = Url::parse(base_url)
            .map_err(|e| RegistryError::ArtifactUnavailable(format!("bad base URL: {e}")))?;
        Ok(Self { http, base_url })
    }

    /// Resolve a document reference to bytes.
    ///
    /// `None` means the content is not retrievable (with the reason
    /// logged), never a hard failure for the caller.
    pub async fn fetch(
        &self,
        driver: &mut dyn SessionDriver,
        state: &mut SessionState,
        doc: &DocumentRecord,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let outcome = match (&doc.download, &doc.row_key) {
            (Some(DownloadRef::Url(href)), _) => match self.resolve(href) {
                Some(url) => self.fetch_direct(&url).await,
                None => Err(RegistryError::ArtifactUnavailable(format!(
                    "unresolvable reference: {href}"
                ))),
            },
            (Some(DownloadRef::Interaction(token)), _) => {
                self.fetch_via_click(driver, token).await
            }
            (None, Some(row_key)) => self.fetch_via_node_selection(driver, state, row_key).await,
            (None, None) => Err(RegistryError::ArtifactUnavailable(
                "document carries no reference".to_string(),
            )),
        };

        match outcome {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) => {
                tracing::warn!(document = %doc.display_name, "artifact not retrieved: {e}");
                Ok(None)
            }
        }
    }

    /// Plain HTTP retrieval of a well-formed URL.
    pub async fn fetch_direct(&self, url: &Url) -> Result<Vec<u8>, RegistryError> {
        let resp = self.http.get(url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(RegistryError::ArtifactUnavailable(format!(
                "HTTP {} for {url}",
                resp.status().as_u16()
            )));
        }
        let bytes = resp.bytes().await?.to_vec();
        finalize_payload(bytes)
    }

    /// Interaction-token path: click the node's element, wait for a
    /// download control, re-synchronize, and read the control's target.
    async fn fetch_via_click(
        &self,
        driver: &mut dyn SessionDriver,
        token: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        if !driver
            .click(token)
            .await
            .map_err(|e| RegistryError::Driver(e.to_string()))?
        {
            return Err(RegistryError::ArtifactUnavailable(format!(
                "interaction element '{token}' not found"
            )));
        }

        let appeared = driver
            .wait_for_selector(CONTROL_SELECTOR, CONTROL_TIMEOUT_MS)
            .await
            .map_err(|e| RegistryError::Driver(e.to_string()))?;
        if !appeared {
            return Err(RegistryError::ArtifactUnavailable(
                "no download control appeared after selection".to_string(),
            ));
        }

        let html = driver
            .page_html()
            .await
            .map_err(|e| RegistryError::Driver(e.to_string()))?;
        let href = download_control_href(&html).ok_or_else(|| {
            RegistryError::ArtifactUnavailable("download control exposes no target".to_string())
        })?;

        // Reload the originating page so the follow-up request starts
        // from synchronized state.
        let origin = driver
            .current_url()
            .await
            .map_err(|e| RegistryError::Driver(e.to_string()))?;
        driver
            .navigate(&origin, NAV_TIMEOUT_MS)
            .await
            .map_err(|e| RegistryError::Driver(e.to_string()))?;

        self.read_in_session(driver, &href).await
    }

    /// Row-key path: select the tree node through the expansion form,
    /// then look for a download control in the reply.
    async fn fetch_via_node_selection(
        &self,
        driver: &mut dyn SessionDriver,
        state: &mut SessionState,
        row_key: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        let mut fields: Vec<(String, String)> = vec![
            ("javax.faces.partial.ajax".to_string(), "true".to_string()),
            ("javax.faces.source".to_string(), TREE_ID.to_string()),
            ("javax.faces.partial.execute".to_string(), TREE_ID.to_string()),
            (
                format!("{TREE_FORM}:dktree_instantSelection"),
                row_key.to_string(),
            ),
        ];
        if let Some(token) = &state.token {
            fields.push(("javax.faces.ViewState".to_string(), token.clone()));
        }

        let body = driver
            .post_partial(TREE_FORM, &fields)
            .await
            .map_err(|e| RegistryError::Driver(e.to_string()))?;

        if let Ok(update) = crate::extract::partial::read_partial_response(&body) {
            state.refresh_token(update.state_token);
        }

        let href = download_control_href(&body).ok_or_else(|| {
            RegistryError::ArtifactUnavailable(format!(
                "node {row_key} selection revealed no download control"
            ))
        })?;
        self.read_in_session(driver, &href).await
    }

    /// Read a target URL from within the browser session (cookies apply)
    /// and classify/unwrap the payload.
    async fn read_in_session(
        &self,
        driver: &mut dyn SessionDriver,
        href: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        let url = self.resolve(href).ok_or_else(|| {
            RegistryError::ArtifactUnavailable(format!("unresolvable control target: {href}"))
        })?;
        let bytes = driver
            .fetch_binary(url.as_str())
            .await
            .map_err(|e| RegistryError::Driver(e.to_string()))?;
        finalize_payload(bytes)
    }

    fn resolve(&self, href: &str) -> Option<Url> {
        let url = self.base_url.join(href).ok()?;
        matches!(url.scheme(), "http" | "https").then_some(url)
    }
}

/// Classify retrieved bytes: unwrap archives, reject script-dependent
/// placeholders, pass document content through.
fn finalize_payload(bytes: Vec<u8>) -> Result<Vec<u8>, RegistryError> {
    if bytes.starts_with(ZIP_MAGIC) {
        return unwrap_archive(&bytes);
    }
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(bytes);
    }

    // Textual payloads are either an error page or a "please wait"
    // placeholder; neither is document content.
    if looks_textual(&bytes) {
        let text = String::from_utf8_lossy(&bytes).to_lowercase();
        if PLEASE_WAIT_MARKERS.iter().any(|m| text.contains(m)) {
            return Err(RegistryError::ArtifactUnavailable(
                "script-dependent placeholder instead of content".to_string(),
            ));
        }
        if text.contains("<html") {
            return Err(RegistryError::ArtifactUnavailable(
                "HTML page instead of binary content".to_string(),
            ));
        }
    }

    if bytes.is_empty() {
        return Err(RegistryError::ArtifactUnavailable("empty payload".to_string()));
    }
    Ok(bytes)
}

/// First document-type entry of an archive payload.
fn unwrap_archive(bytes: &[u8]) -> Result<Vec<u8>, RegistryError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| RegistryError::ArchiveExtraction(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| RegistryError::ArchiveExtraction(e.to_string()))?;
        let name = entry.name().to_lowercase();
        if DOCUMENT_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut buf)
                .map_err(|e| RegistryError::ArchiveExtraction(e.to_string()))?;
            return Ok(buf);
        }
    }

    Err(RegistryError::ArchiveExtraction(
        "no document-type entry in archive".to_string(),
    ))
}

/// Target of the download control in a page or partial reply.
fn download_control_href(html: &str) -> Option<String> {
    DOWNLOAD_HREF_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn looks_textual(bytes: &[u8]) -> bool {
    // Control bytes other than whitespace mark binary content.
    !bytes
        .iter()
        .take(512)
        .any(|b| *b < 0x09 || (*b > 0x0d && *b < 0x20))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::ScriptedDriver;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn doc(download: Option<DownloadRef>, row_key: Option<&str>) -> DocumentRecord {
        DocumentRecord {
            id: "d".to_string(),
            display_name: "14.03.2022 Gesellschafterliste".to_string(),
            date: NaiveDate::from_ymd_opt(2022, 3, 14).unwrap(),
            category_label: None,
            category_code: None,
            download,
            row_key: row_key.map(str::to_string),
            payload: None,
        }
    }

    fn zipped(name: &str, content: &[u8]) -> Vec<u8> {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file(name, options).unwrap();
        writer.write_all(content).unwrap();
        writer.finish().unwrap();
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_direct_pdf_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc/1.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.7 inhalt".to_vec()),
            )
            .mount(&server)
            .await;

        let retriever = ArtifactRetriever::new(&server.uri()).unwrap();
        let mut driver = ScriptedDriver::new();
        let mut state = SessionState::new();
        let record = doc(Some(DownloadRef::Url("/doc/1.pdf".to_string())), None);

        let bytes = retriever
            .fetch(&mut driver, &mut state, &record)
            .await
            .unwrap()
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_archive_payload_is_unwrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc/2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/zip")
                    .set_body_bytes(zipped("gesellschafterliste.pdf", b"%PDF-1.4 innen")),
            )
            .mount(&server)
            .await;

        let retriever = ArtifactRetriever::new(&server.uri()).unwrap();
        let mut driver = ScriptedDriver::new();
        let mut state = SessionState::new();
        let record = doc(Some(DownloadRef::Url("/doc/2".to_string())), None);

        let bytes = retriever
            .fetch(&mut driver, &mut state, &record)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4 innen");
    }

    #[tokio::test]
    async fn test_archive_without_document_entry_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc/3"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(zipped("readme.txt", b"kein dokument")),
            )
            .mount(&server)
            .await;

        let retriever = ArtifactRetriever::new(&server.uri()).unwrap();
        let mut driver = ScriptedDriver::new();
        let mut state = SessionState::new();
        let record = doc(Some(DownloadRef::Url("/doc/3".to_string())), None);

        let result = retriever.fetch(&mut driver, &mut state, &record).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_please_wait_placeholder_is_soft_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc/4"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body>Bitte warten Sie, das Dokument wird erzeugt.</body></html>",
            ))
            .mount(&server)
            .await;

        let retriever = ArtifactRetriever::new(&server.uri()).unwrap();
        let mut driver = ScriptedDriver::new();
        let mut state = SessionState::new();
        let record = doc(Some(DownloadRef::Url("/doc/4".to_string())), None);

        let result = retriever.fetch(&mut driver, &mut state, &record).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_interaction_token_path() {
        let retriever = ArtifactRetriever::new("https://www.handelsregister.de").unwrap();
        let mut driver = ScriptedDriver::new();
        driver.pages = [r#"<a id="dk_form:download" href="/rp_web/download/55">Download</a>"#
            .to_string()]
        .into_iter()
        .collect();
        driver.binaries = [b"%PDF-1.5 via browser".to_vec()].into_iter().collect();
        let mut state = SessionState::new();
        let record = doc(Some(DownloadRef::Interaction("dk_form:j_idt77".to_string())), None);

        let bytes = retriever
            .fetch(&mut driver, &mut state, &record)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.5 via browser");
        assert_eq!(driver.clicked, vec!["dk_form:j_idt77".to_string()]);
        // The originating page was reloaded before reading the payload.
        assert_eq!(driver.navigations.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_reference_is_absent() {
        let retriever = ArtifactRetriever::new("https://www.handelsregister.de").unwrap();
        let mut driver = ScriptedDriver::new();
        let mut state = SessionState::new();
        let record = doc(None, None);

        let result = retriever.fetch(&mut driver, &mut state, &record).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_download_control_href() {
        let html = r#"<a id="x" href="/rp_web/download/99">Download</a>"#;
        assert_eq!(
            download_control_href(html).as_deref(),
            Some("/rp_web/download/99")
        );
        assert!(download_control_href("<a href=\"/other\">x</a>").is_none());
    }
}
