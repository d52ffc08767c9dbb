// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Search orchestration against the registry portal.
//!
//! A lookup is a fixed page sequence: landing page, extended search form,
//! results grid. The engine drives that sequence through a
//! [`SessionDriver`], keeps the per-lookup [`SessionState`] current, and
//! serves repeat searches from the page cache. Company lookups continue
//! into the document tree and, on request, pull the shareholder-list
//! payload through the artifact retriever.

use crate::artifact::ArtifactRetriever;
use crate::cache::PageCache;
use crate::error::RegistryError;
use crate::extract::documents::is_session_expired;
use crate::extract::partial::page_state_token;
use crate::extract::results::extract_companies;
use crate::matcher::match_company;
use crate::model::{parse_register_number, CompanyRecord, SearchRequest};
use crate::navigator;
use crate::session::{PageKind, SessionDriver, SessionState};
use anyhow::{bail, Result};

pub const BASE_URL: &str = "https://www.handelsregister.de";

/// Budget for reaching the landing page and the search form.
const START_TIMEOUT_MS: u64 = 10_000;
/// Budget for the results grid; searches are noticeably slower.
const RESULTS_TIMEOUT_MS: u64 = 15_000;

const NAVI_FORM: &str = "naviForm";
const EXTENDED_SEARCH_LINK: &str = "naviForm:erweiterteSucheLink";
const SEARCH_FORM: &str = "form";
const KEYWORDS_FIELD: &str = "form:schlagwoerter";
const KEYWORD_OPTIONS_FIELD: &str = "form:schlagwortOptionen";
const REGISTER_TYPE_FIELD: &str = "form:registerArt_input";
const REGISTER_NUMBER_FIELD: &str = "form:registerNummer";

const KEYWORDS_SELECTOR: &str = r#"input[name="form:schlagwoerter"]"#;
const GRID_SELECTOR: &str = r#"table[role="grid"]"#;

/// Documents with this marker in their name or category carry the
/// shareholder list.
const SHAREHOLDER_LIST_MARKER: &str = "gesellschafterliste";

/// Drives searches and company lookups over one browser session.
pub struct Engine<D: SessionDriver> {
    driver: D,
    cache: PageCache,
    artifacts: ArtifactRetriever,
    state: SessionState,
    force_refresh: bool,
}

impl<D: SessionDriver> Engine<D> {
    pub fn new(driver: D, cache: PageCache) -> Result<Self> {
        Ok(Self {
            driver,
            cache,
            artifacts: ArtifactRetriever::new(BASE_URL)?,
            state: SessionState::new(),
            force_refresh: false,
        })
    }

    /// Bypass the page cache on the next searches.
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Run a search and return the extracted company records.
    ///
    /// Zero matches is a normal outcome, not an error.
    pub async fn search(&mut self, request: &SearchRequest) -> Result<Vec<CompanyRecord>> {
        let fingerprint = request.fingerprint();
        if !self.force_refresh {
            if let Some(html) = self.cache.get(&fingerprint) {
                tracing::debug!(%fingerprint, "serving results from cache");
                return Ok(extract_companies(&html));
            }
        }

        let html = self.search_live(request).await?;
        Ok(extract_companies(&html))
    }

    /// Look up a single company by register number, optionally narrowed
    /// by name, and attach its document list.
    ///
    /// The document tree needs the live session, so this path always
    /// performs a fresh search. `Ok(None)` means no matching record.
    pub async fn get_company(
        &mut self,
        register_number: &str,
        company_name: Option<&str>,
        shareholder_list: bool,
    ) -> Result<Option<CompanyRecord>> {
        let request = SearchRequest::register_number(register_number);
        let html = self.search_live(&request).await?;
        let companies = extract_companies(&html);

        let outcome = match_company(&companies, register_number, company_name);
        let Some(record) = outcome.record else {
            tracing::info!(register_number, "no matching company");
            return Ok(None);
        };
        if outcome.ambiguous {
            tracing::warn!(
                register_number,
                company = %record.name,
                "several candidates matched; picked heuristically"
            );
        }
        let mut company = record.clone();

        if let Some(handle) = company.document_handle.clone() {
            match navigator::fetch_documents(&mut self.driver, &mut self.state, &handle).await {
                Ok(docs) => company.documents = docs,
                Err(e) => tracing::warn!(company = %company.name, "document tree unavailable: {e}"),
            }
        }

        if shareholder_list {
            self.attach_shareholder_list(&mut company).await?;
        }

        Ok(Some(company))
    }

    /// Retrieve the newest shareholder-list document's content into its
    /// record. Absence of the document or its content is non-fatal.
    async fn attach_shareholder_list(&mut self, company: &mut CompanyRecord) -> Result<()> {
        // Documents are date-descending, so the first marker hit is the
        // newest list.
        let index = company.documents.iter().position(|doc| {
            doc.display_name.to_lowercase().contains(SHAREHOLDER_LIST_MARKER)
                || doc
                    .category_label
                    .as_ref()
                    .is_some_and(|l| l.to_lowercase().contains(SHAREHOLDER_LIST_MARKER))
        });
        let Some(index) = index else {
            tracing::warn!(company = %company.name, "no shareholder-list document found");
            return Ok(());
        };

        let payload = self
            .artifacts
            .fetch(&mut self.driver, &mut self.state, &company.documents[index])
            .await?;
        company.documents[index].payload = payload;
        Ok(())
    }

    /// Full page sequence: landing page, extended search, results grid.
    async fn search_live(&mut self, request: &SearchRequest) -> Result<String> {
        self.driver.navigate(BASE_URL, START_TIMEOUT_MS).await?;
        self.state.page = PageKind::Start;

        // The extended search is behind a command-link postback on the
        // navigation form.
        self.driver
            .submit_form(
                NAVI_FORM,
                &[(EXTENDED_SEARCH_LINK.to_string(), EXTENDED_SEARCH_LINK.to_string())],
            )
            .await?;
        if !self
            .driver
            .wait_for_selector(KEYWORDS_SELECTOR, START_TIMEOUT_MS)
            .await?
        {
            return Err(
                RegistryError::NavigationTimeout("extended search form did not load".to_string())
                    .into(),
            );
        }
        self.state.page = PageKind::ExtendedSearch;

        self.fill_search_form(request).await?;
        self.driver.submit_form(SEARCH_FORM, &[]).await?;

        let have_grid = self
            .driver
            .wait_for_selector(GRID_SELECTOR, RESULTS_TIMEOUT_MS)
            .await?;
        let html = self.driver.page_html().await?;
        self.state.page = PageKind::Results;
        self.state.refresh_token(page_state_token(&html));

        if !have_grid {
            if is_session_expired(&html) {
                return Err(RegistryError::SessionExpired.into());
            }
            tracing::info!("results grid absent; zero matches");
        }

        // Zero-match pages are cached too; a repeat of the same query
        // within the TTL stays off the portal either way.
        let fingerprint = request.fingerprint();
        if let Err(e) = self.cache.put(&fingerprint, &html) {
            tracing::warn!(%fingerprint, "failed to cache results page: {e}");
        }
        Ok(html)
    }

    /// Fill either the register-number fields or the keyword fields,
    /// depending on what the request carries.
    async fn fill_search_form(&mut self, request: &SearchRequest) -> Result<()> {
        let register = request
            .register_number
            .as_deref()
            .and_then(parse_register_number);

        if let Some((register_type, number)) = register {
            self.driver
                .select_option(REGISTER_TYPE_FIELD, register_type.as_str())
                .await?;
            self.driver.fill_field(REGISTER_NUMBER_FIELD, &number).await?;
            // Leftover keywords would narrow the register search.
            self.driver.fill_field(KEYWORDS_FIELD, "").await?;
        } else if let Some(keywords) = &request.keywords {
            self.driver.fill_field(KEYWORDS_FIELD, keywords).await?;
            self.driver
                .select_option(KEYWORD_OPTIONS_FIELD, request.match_mode.form_value())
                .await?;
        } else {
            bail!("search request carries neither keywords nor a register number");
        }
        Ok(())
    }

    /// Tear down the browser session.
    pub async fn close(self) -> Result<()> {
        Box::new(self.driver).close().await
    }
}
