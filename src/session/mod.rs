// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session driver abstraction over the browser engine.
//!
//! The portal is a stateful multi-page application: every follow-up
//! request must carry the state token issued by the previous response.
//! `SessionDriver` is the seam between the engine and the automation
//! backend (chromiumoxide in production, scripted fakes in tests);
//! `SessionState` is threaded explicitly through every flow instead of
//! living in an ambient global.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which view of the remote application the session currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageKind {
    Start,
    ExtendedSearch,
    Results,
    DocumentTree,
    DocumentView,
}

/// Explicit per-lookup session state.
///
/// The token must always be the most recent value returned by the server;
/// a stale token makes the next request fail (observable as a session
/// expired marker or a malformed response).
#[derive(Debug, Clone)]
pub struct SessionState {
    pub token: Option<String>,
    pub page: PageKind,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            token: None,
            page: PageKind::Start,
        }
    }

    /// Adopt the refreshed token from a partial-update response.
    pub fn refresh_token(&mut self, token: Option<String>) {
        if let Some(token) = token {
            tracing::trace!("state token refreshed");
            self.token = Some(token);
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequencing interface over the browser automation engine.
///
/// All waits are bounded; `wait_for_selector` reports a miss as
/// `Ok(false)` rather than an error, since a missing grid is a normal
/// zero-result outcome.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Navigate to a URL, bounded by `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Wait until a CSS selector matches, bounded by `timeout_ms`.
    async fn wait_for_selector(&mut self, css: &str, timeout_ms: u64) -> Result<bool>;

    /// Fill the named form field. `Ok(false)` when the field is absent.
    async fn fill_field(&mut self, name: &str, value: &str) -> Result<bool>;

    /// Select an option value in the named select field.
    async fn select_option(&mut self, name: &str, value: &str) -> Result<bool>;

    /// Submit the named form, injecting extra hidden fields first.
    async fn submit_form(&mut self, form: &str, hidden: &[(String, String)]) -> Result<()>;

    /// Click the element with the given id. `Ok(false)` when absent.
    async fn click(&mut self, element_id: &str) -> Result<bool>;

    /// Full HTML of the current page.
    async fn page_html(&mut self) -> Result<String>;

    /// Current page URL.
    async fn current_url(&mut self) -> Result<String>;

    /// Issue a partial-update POST through the named form, carrying the
    /// form's current fields overridden by `fields`, and return the raw
    /// response body. The page itself is left untouched.
    async fn post_partial(&mut self, form: &str, fields: &[(String, String)]) -> Result<String>;

    /// Retrieve a URL's bytes from within the session (cookies apply).
    async fn fetch_binary(&mut self, url: &str) -> Result<Vec<u8>>;

    /// Return to the previous page in history.
    async fn go_back(&mut self) -> Result<()>;

    /// Tear down the session.
    async fn close(self: Box<Self>) -> Result<()>;
}
