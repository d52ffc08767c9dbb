// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed failure kinds for the search-and-extraction engine.
//!
//! These cover the conditions the engine degrades on rather than aborts:
//! a timeout means zero results, an expired session means an empty
//! document list, an unavailable artifact means absence. Only the CLI
//! boundary turns anything into a process-level error.

/// Errors raised by the registry engine.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// A selector or condition never became satisfied within its budget.
    #[error("navigation timed out waiting for {0}")]
    NavigationTimeout(String),

    /// The remote session reported expiry via a textual marker.
    #[error("remote session expired")]
    SessionExpired,

    /// A follow-up request was rejected because the state token was stale.
    #[error("stale state token: {0}")]
    StaleStateToken(String),

    /// A partial-update payload could not be decoded.
    #[error("malformed partial response: {0}")]
    PartialResponseParse(String),

    /// A document payload could not be retrieved (script-dependent or
    /// unrecognized content).
    #[error("artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    /// An archive payload contained no document-type entry.
    #[error("archive extraction failed: {0}")]
    ArchiveExtraction(String),

    /// The browser driver failed outside of a bounded wait.
    #[error("driver error: {0}")]
    Driver(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type RegistryResult<T> = Result<T, RegistryError>;
