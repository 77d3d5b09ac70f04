//! Error types shared across the feed, report and cache layers.

use std::io;

use thiserror::Error;

use crate::provider::Scope;

/// Transport-level errors encountered while issuing HTTP requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },
    /// Connection-level failure.
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
}

/// Errors produced while fetching or paginating a feed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FeedError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The response body was not a feature collection.
    #[error("failed to decode feed from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
    /// Pagination was requested before the scope was ever fetched.
    #[error("no cursor for {0} scope; fetch the scope before paginating")]
    MissingCursor(Scope),
}

/// Errors produced by the report accumulator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The session's draft has already been sent.
    #[error("the report for this session was already submitted")]
    AlreadySubmitted,
}

/// Errors produced by persistent key-value stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("failed to access store at {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("store at {path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

/// Errors produced by the local cache facility.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The key issuance response did not carry an `apikey` field.
    #[error("key issuance response was not understood: {0}")]
    KeyResponse(serde_json::Error),
    /// There is no cached report to send.
    #[error("no cached report")]
    NothingCached,
}
