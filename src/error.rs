//! Typed errors for every stage of a scrape run.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::RunSummary;

/// A raw job URL could not be turned into a dedup key.
///
/// Never fatal: the writer counts the record as invalid and moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("url is empty")]
    Empty,

    #[error("malformed url '{url}': {reason}")]
    Malformed { url: String, reason: String },

    #[error("unsupported scheme '{scheme}' in '{url}'")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("url '{url}' has no host")]
    MissingHost { url: String },
}

/// Errors produced while fetching one result page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Proxy route failed. Recovered by retrying the page without the proxy.
    #[error("proxy failed at page offset {offset}: {reason}")]
    ProxyFailed { offset: u32, reason: String },

    /// Rate-limit ceiling exceeded. Fatal to the run.
    #[error("rate limited at page offset {offset} after {attempts} attempts")]
    RateLimited { offset: u32, attempts: u32 },

    /// Non-success status, empty body or challenge page. Ends pagination.
    #[error("bad response at page offset {offset}: {reason}")]
    BadResponse { offset: u32, reason: String },

    #[error("http client setup failed: {0}")]
    ClientSetup(#[source] reqwest::Error),

    #[error("invalid search endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// Errors raised by a sink. Any of them aborts the write phase.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("csv i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv failure on {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("document store unavailable: {0}")]
    Connectivity(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("document store write failed: {0}")]
    Write(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("could not encode job document: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("invalid STORAGE_TYPE '{0}', expected 'csv' or 'mongo'")]
    UnknownStorage(String),
}

/// Fatal errors that stop a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A run that aborted, with the counts accumulated before the abort.
#[derive(Debug, Error)]
#[error("run aborted ({summary}): {source}")]
pub struct RunFailure {
    pub summary: RunSummary,
    #[source]
    pub source: PipelineError,
}
