//! Error types for playlist-dl
//!
//! This module provides error handling for the library, including:
//! - The crate-wide [`Error`] returned by fallible public operations
//! - [`JobError`] for submissions the job state machine refuses
//! - [`FrameError`] diagnostics for frames dropped by the event classifier
//!
//! Frame-level and reconciliation anomalies are never returned to callers as
//! `Err`; they are recorded in the job log and reported through `tracing`.

use std::time::Duration;
use thiserror::Error;

use crate::types::JobId;

/// Result type alias for playlist-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for playlist-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "backend.base_url")
        key: Option<String>,
    },

    /// The job state machine refused the request
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Backend answered with a non-success status
    #[error("backend returned HTTP {status} for {url}")]
    Transport {
        /// HTTP status code returned by the backend
        status: u16,
        /// The request URL
        url: String,
    },

    /// No chunk arrived from the stream within the configured idle timeout
    #[error("stream idle for {0:?}")]
    StreamIdle(Duration),

    /// Stream closed before the job reached a terminal event
    #[error("stream ended before the job finished")]
    StreamClosed,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid URL (backend base, playlist url, or artifact location)
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Submissions and operations refused by the job state machine
#[derive(Debug, Error)]
pub enum JobError {
    /// A job is already streaming; only one read loop may be active
    #[error("job {id} is still running")]
    AlreadyRunning {
        /// The job that is currently running
        id: JobId,
    },

    /// Nothing was selected for download
    #[error("selection is empty: select at least one item")]
    EmptySelection,
}

/// Reasons a frame was dropped before becoming a typed event
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame carried no `data:` field
    #[error("frame has no data field")]
    MissingData,

    /// The `data:` payload is not valid JSON
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload parsed but is not a JSON object
    #[error("payload is not an object")]
    NotAnObject,
}

impl Error {
    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Job(e) => match e {
                JobError::AlreadyRunning { .. } => "already_running",
                JobError::EmptySelection => "empty_selection",
            },
            Error::Transport { .. } => "transport_error",
            Error::StreamIdle(_) => "stream_idle",
            Error::StreamClosed => "stream_closed",
            Error::Network(_) => "network_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error belongs to the transport class (connection, status,
    /// read interruption, idle timeout, premature close).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. }
                | Error::StreamIdle(_)
                | Error::StreamClosed
                | Error::Network(_)
                | Error::Io(_)
        )
    }
}
