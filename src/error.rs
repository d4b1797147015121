//! Error types for the Marathon spawner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Marathon rejected request for {app_id}: {reason}")]
    SubmissionRejected { app_id: String, reason: String },

    #[error("Expected exactly one bound task for {app_id}, found {count}")]
    Topology { app_id: String, count: usize },

    #[error("Could not resolve host {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Status polling for {app_id} failed {attempts} times in a row, last error: {last}")]
    TransientPoll {
        app_id: String,
        attempts: u32,
        last: String,
    },

    #[error("Gave up waiting on {app_id} after {attempts} polls")]
    Timeout { app_id: String, attempts: u32 },

    #[error("Operation on {0} was cancelled")]
    Cancelled(String),

    #[error("Invalid state: lifecycle is {current}, expected {expected}")]
    InvalidState { current: String, expected: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Marathon API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Marathon reported the application as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Wrap any failure of a create/delete call as a rejected submission,
    /// keeping rejections that already carry Marathon's reason.
    pub fn into_rejection(self, app_id: &str) -> Self {
        match self {
            e @ Error::SubmissionRejected { .. } => e,
            e @ Error::Cancelled(_) => e,
            other => Error::SubmissionRejected {
                app_id: app_id.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
