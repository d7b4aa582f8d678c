use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, InferenceError>;

/// Failures past client setup name the model they came from.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP client setup failed: {0}")]
    Setup(String),

    /// No answer at all: connect, TLS or timeout.
    #[error("{model}: request failed: {message}")]
    Request { model: String, message: String },

    /// Non-2xx answer. Hosted models answer 503 while cold-loading.
    #[error("{model}: status {status}: {message}")]
    Status {
        model: String,
        status: u16,
        message: String,
    },

    /// The body was not the JSON shape the task returns.
    #[error("{model}: undecodable response: {message}")]
    Decode { model: String, message: String },

    /// Decoded, but the payload breaks its contract (no labels, length
    /// mismatch, ragged vectors, empty completion).
    #[error("{model}: malformed {task} response: {reason}")]
    Malformed {
        model: String,
        task: &'static str,
        reason: String,
    },
}

impl InferenceError {
    pub(crate) fn request(model: &str, err: impl fmt::Display) -> Self {
        Self::Request {
            model: model.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(model: &str, err: impl fmt::Display) -> Self {
        Self::Decode {
            model: model.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn malformed(model: &str, task: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            model: model.to_string(),
            task,
            reason: reason.into(),
        }
    }
}
