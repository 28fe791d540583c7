//! Error type shared by the provider adapters.

use thiserror::Error;

/// Errors raised by provider operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when the API answers with an unexpected HTTP status. The
    /// message is the raw response body.
    #[error("{body}")]
    Status {
        /// HTTP status code returned by the API.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Raised when a successful response body cannot be decoded.
    #[error("failed to decode {what} response: {message}")]
    Decode {
        /// Kind of payload being decoded (for example `ssh keys`).
        what: String,
        /// Decoder error message.
        message: String,
    },
    /// Raised when a creation response lacks a recognisable identifier.
    #[error("{what} response carried no identifier: {body}")]
    MissingIdentifier {
        /// Kind of object that was created.
        what: String,
        /// Raw response body.
        body: String,
    },
    /// Raised when the request never produced a response.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Request URL without credentials.
        url: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when a resource request is missing a required field.
    #[error("invalid resource request: missing or empty field {0}")]
    Validation(String),
}

impl ProviderError {
    pub(crate) fn decode(what: &str, err: &serde_json::Error) -> Self {
        Self::Decode {
            what: what.to_owned(),
            message: err.to_string(),
        }
    }
}
