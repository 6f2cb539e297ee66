//! Error taxonomy for the login pipeline
//!
//! Every variant aborts the whole login attempt. Nothing here is retried.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoginError {
    /// Non-2xx response. `url` has its query string removed.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("HTTP request failed: {0}")]
    Transport(reqwest::Error),

    #[error("XML parsing failed: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No supported authentication factors")]
    NoSupportedFactor,

    #[error("Unexpected {step} result: expected {expected}, got {actual}")]
    ProtocolAssertion {
        step: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Push notification still unanswered after {polls} polls")]
    PushTimeout { polls: u32 },

    #[error("Prompt failed: {0}")]
    Prompt(#[source] std::io::Error),
}

impl From<reqwest::Error> for LoginError {
    fn from(e: reqwest::Error) -> Self {
        // The session-cookie redirect URL carries the session token
        LoginError::Transport(e.without_url())
    }
}

impl From<serde_json::Error> for LoginError {
    fn from(e: serde_json::Error) -> Self {
        LoginError::MalformedResponse(format!("invalid JSON: {}", e))
    }
}

impl LoginError {
    pub(crate) fn missing(what: impl Into<String>) -> Self {
        LoginError::MalformedResponse(format!("missing {}", what.into()))
    }
}
