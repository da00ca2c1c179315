//! Error types for request assembly and execution.
//!
//! # Design
//! Configuration mistakes (`Usage`, `InvalidUrl`, `IllegalState`) are
//! recorded on the `Request` while it is being built and surface before the
//! first transport call. Everything raised during execution (redirect policy,
//! transport, sink) is returned unmodified after failure listeners have been
//! notified; the executor never retries or downgrades an error.

use thiserror::Error;

/// Errors produced while building or executing a request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The caller combined options that cannot work together.
    #[error("usage error: {0}")]
    Usage(String),

    /// The URL could not be parsed.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// An operation is not valid for the request in its current state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The server answered with a redirect and the request does not follow them.
    #[error("received a redirect from {url} and no redirects are allowed")]
    RedirectsDisallowed { url: String },

    /// The redirect limit was reached.
    #[error("{max} redirects were generated when trying to access {url}")]
    TooManyRedirects { max: u32, url: String },

    /// A redirect status arrived without a `Location` header.
    #[error("redirect status {status} without a Location header")]
    MissingLocation { status: u16 },

    /// The underlying transport failed (connect, TLS, malformed response).
    #[error("transport error: {0}")]
    Transport(String),

    /// Reading the response body stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The response sink could not open, write or flush its destination.
    #[error("response sink error: {0}")]
    Sink(#[source] std::io::Error),

    /// A JSON body or form field could not be serialized, or a buffered
    /// body could not be deserialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RequestError {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        RequestError::Usage(msg.into())
    }

    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        RequestError::IllegalState(msg.into())
    }

    /// True for errors raised by redirect policy.
    pub fn is_redirect(&self) -> bool {
        matches!(
            self,
            RequestError::RedirectsDisallowed { .. }
                | RequestError::TooManyRedirects { .. }
                | RequestError::MissingLocation { .. }
        )
    }

    /// True for errors caused by caller configuration rather than execution.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            RequestError::Usage(_) | RequestError::InvalidUrl { .. } | RequestError::IllegalState(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RequestError>;
