//! Error taxonomy for the upload protocol.
//!
//! Steps that must not be masked (credential acquisition, directory creation, file transfer)
//! surface their error immediately. [`UploadError::NotFoundYet`] is the only variant the
//! link poller treats as expected lag; everything else seen while polling is logged and retried
//! until the attempt budget runs out.

use thiserror::Error;

/// Failure of a single HTTP exchange.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response (DNS, connect, timeout, body read).
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// The server answered with a non-2xx status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// HTTP 2xx, but the backend envelope reported a failure.
    #[error("{url} rejected the request: {message}")]
    Rejected { url: String, message: String },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not signed in: no access token is stored for this backend")]
    NotSignedIn,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("link for {0} is not available yet")]
    NotFoundYet(String),

    #[error(
        "could not obtain a link for {name} after {attempts} attempts; \
         check whether the upload succeeded"
    )]
    LinkResolutionExhausted { name: String, attempts: u32 },

    #[error("unexpected response from backend: {0}")]
    InvalidResponse(String),

    #[error("upload cancelled")]
    Cancelled,

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Whether this error is the backend's listing index lagging behind a write.
    pub fn is_not_found_yet(&self) -> bool {
        matches!(self, UploadError::NotFoundYet(_))
    }
}
