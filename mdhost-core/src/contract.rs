//! # contract: interfaces between the upload protocol and its backends
//!
//! The orchestrator in [`crate::orchestrator`] only talks to the traits below. A backend with an
//! eventually-consistent multi-step API implements [`CredentialProvider`], [`RemoteFs`],
//! [`UploadTransport`] and [`LinkResolver`]; single-shot backends implement [`Uploader`]
//! directly.
//!
//! ## Mocking & Testing
//! Every trait is annotated for `mockall`, and the mocks are exported behind the
//! `test-export-mocks` feature so integration tests and dependent crates can script backends.

use std::path::Path;

use async_trait::async_trait;
use mockall::automock;

use crate::artifact::RemotePath;
use crate::error::UploadError;

/// Status returned by [`RemoteFs::exists`] when the directory is present.
///
/// Anything else (a different message, an error code rendered as text) means "create it".
pub const EXISTS_SUCCESS: &str = "success";

/// A file submitted for upload. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    original_name: String,
    bytes: Vec<u8>,
}

impl UploadRequest {
    pub fn new(original_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes,
        }
    }

    /// Reads a local file; the request is named after the file's last path component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(path = %path.display(), size = bytes.len(), "Read file for upload");
        Ok(Self::new(original_name, bytes))
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type guessed from the file extension, `application/octet-stream` if unknown.
    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.original_name)
            .first_or_octet_stream()
            .essence_str()
            .to_owned()
    }
}

/// An authorization value and the backend it was issued for.
///
/// Never cached: each protocol step that needs one asks the provider again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub issued_for: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, issued_for: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_for: issued_for.into(),
        }
    }
}

/// Uploads a file and returns a markdown reference to it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> Result<String, UploadError>;
}

/// Produces authorization for a backend. Fails with [`UploadError::Auth`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_token(&self) -> Result<Credential, UploadError>;
}

/// Directory operations on the backend's hierarchical namespace.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Opaque status; [`EXISTS_SUCCESS`] means the directory exists.
    async fn exists(&self, dir: &RemotePath, credential: &Credential)
        -> Result<String, UploadError>;

    /// Creates `dir`. A directory that already exists is not an error.
    async fn mkdir(&self, dir: &RemotePath, credential: &Credential) -> Result<(), UploadError>;

    /// Asks the backend to rebuild its listing of `dir`.
    async fn refresh(&self, dir: &RemotePath, credential: &Credential)
        -> Result<(), UploadError>;
}

/// Sends file content to a target path.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn transfer(
        &self,
        request: &UploadRequest,
        target: &RemotePath,
        credential: &Credential,
    ) -> Result<(), UploadError>;
}

/// Resolves an uploaded path to a public URL.
///
/// Returns [`UploadError::NotFoundYet`] (or an empty string) while the backend has not caught up.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, path: &RemotePath, credential: &Credential)
        -> Result<String, UploadError>;
}

/// Read-only access to a token obtained out of band (e.g. an OAuth sign-in).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// A token store holding a fixed value.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenStore(pub Option<String>);

impl TokenStore for StaticTokenStore {
    fn access_token(&self) -> Option<String> {
        self.0.clone().filter(|t| !t.is_empty())
    }
}
