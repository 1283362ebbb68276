//! Upload orchestration for eventually-consistent backends.
//!
//! One backend-agnostic protocol:
//!   1. rename the file to a unique, timestamped artifact name
//!   2. acquire a credential
//!   3. make sure the upload directory exists (check, then create once)
//!   4. transfer the artifact; any failure here is returned as is
//!   5. wait for the backend's listing index to settle
//!   6. poll for the public link (see [`crate::poller`])
//!   7. render `![artifact](url)`
//!
//! The step 2 credential authorises the directory probe. Directory creation, the transfer and
//! every poll attempt fetch their own. Steps 2 to 4 fail fast; only the polling step absorbs
//! errors.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::artifact::{RemotePath, RenamedArtifact};
use crate::contract::{
    Credential, CredentialProvider, LinkResolver, RemoteFs, UploadRequest, UploadTransport,
    Uploader, EXISTS_SUCCESS,
};
use crate::error::UploadError;
use crate::markdown;
use crate::poller::{poll_for_link, sleep_or_cancel, PollTarget};
use crate::retry::PollPolicy;

/// Where files are written and where they are read back from.
///
/// Some backends mount the same storage under different paths for writing and for serving
/// links, so the two are configured separately. Empty strings mean the namespace root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub upload_dir: String,
    pub read_dir: String,
}

/// [`Uploader`] that runs the consistency-recovery protocol over pluggable backend parts.
pub struct ConsistentUploader<C, F, U, R> {
    credentials: C,
    fs: F,
    transport: U,
    resolver: R,
    layout: DirectoryLayout,
    policy: PollPolicy,
}

impl<C, F, U, R> ConsistentUploader<C, F, U, R>
where
    C: CredentialProvider,
    F: RemoteFs,
    U: UploadTransport,
    R: LinkResolver,
{
    pub fn new(credentials: C, fs: F, transport: U, resolver: R, layout: DirectoryLayout) -> Self {
        Self {
            credentials,
            fs,
            transport,
            resolver,
            layout,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Runs the protocol; `cancel` is honoured between steps and during waits, never
    /// mid-request.
    #[tracing::instrument(skip_all, fields(file = %request.original_name()))]
    pub async fn upload_with_cancel(
        &self,
        request: &UploadRequest,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        let artifact = RenamedArtifact::derive(request.original_name());
        info!(artifact = %artifact, size = request.bytes().len(), "Starting upload");

        let credential = self.credentials.get_token().await.map_err(|e| {
            error!(error = %e, "Failed to acquire credential");
            e
        })?;

        let upload_dir = RemotePath::dir(&self.layout.upload_dir);
        self.ensure_dir(&upload_dir, &credential).await?;
        bail_if_cancelled(cancel)?;

        let target = RemotePath::join(&self.layout.upload_dir, artifact.name());
        let transfer_credential = self.credentials.get_token().await?;
        self.transport
            .transfer(request, &target, &transfer_credential)
            .await
            .map_err(|e| {
                error!(target = %target, error = %e, "File transfer failed");
                e
            })?;
        info!(target = %target, "File transferred");

        sleep_or_cancel(self.policy.settle_delay, cancel).await?;

        let listing_dir = RemotePath::dir(&self.layout.read_dir);
        let read_path = RemotePath::join(&self.layout.read_dir, artifact.name());
        let url = poll_for_link(
            &self.credentials,
            &self.fs,
            &self.resolver,
            PollTarget {
                listing_dir: &listing_dir,
                path: &read_path,
                name: artifact.name(),
            },
            &self.policy,
            cancel,
        )
        .await?;

        Ok(markdown::image_link(artifact.name(), &url))
    }

    /// Check-then-create. Not transactional; the adapter tolerates losing the race.
    async fn ensure_dir(
        &self,
        dir: &RemotePath,
        credential: &Credential,
    ) -> Result<(), UploadError> {
        let status = self.fs.exists(dir, credential).await.map_err(|e| {
            error!(dir = %dir, error = %e, "Directory probe failed");
            e
        })?;
        if status == EXISTS_SUCCESS {
            debug!(dir = %dir, "Upload directory exists");
            return Ok(());
        }

        info!(dir = %dir, status = %status, "Creating upload directory");
        let credential = self.credentials.get_token().await?;
        self.fs.mkdir(dir, &credential).await.map_err(|e| {
            error!(dir = %dir, error = %e, "Directory creation failed");
            e
        })
    }
}

fn bail_if_cancelled(cancel: &CancellationToken) -> Result<(), UploadError> {
    if cancel.is_cancelled() {
        info!("Upload cancelled");
        return Err(UploadError::Cancelled);
    }
    Ok(())
}

#[async_trait]
impl<C, F, U, R> Uploader for ConsistentUploader<C, F, U, R>
where
    C: CredentialProvider,
    F: RemoteFs,
    U: UploadTransport,
    R: LinkResolver,
{
    async fn upload(&self, request: &UploadRequest) -> Result<String, UploadError> {
        self.upload_with_cancel(request, &CancellationToken::new())
            .await
    }
}
