//! Link resolution poller.
//!
//! Backends whose write path is not immediately visible on their read path need a few tries
//! before a freshly uploaded file resolves to a URL. Each attempt refreshes the listing, then
//! asks for the link. Per-attempt failures are logged, never returned; only running out of
//! attempts (or cancellation) ends the loop with an error.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifact::RemotePath;
use crate::contract::{CredentialProvider, LinkResolver, RemoteFs};
use crate::error::UploadError;
use crate::retry::PollPolicy;

/// What to poll for.
#[derive(Debug, Clone, Copy)]
pub struct PollTarget<'a> {
    /// Directory whose listing is refreshed before each attempt.
    pub listing_dir: &'a RemotePath,
    /// Path handed to the resolver.
    pub path: &'a RemotePath,
    /// Artifact name, used in diagnostics.
    pub name: &'a str,
}

/// Polls until `resolver` yields a non-empty URL or the policy's attempt budget is spent.
///
/// Every attempt authorises with a fresh credential, so a token that expires mid-poll only
/// costs one attempt.
pub async fn poll_for_link<C, F, R>(
    credentials: &C,
    fs: &F,
    resolver: &R,
    target: PollTarget<'_>,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<String, UploadError>
where
    C: CredentialProvider + ?Sized,
    F: RemoteFs + ?Sized,
    R: LinkResolver + ?Sized,
{
    let max = policy.max_attempts;
    for attempt in 1..=max {
        if cancel.is_cancelled() {
            info!(attempt, name = target.name, "Link polling cancelled");
            return Err(UploadError::Cancelled);
        }

        if let Some(url) =
            attempt_resolution(credentials, fs, resolver, target, attempt, max).await
        {
            info!(attempt, path = %target.path, url = %url, "Resolved uploaded file link");
            return Ok(url);
        }

        if attempt < max {
            let delay = policy.delay_after(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before next attempt");
            sleep_or_cancel(delay, cancel).await?;
        }
    }

    error!(attempts = max, name = target.name, "Gave up resolving uploaded file link");
    Err(UploadError::LinkResolutionExhausted {
        name: target.name.to_owned(),
        attempts: max,
    })
}

/// One refresh-then-resolve round. Every failure is logged and yields `None`.
async fn attempt_resolution<C, F, R>(
    credentials: &C,
    fs: &F,
    resolver: &R,
    target: PollTarget<'_>,
    attempt: u32,
    max: u32,
) -> Option<String>
where
    C: CredentialProvider + ?Sized,
    F: RemoteFs + ?Sized,
    R: LinkResolver + ?Sized,
{
    let credential = match credentials.get_token().await {
        Ok(c) => c,
        Err(e) => {
            warn!(attempt, max, error = %e, "Could not authorize link resolution attempt");
            return None;
        }
    };

    if let Err(e) = fs.refresh(target.listing_dir, &credential).await {
        warn!(attempt, max, dir = %target.listing_dir, error = %e, "Listing refresh failed");
    }

    match resolver.resolve(target.path, &credential).await {
        Ok(url) if !url.trim().is_empty() => Some(url),
        Ok(_) => {
            warn!(attempt, max, path = %target.path, "Link resolution returned an empty URL");
            None
        }
        Err(e) if e.is_not_found_yet() => {
            warn!(attempt, max, path = %target.path, "Uploaded file not visible yet");
            None
        }
        Err(e) => {
            warn!(
                attempt,
                max,
                path = %target.path,
                error = %e,
                "Link resolution attempt failed"
            );
            None
        }
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), UploadError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UploadError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
