//! Hosting backends and the factory that turns a [`Config`] into an [`Uploader`].

pub mod alist;
pub mod imgur;
pub mod smms;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendConfig, Config};
use crate::contract::{Credential, CredentialProvider, StaticTokenStore, TokenStore, Uploader};
use crate::error::UploadError;
use crate::retry::PollPolicy;
use crate::transport::HttpTransport;

pub use alist::{alist_uploader, AlistClient, AlistUploader};
pub use imgur::{ImgurCredentials, ImgurUploader};
pub use smms::SmmsUploader;

/// A configured, never-expiring token (API keys).
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: String,
    issued_for: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>, issued_for: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_for: issued_for.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_token(&self) -> Result<Credential, UploadError> {
        if self.token.is_empty() {
            return Err(UploadError::Auth(format!(
                "no API token configured for {}",
                self.issued_for
            )));
        }
        Ok(Credential::new(self.token.clone(), self.issued_for.clone()))
    }
}

/// Builds the uploader selected by `config.backend`.
///
/// The Imgur access token is taken from `token_store` when given, otherwise from the
/// `access_token` configuration value.
pub fn build_uploader(
    config: &Config,
    http: Arc<dyn HttpTransport>,
    token_store: Option<Arc<dyn TokenStore>>,
) -> Box<dyn Uploader> {
    let policy = PollPolicy::from(&config.poll);
    match &config.backend {
        BackendConfig::Alist(alist) => Box::new(alist_uploader(alist.clone(), http, policy)),
        BackendConfig::Smms(smms) => Box::new(SmmsUploader::new(smms.clone(), http)),
        BackendConfig::Imgur(imgur) => {
            let store = token_store.unwrap_or_else(|| {
                Arc::new(StaticTokenStore(imgur.access_token.clone())) as Arc<dyn TokenStore>
            });
            Box::new(ImgurUploader::new(imgur.clone(), store, http))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_static_token_is_an_auth_error() {
        let err = StaticCredentials::new("", "smms").get_token().await.unwrap_err();
        assert!(matches!(err, UploadError::Auth(ref m) if m.contains("smms")));
    }
}
