//! Imgur backend, anonymous (client id) or on behalf of a signed-in user.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::ImgurConfig;
use crate::contract::{Credential, CredentialProvider, TokenStore, UploadRequest, Uploader};
use crate::error::UploadError;
use crate::markdown;
use crate::multipart::MultipartBuilder;
use crate::transport::{HttpRequest, HttpTransport};

/// Imgur authorization.
///
/// Anonymous mode never consults the token store; authenticated mode only reads it.
pub struct ImgurCredentials {
    anonymous: bool,
    client_id: Option<String>,
    store: Arc<dyn TokenStore>,
}

impl ImgurCredentials {
    pub fn new(config: &ImgurConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            anonymous: config.anonymous,
            client_id: config.effective_client_id().map(str::to_owned),
            store,
        }
    }
}

#[async_trait]
impl CredentialProvider for ImgurCredentials {
    async fn get_token(&self) -> Result<Credential, UploadError> {
        if self.anonymous {
            return match &self.client_id {
                Some(id) => Ok(Credential::new(format!("Client-ID {id}"), "imgur")),
                None => Err(UploadError::Auth(
                    "no Imgur client id configured; set client_id or default_client_id".into(),
                )),
            };
        }

        match self.store.access_token() {
            Some(token) => Ok(Credential::new(format!("Bearer {token}"), "imgur")),
            None => {
                warn!("Imgur upload requested without a stored access token");
                Err(UploadError::NotSignedIn)
            }
        }
    }
}

pub struct ImgurUploader {
    endpoint: String,
    anonymous: bool,
    credentials: ImgurCredentials,
    http: Arc<dyn HttpTransport>,
}

impl ImgurUploader {
    pub fn new(
        config: ImgurConfig,
        store: Arc<dyn TokenStore>,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            anonymous: config.anonymous,
            credentials: ImgurCredentials::new(&config, store),
            http,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImgurResponse {
    data: Option<ImgurImage>,
}

#[derive(Debug, Deserialize)]
struct ImgurImage {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    deletehash: Option<String>,
}

#[async_trait]
impl Uploader for ImgurUploader {
    #[tracing::instrument(skip_all, fields(file = %request.original_name()))]
    async fn upload(&self, request: &UploadRequest) -> Result<String, UploadError> {
        let credential = self.credentials.get_token().await?;

        let form = MultipartBuilder::new()
            .add_file(
                "image",
                request.original_name(),
                request.content_type(),
                request.bytes(),
            )
            .build();
        let route = if self.anonymous { "/3/upload" } else { "/3/image" };
        let http_request = HttpRequest::new(Method::POST, format!("{}{}", self.endpoint, route))
            .header("Content-Type", form.content_type())
            .header("Authorization", credential.token)
            .body(form.bytes);

        let body = self.http.send(http_request).await.map_err(|e| {
            error!(error = %e, "Imgur upload failed");
            e
        })?;
        let image = serde_json::from_str::<ImgurResponse>(&body)
            .map_err(|e| UploadError::InvalidResponse(format!("Imgur: {e}")))?
            .data
            .ok_or_else(|| UploadError::InvalidResponse("Imgur response has no data".into()))?;
        let link = image
            .link
            .filter(|l| !l.is_empty())
            .ok_or_else(|| UploadError::InvalidResponse("Imgur response has no link".into()))?;
        info!(url = %link, "Uploaded to Imgur");

        let label = if self.anonymous {
            image.deletehash.unwrap_or_default()
        } else {
            "Imgur".to_owned()
        };
        Ok(markdown::image_link(&label, &link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockTokenStore, StaticTokenStore};
    use crate::transport::MockHttpTransport;

    fn anonymous_config() -> ImgurConfig {
        ImgurConfig {
            anonymous: true,
            default_client_id: "fallback-id".into(),
            ..ImgurConfig::default()
        }
    }

    #[tokio::test]
    async fn anonymous_upload_never_reads_the_token_store() {
        let mut store = MockTokenStore::new();
        store.expect_access_token().never();

        let mut http = MockHttpTransport::new();
        http.expect_send()
            .withf(|req| {
                req.url == "https://api.imgur.com/3/upload"
                    && req.header_value("Authorization") == Some("Client-ID fallback-id")
            })
            .times(1)
            .returning(|_| {
                Ok(serde_json::json!({
                    "data": {"link": "https://i.imgur.com/abc.png", "deletehash": "dh123"},
                    "success": true
                })
                .to_string())
            });

        let uploader = ImgurUploader::new(anonymous_config(), Arc::new(store), Arc::new(http));
        let md = uploader
            .upload(&UploadRequest::new("abc.png", b"img".to_vec()))
            .await
            .unwrap();
        assert_eq!(md, "![dh123](https://i.imgur.com/abc.png)");
    }

    #[tokio::test]
    async fn configured_client_id_wins_over_default() {
        let credentials = ImgurCredentials::new(
            &ImgurConfig {
                client_id: "mine".into(),
                ..anonymous_config()
            },
            Arc::new(StaticTokenStore::default()),
        );
        assert_eq!(credentials.get_token().await.unwrap().token, "Client-ID mine");
    }

    #[tokio::test]
    async fn authenticated_without_token_is_not_signed_in_and_skips_network() {
        let mut store = MockTokenStore::new();
        store.expect_access_token().times(1).returning(|| None);
        let mut http = MockHttpTransport::new();
        http.expect_send().never();

        let config = ImgurConfig {
            anonymous: false,
            ..ImgurConfig::default()
        };
        let uploader = ImgurUploader::new(config, Arc::new(store), Arc::new(http));
        let err = uploader
            .upload(&UploadRequest::new("a.png", vec![1]))
            .await
            .expect_err("not signed in");
        assert!(matches!(err, UploadError::NotSignedIn));
    }

    #[tokio::test]
    async fn authenticated_upload_uses_bearer_token() {
        let mut http = MockHttpTransport::new();
        http.expect_send()
            .withf(|req| {
                req.url == "https://api.imgur.com/3/image"
                    && req.header_value("Authorization") == Some("Bearer user-token")
            })
            .times(1)
            .returning(|_| Ok(r#"{"data":{"link":"https://i.imgur.com/u.png"}}"#.into()));

        let config = ImgurConfig {
            anonymous: false,
            ..ImgurConfig::default()
        };
        let uploader = ImgurUploader::new(
            config,
            Arc::new(StaticTokenStore(Some("user-token".into()))),
            Arc::new(http),
        );
        let md = uploader
            .upload(&UploadRequest::new("u.png", vec![1]))
            .await
            .unwrap();
        assert_eq!(md, "![Imgur](https://i.imgur.com/u.png)");
    }

    #[tokio::test]
    async fn missing_client_id_is_an_auth_error() {
        let credentials = ImgurCredentials::new(
            &ImgurConfig::default(),
            Arc::new(StaticTokenStore::default()),
        );
        assert!(matches!(credentials.get_token().await, Err(UploadError::Auth(_))));
    }
}
