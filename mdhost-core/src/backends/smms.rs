//! SM.MS backend: a single multipart POST that returns the link immediately.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::SmmsConfig;
use crate::contract::{CredentialProvider, UploadRequest, Uploader};
use crate::error::UploadError;
use crate::markdown;
use crate::multipart::MultipartBuilder;
use crate::transport::{HttpRequest, HttpTransport};

use super::StaticCredentials;

pub struct SmmsUploader {
    endpoint: String,
    credentials: StaticCredentials,
    http: Arc<dyn HttpTransport>,
}

impl SmmsUploader {
    pub fn new(config: SmmsConfig, http: Arc<dyn HttpTransport>) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            credentials: StaticCredentials::new(config.token, "smms"),
            http,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SmmsResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    /// Set instead of `data` when the same image was uploaded before.
    #[serde(default)]
    images: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Reads `data.url`, falling back to the top-level `images` field.
fn parse_link(body: &str) -> Result<String, UploadError> {
    let response: SmmsResponse = serde_json::from_str(body)
        .map_err(|e| UploadError::InvalidResponse(format!("SM.MS: {e}")))?;

    let primary = response
        .data
        .as_ref()
        .and_then(|d| d.get("url"))
        .and_then(|u| u.as_str())
        .filter(|u| !u.is_empty());
    if let Some(url) = primary {
        return Ok(url.to_owned());
    }

    match response.images.filter(|u| !u.is_empty()) {
        Some(url) => {
            debug!(url = %url, "SM.MS reports a repeated upload; using existing image");
            Ok(url)
        }
        None => Err(UploadError::InvalidResponse(format!(
            "SM.MS returned no image url: {}",
            response.message.unwrap_or_default()
        ))),
    }
}

#[async_trait]
impl Uploader for SmmsUploader {
    #[tracing::instrument(skip_all, fields(file = %request.original_name()))]
    async fn upload(&self, request: &UploadRequest) -> Result<String, UploadError> {
        let credential = self.credentials.get_token().await?;
        let form = MultipartBuilder::new()
            .add_text("format", "json")
            .add_file(
                "smfile",
                request.original_name(),
                request.content_type(),
                request.bytes(),
            )
            .build();

        let url = format!("{}/api/v2/upload", self.endpoint);
        let http_request = HttpRequest::new(Method::POST, url)
            .header("Content-Type", form.content_type())
            .header("Authorization", credential.token)
            .body(form.bytes);

        let body = self.http.send(http_request).await.map_err(|e| {
            error!(error = %e, "SM.MS upload failed");
            e
        })?;
        let link = parse_link(&body)?;
        info!(url = %link, "Uploaded to SM.MS");
        Ok(markdown::image_link("SMMS", &link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockHttpTransport;

    #[test]
    fn prefers_data_url() {
        let body =
            r#"{"success":true,"data":{"url":"https://s2.loli.net/a.png"},"images":"https://old"}"#;
        assert_eq!(parse_link(body).unwrap(), "https://s2.loli.net/a.png");
    }

    #[test]
    fn falls_back_to_images_for_repeated_uploads() {
        let body = serde_json::json!({
            "success": false,
            "code": "image_repeated",
            "message": "Image upload repeated limit",
            "images": "https://s2.loli.net/old.png"
        })
        .to_string();
        let body = body.as_str();
        assert_eq!(parse_link(body).unwrap(), "https://s2.loli.net/old.png");
    }

    #[test]
    fn non_object_data_still_falls_back() {
        let body = r#"{"data":[],"images":"https://s2.loli.net/old.png"}"#;
        assert_eq!(parse_link(body).unwrap(), "https://s2.loli.net/old.png");
    }

    #[test]
    fn neither_field_is_an_invalid_response() {
        let err = parse_link(r#"{"success":false,"message":"Unauthorized"}"#).unwrap_err();
        assert!(matches!(err, UploadError::InvalidResponse(ref m) if m.contains("Unauthorized")));
    }

    #[tokio::test]
    async fn upload_posts_format_before_file_and_renders_markdown() {
        let mut http = MockHttpTransport::new();
        http.expect_send()
            .withf(|req| {
                let body = String::from_utf8_lossy(&req.body);
                let format_at = body.find("name=\"format\"");
                let file_at = body.find("name=\"smfile\"; filename=\"cat.png\"");
                req.url == "https://sm.ms/api/v2/upload"
                    && req.header_value("Authorization") == Some("sm-token")
                    && matches!((format_at, file_at), (Some(f), Some(s)) if f < s)
            })
            .times(1)
            .returning(|_| Ok(r#"{"data":{"url":"https://s2.loli.net/cat.png"}}"#.into()));

        let uploader = SmmsUploader::new(
            SmmsConfig {
                token: "sm-token".into(),
                ..SmmsConfig::default()
            },
            Arc::new(http),
        );
        let md = uploader
            .upload(&UploadRequest::new("cat.png", b"meow".to_vec()))
            .await
            .unwrap();
        assert_eq!(md, "![SMMS](https://s2.loli.net/cat.png)");
    }
}
