//! Alist backend.
//!
//! Alist answers most calls with HTTP 200 and a `{code, message, data}` envelope, and its
//! directory listings are cached: a file written through `/api/fs/form` is not resolvable
//! through `/api/fs/get` until the listing is refreshed. [`AlistClient`] therefore implements
//! all four protocol parts and is driven by [`ConsistentUploader`].

use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::artifact::RemotePath;
use crate::config::AlistConfig;
use crate::contract::{
    Credential, CredentialProvider, LinkResolver, RemoteFs, UploadRequest, UploadTransport,
};
use crate::error::{TransportError, UploadError};
use crate::multipart::MultipartBuilder;
use crate::orchestrator::{ConsistentUploader, DirectoryLayout};
use crate::retry::PollPolicy;
use crate::transport::{HttpRequest, HttpTransport};

/// Suffix appended to the password before hashing for `/api/auth/login/hash`.
pub const LOGIN_HASH_SALT: &str = "-qweqweqweqweqweqwe";

const SUCCESS_CODE: i64 = 200;

/// Characters left alone by JavaScript's `encodeURIComponent`, which Alist expects for the
/// `File-Path` header.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub type AlistUploader = ConsistentUploader<AlistClient, AlistClient, AlistClient, AlistClient>;

/// Builds the protocol-driven uploader for an Alist server.
pub fn alist_uploader(
    config: AlistConfig,
    http: Arc<dyn HttpTransport>,
    policy: PollPolicy,
) -> AlistUploader {
    let layout = DirectoryLayout {
        upload_dir: config.upload_path.clone(),
        read_dir: config.read_path.clone(),
    };
    let client = AlistClient::new(config, http);
    ConsistentUploader::new(
        client.clone(),
        client.clone(),
        client.clone(),
        client,
        layout,
    )
    .with_policy(policy)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct FsObject {
    #[serde(default)]
    raw_url: Option<String>,
}

/// HTTP client for one Alist server.
#[derive(Clone)]
pub struct AlistClient {
    config: Arc<AlistConfig>,
    http: Arc<dyn HttpTransport>,
}

impl AlistClient {
    pub fn new(config: AlistConfig, http: Arc<dyn HttpTransport>) -> Self {
        Self {
            config: Arc::new(config),
            http,
        }
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}{}", self.config.domain.trim_end_matches('/'), route)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        route: &str,
        payload: serde_json::Value,
        credential: Option<&Credential>,
    ) -> Result<(String, Envelope<T>), UploadError> {
        let url = self.endpoint(route);
        let mut request = HttpRequest::post_json(url.clone(), &payload)?;
        if let Some(credential) = credential {
            request = request.header("Authorization", credential.token.clone());
        }
        let body = self.http.send(request).await?;
        let envelope = parse_envelope(&url, &body)?;
        Ok((url, envelope))
    }
}

fn parse_envelope<T: DeserializeOwned>(url: &str, body: &str) -> Result<Envelope<T>, UploadError> {
    serde_json::from_str(body).map_err(|e| {
        error!(url = %url, error = %e, "Failed to parse Alist response");
        UploadError::InvalidResponse(format!("{url}: {e}"))
    })
}

/// Lowercase hex SHA-256 of `password` plus [`LOGIN_HASH_SALT`].
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(LOGIN_HASH_SALT.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl CredentialProvider for AlistClient {
    async fn get_token(&self) -> Result<Credential, UploadError> {
        let payload = json!({
            "username": self.config.username,
            "password": hash_password(&self.config.password),
        });
        let (url, envelope) = self
            .post_json::<LoginData>("/api/auth/login/hash", payload, None)
            .await
            .map_err(|e| {
                error!(error = %e, "Alist login request failed");
                UploadError::Auth(e.to_string())
            })?;

        let success = envelope.is_success();
        match envelope.data {
            Some(LoginData { token }) if success && !token.is_empty() => {
                debug!(url = %url, "Obtained Alist token");
                Ok(Credential::new(token, "alist"))
            }
            _ => {
                error!(code = envelope.code, message = %envelope.message, "Alist rejected login");
                Err(UploadError::Auth(format!(
                    "login rejected (code {}): {}",
                    envelope.code, envelope.message
                )))
            }
        }
    }
}

/// A concurrent create surfaces as "file exists" or "already exists"; "does not exist" is a
/// real failure.
fn is_already_exists(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("file exists") || message.contains("already exist")
}

#[async_trait]
impl RemoteFs for AlistClient {
    async fn exists(
        &self,
        dir: &RemotePath,
        credential: &Credential,
    ) -> Result<String, UploadError> {
        let payload = json!({ "path": dir.as_str() });
        let (_, envelope) = self
            .post_json::<serde_json::Value>("/api/fs/get", payload, Some(credential))
            .await?;
        debug!(dir = %dir, code = envelope.code, message = %envelope.message, "Probed directory");
        Ok(envelope.message)
    }

    async fn mkdir(&self, dir: &RemotePath, credential: &Credential) -> Result<(), UploadError> {
        let payload = json!({ "path": dir.as_str() });
        let (url, envelope) = self
            .post_json::<serde_json::Value>("/api/fs/mkdir", payload, Some(credential))
            .await?;
        if envelope.is_success() {
            info!(dir = %dir, "Created directory");
            return Ok(());
        }
        if is_already_exists(&envelope.message) {
            debug!(dir = %dir, message = %envelope.message, "Directory appeared concurrently");
            return Ok(());
        }
        Err(TransportError::Rejected {
            url,
            message: envelope.message,
        }
        .into())
    }

    async fn refresh(&self, dir: &RemotePath, credential: &Credential) -> Result<(), UploadError> {
        let payload = json!({
            "path": dir.as_str(),
            "page": 1,
            "password": "",
            "per_page": 0,
            "refresh": true,
        });
        let (url, envelope) = self
            .post_json::<serde_json::Value>("/api/fs/list", payload, Some(credential))
            .await?;
        if !envelope.is_success() {
            warn!(
                dir = %dir,
                code = envelope.code,
                message = %envelope.message,
                "Listing refresh rejected"
            );
            return Err(TransportError::Rejected {
                url,
                message: envelope.message,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl UploadTransport for AlistClient {
    async fn transfer(
        &self,
        request: &UploadRequest,
        target: &RemotePath,
        credential: &Credential,
    ) -> Result<(), UploadError> {
        let filename = target
            .as_str()
            .rsplit('/')
            .next()
            .unwrap_or(request.original_name());
        let form = MultipartBuilder::new()
            .add_file("file", filename, request.content_type(), request.bytes())
            .build();

        let url = self.endpoint("/api/fs/form");
        let http_request = HttpRequest::new(Method::PUT, url.clone())
            .header("Authorization", credential.token.clone())
            .header("Content-Type", form.content_type())
            .header(
                "File-Path",
                utf8_percent_encode(target.as_str(), URI_COMPONENT).to_string(),
            )
            .header("As-Task", "true")
            .body(form.bytes);

        let body = self.http.send(http_request).await?;
        let envelope: Envelope<serde_json::Value> = parse_envelope(&url, &body)?;
        if !envelope.is_success() {
            return Err(TransportError::Rejected {
                url,
                message: envelope.message,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl LinkResolver for AlistClient {
    async fn resolve(
        &self,
        path: &RemotePath,
        credential: &Credential,
    ) -> Result<String, UploadError> {
        let (_, envelope) = self
            .post_json::<FsObject>(
                "/api/fs/get",
                json!({ "path": path.as_str() }),
                Some(credential),
            )
            .await?;
        match envelope.data.and_then(|d| d.raw_url).filter(|u| !u.is_empty()) {
            Some(url) => Ok(url),
            None => Err(UploadError::NotFoundYet(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockHttpTransport;

    fn config() -> AlistConfig {
        AlistConfig {
            domain: "https://alist.example.com/".into(),
            username: "admin".into(),
            password: "secret".into(),
            upload_path: "img".into(),
            read_path: "img".into(),
        }
    }

    fn client(http: MockHttpTransport) -> AlistClient {
        AlistClient::new(config(), Arc::new(http))
    }

    #[test]
    fn password_hash_is_salted_sha256_hex() {
        let mut hasher = Sha256::new();
        hasher.update(b"secret-qweqweqweqweqweqwe");
        assert_eq!(hash_password("secret"), format!("{:x}", hasher.finalize()));
        assert_eq!(hash_password("secret").len(), 64);
    }

    #[tokio::test]
    async fn login_posts_hashed_password_and_reads_token() {
        let mut http = MockHttpTransport::new();
        http.expect_send()
            .withf(|req| {
                let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
                req.url == "https://alist.example.com/api/auth/login/hash"
                    && req.header_value("Authorization").is_none()
                    && body["username"] == "admin"
                    && body["password"] == hash_password("secret")
            })
            .times(1)
            .returning(|_| Ok(r#"{"code":200,"message":"success","data":{"token":"jwt"}}"#.into()));

        let credential = client(http).get_token().await.expect("login succeeds");
        assert_eq!(credential, Credential::new("jwt", "alist"));
    }

    #[tokio::test]
    async fn rejected_login_is_an_auth_error() {
        let mut http = MockHttpTransport::new();
        http.expect_send().returning(|_| {
            Ok(r#"{"code":400,"message":"password is incorrect","data":null}"#.into())
        });
        let err = client(http).get_token().await.expect_err("bad password");
        assert!(matches!(err, UploadError::Auth(ref m) if m.contains("password is incorrect")));
    }

    #[tokio::test]
    async fn unreachable_login_is_an_auth_error() {
        let mut http = MockHttpTransport::new();
        http.expect_send().returning(|req| {
            Err(TransportError::Network {
                url: req.url,
                message: "connection refused".into(),
            })
        });
        let err = client(http).get_token().await.expect_err("unreachable");
        assert!(matches!(err, UploadError::Auth(_)));
    }

    #[tokio::test]
    async fn mkdir_tolerates_an_existing_directory() {
        let mut http = MockHttpTransport::new();
        http.expect_send()
            .returning(|_| Ok(r#"{"code":500,"message":"file exists","data":null}"#.into()));
        client(http)
            .mkdir(&RemotePath::dir("img"), &Credential::new("t", "alist"))
            .await
            .expect("already-exists is benign");
    }

    #[tokio::test]
    async fn mkdir_surfaces_other_rejections() {
        let mut http = MockHttpTransport::new();
        http.expect_send()
            .returning(|_| Ok(r#"{"code":403,"message":"permission denied","data":null}"#.into()));
        let err = client(http)
            .mkdir(&RemotePath::dir("img"), &Credential::new("t", "alist"))
            .await
            .expect_err("forbidden");
        assert!(matches!(err, UploadError::Transport(TransportError::Rejected { .. })));
    }

    #[tokio::test]
    async fn mkdir_missing_parent_is_a_rejection() {
        for message in ["parent dir does not exist", "object not exist"] {
            let body = format!(r#"{{"code":500,"message":"{message}","data":null}}"#);
            let mut http = MockHttpTransport::new();
            http.expect_send().times(1).returning(move |_| Ok(body.clone()));
            let err = client(http)
                .mkdir(&RemotePath::dir("img/sub"), &Credential::new("t", "alist"))
                .await
                .expect_err("missing parent is not benign");
            match err {
                UploadError::Transport(TransportError::Rejected { message: rejected, .. }) => {
                    assert_eq!(rejected, message)
                }
                other => panic!("expected a rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn only_already_exists_messages_are_benign() {
        assert!(is_already_exists("file exists"));
        assert!(is_already_exists("Directory already exists"));
        assert!(!is_already_exists("parent dir does not exist"));
        assert!(!is_already_exists("object not exist"));
    }

    #[tokio::test]
    async fn transfer_sends_multipart_with_encoded_file_path() {
        let mut http = MockHttpTransport::new();
        http.expect_send()
            .withf(|req| {
                req.method == Method::PUT
                    && req.url == "https://alist.example.com/api/fs/form"
                    && req.header_value("Authorization") == Some("jwt")
                    && req.header_value("File-Path") == Some("%2Fimg%2Fmy%20shot_1.png")
                    && req.header_value("As-Task") == Some("true")
                    && req
                        .header_value("Content-Type")
                        .is_some_and(|v| v.starts_with("multipart/form-data; boundary="))
                    && req.body.windows(4).any(|w| w == [0x89, b'P', b'N', b'G'])
            })
            .times(1)
            .returning(|_| Ok(r#"{"code":200,"message":"success","data":null}"#.into()));

        let request = UploadRequest::new("my shot.png", vec![0x89, b'P', b'N', b'G']);
        client(http)
            .transfer(
                &request,
                &RemotePath::join("img", "my shot_1.png"),
                &Credential::new("jwt", "alist"),
            )
            .await
            .expect("transfer succeeds");
    }

    #[tokio::test]
    async fn resolve_without_raw_url_is_not_found_yet() {
        let mut http = MockHttpTransport::new();
        http.expect_send()
            .returning(|_| Ok(r#"{"code":500,"message":"object not found","data":null}"#.into()));
        let err = client(http)
            .resolve(&RemotePath::join("img", "a.png"), &Credential::new("t", "alist"))
            .await
            .expect_err("not yet listed");
        assert!(err.is_not_found_yet());
    }

    #[tokio::test]
    async fn resolve_returns_raw_url() {
        let mut http = MockHttpTransport::new();
        http.expect_send().returning(|_| {
            Ok(json!({
                "code": 200,
                "message": "success",
                "data": {"name": "a.png", "raw_url": "https://alist.example.com/d/img/a.png"}
            })
            .to_string())
        });
        let url = client(http)
            .resolve(&RemotePath::join("img", "a.png"), &Credential::new("t", "alist"))
            .await
            .unwrap();
        assert_eq!(url, "https://alist.example.com/d/img/a.png");
    }
}
