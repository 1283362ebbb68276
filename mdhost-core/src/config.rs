use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::retry::PollPolicy;

/// Everything needed to build an uploader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            backend = self.backend.name(),
            max_attempts = self.poll.max_attempts,
            settle_delay_ms = self.poll.settle_delay_ms,
            retry_delay_ms = self.poll.retry_delay_ms,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

/// Selects the hosting backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Alist(AlistConfig),
    Smms(SmmsConfig),
    Imgur(ImgurConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Alist(_) => "alist",
            BackendConfig::Smms(_) => "smms",
            BackendConfig::Imgur(_) => "imgur",
        }
    }
}

/// Alist server. All values are plain strings; empty directories mean the root.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlistConfig {
    /// Base URL, e.g. `https://alist.example.com`.
    pub domain: String,
    pub username: String,
    pub password: String,
    /// Directory files are written to.
    pub upload_path: String,
    /// Directory links are resolved from.
    pub read_path: String,
}

impl fmt::Debug for AlistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlistConfig")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("upload_path", &self.upload_path)
            .field("read_path", &self.read_path)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmmsConfig {
    pub endpoint: String,
    pub token: String,
}

impl Default for SmmsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://sm.ms".to_owned(),
            token: String::new(),
        }
    }
}

impl fmt::Debug for SmmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmmsConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &redacted(&self.token))
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImgurConfig {
    pub endpoint: String,
    /// Upload with a client id instead of a signed-in user's access token.
    pub anonymous: bool,
    pub client_id: String,
    /// Used when `client_id` is empty.
    pub default_client_id: String,
    /// Access token for authenticated uploads, usually injected from the environment.
    pub access_token: Option<String>,
}

impl ImgurConfig {
    /// The id sent as `Client-ID` in anonymous mode: `client_id`, else `default_client_id`.
    ///
    /// No id is compiled in, so anonymous uploads need at least one of the two set.
    pub fn effective_client_id(&self) -> Option<&str> {
        [self.client_id.as_str(), self.default_client_id.as_str()]
            .into_iter()
            .find(|id| !id.is_empty())
    }
}

impl Default for ImgurConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.imgur.com".to_owned(),
            anonymous: true,
            client_id: String::new(),
            default_client_id: String::new(),
            access_token: None,
        }
    }
}

impl fmt::Debug for ImgurConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImgurConfig")
            .field("endpoint", &self.endpoint)
            .field("anonymous", &self.anonymous)
            .field("client_id", &self.client_id)
            .field("default_client_id", &self.default_client_id)
            .field("access_token", &self.access_token.as_deref().map(redacted))
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "***"
    }
}

/// YAML-facing form of [`PollPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub settle_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            settle_delay_ms: policy.settle_delay.as_millis() as u64,
            retry_delay_ms: policy.retry_delay.as_millis() as u64,
            backoff_multiplier: policy.multiplier,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl From<&PollSettings> for PollPolicy {
    fn from(s: &PollSettings) -> Self {
        PollPolicy {
            max_attempts: s.max_attempts.max(1),
            settle_delay: Duration::from_millis(s.settle_delay_ms),
            retry_delay: Duration::from_millis(s.retry_delay_ms),
            multiplier: s.backoff_multiplier,
            max_delay: Duration::from_millis(s.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}
