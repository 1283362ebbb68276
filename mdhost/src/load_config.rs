/// `load_config` module: loads a static YAML config and injects secrets from the environment.
///
/// This is the only place where user-supplied YAML is parsed into the core's [`Config`].
///
/// # Secrets
/// Credentials may live in the YAML file, but any of these variables, when set and non-empty,
/// take precedence:
/// - `MDHOST_ALIST_PASSWORD`
/// - `MDHOST_SMMS_TOKEN`
/// - `MDHOST_IMGUR_ACCESS_TOKEN`
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use mdhost_core::config::{BackendConfig, Config};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const ALIST_PASSWORD_ENV: &str = "MDHOST_ALIST_PASSWORD";
pub const SMMS_TOKEN_ENV: &str = "MDHOST_SMMS_TOKEN";
pub const IMGUR_ACCESS_TOKEN_ENV: &str = "MDHOST_IMGUR_ACCESS_TOKEN";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let mut config = parse_config(&config_content)
        .with_context(|| format!("Failed to parse config YAML {:?}", path_ref))?;
    inject_env_secrets(&mut config);
    check_backend(&config)?;
    info!(
        config_path = ?path_ref,
        backend = config.backend.name(),
        "Parsed config YAML successfully"
    );
    Ok(config)
}

pub fn parse_config(yaml: &str) -> Result<Config> {
    serde_yaml::from_str(yaml).map_err(|e| {
        error!(error = ?e, "Failed to parse config YAML");
        anyhow::anyhow!("{e}")
    })
}

/// Rejects configurations that would fail on every upload.
fn check_backend(config: &Config) -> Result<()> {
    if let BackendConfig::Imgur(imgur) = &config.backend {
        if imgur.anonymous && imgur.effective_client_id().is_none() {
            error!("Anonymous Imgur backend has no client id");
            anyhow::bail!(
                "anonymous Imgur uploads need `client_id` or `default_client_id` in the config"
            );
        }
    }
    Ok(())
}

fn env_secret(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn inject_env_secrets(config: &mut Config) {
    match &mut config.backend {
        BackendConfig::Alist(alist) => {
            if let Some(password) = env_secret(ALIST_PASSWORD_ENV) {
                info!(var = ALIST_PASSWORD_ENV, "Using Alist password from environment");
                alist.password = password;
            }
        }
        BackendConfig::Smms(smms) => {
            if let Some(token) = env_secret(SMMS_TOKEN_ENV) {
                info!(var = SMMS_TOKEN_ENV, "Using SM.MS token from environment");
                smms.token = token;
            }
        }
        BackendConfig::Imgur(imgur) => {
            if let Some(token) = env_secret(IMGUR_ACCESS_TOKEN_ENV) {
                info!(
                    var = IMGUR_ACCESS_TOKEN_ENV,
                    "Using Imgur access token from environment"
                );
                imgur.access_token = Some(token);
            }
        }
    }
}
