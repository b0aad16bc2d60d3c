//! Startup configuration resolved from the environment.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crosspoint_core::model::PassingThreshold;
use storage::Namespace;
use thiserror::Error;
use url::Url;

pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_DB_URL: &str = "sqlite://crosspoint.sqlite3";
pub const DEFAULT_REVEAL_DELAY_MS: u64 = 1500;
pub const DEFAULT_FEED_LIMIT: usize = 50;
pub const MAX_FEED_LIMIT: usize = 500;

/// Required identity-provider settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ApiKey,
    AuthDomain,
    ProjectId,
    StorageBucket,
    MessagingSenderId,
    AppId,
}

impl ConfigKey {
    pub const REQUIRED: [ConfigKey; 6] = [
        ConfigKey::ApiKey,
        ConfigKey::AuthDomain,
        ConfigKey::ProjectId,
        ConfigKey::StorageBucket,
        ConfigKey::MessagingSenderId,
        ConfigKey::AppId,
    ];

    #[must_use]
    pub fn env_var(self) -> &'static str {
        match self {
            ConfigKey::ApiKey => "CROSSPOINT_API_KEY",
            ConfigKey::AuthDomain => "CROSSPOINT_AUTH_DOMAIN",
            ConfigKey::ProjectId => "CROSSPOINT_PROJECT_ID",
            ConfigKey::StorageBucket => "CROSSPOINT_STORAGE_BUCKET",
            ConfigKey::MessagingSenderId => "CROSSPOINT_MESSAGING_SENDER_ID",
            ConfigKey::AppId => "CROSSPOINT_APP_ID",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.env_var())
    }
}

const NAMESPACE_VAR: &str = "CROSSPOINT_NAMESPACE";
const TOKEN_VAR: &str = "CROSSPOINT_AUTH_TOKEN";
const ENDPOINT_VAR: &str = "CROSSPOINT_IDENTITY_ENDPOINT";
const THRESHOLD_VAR: &str = "CROSSPOINT_PASSING_THRESHOLD";
const REVEAL_DELAY_VAR: &str = "CROSSPOINT_REVEAL_DELAY_MS";
const FEED_LIMIT_VAR: &str = "CROSSPOINT_FEED_LIMIT";
const DB_URL_VAR: &str = "CROSSPOINT_DB_URL";
const QUIZ_BANK_VAR: &str = "CROSSPOINT_QUIZ_BANK";
const LOG_VAR: &str = "RUST_LOG";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("missing required setting(s): {}", join_keys(.0))]
    Missing(Vec<ConfigKey>),
    #[error("CROSSPOINT_PASSING_THRESHOLD must be a number between 0.0 and 1.0, got {raw:?}")]
    InvalidThreshold { raw: String },
    #[error("{key} must be a whole number in range, got {raw:?}")]
    InvalidNumber { key: &'static str, raw: String },
    #[error("CROSSPOINT_IDENTITY_ENDPOINT is not a valid http(s) URL: {raw:?}")]
    InvalidEndpoint { raw: String },
    #[error("CROSSPOINT_NAMESPACE is invalid: {reason}")]
    InvalidNamespace { reason: String },
}

fn join_keys(keys: &[ConfigKey]) -> String {
    keys.iter()
        .map(|k| k.env_var())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Key material for the identity provider project.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderKeys {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

impl fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderKeys")
            .field("api_key", &"<redacted>")
            .field("auth_domain", &self.auth_domain)
            .field("project_id", &self.project_id)
            .field("storage_bucket", &self.storage_bucket)
            .field("messaging_sender_id", &self.messaging_sender_id)
            .field("app_id", &self.app_id)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub provider: ProviderKeys,
    pub namespace: Namespace,
    pub initial_token: Option<String>,
    pub identity_endpoint: Url,
    pub passing_threshold: PassingThreshold,
    pub reveal_delay: Duration,
    pub feed_limit: usize,
    pub db_url: String,
    pub quiz_bank_path: Option<PathBuf>,
    pub log_filter: String,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("namespace", &self.namespace)
            .field("initial_token", &self.initial_token.as_ref().map(|_| "<redacted>"))
            .field("identity_endpoint", &self.identity_endpoint.as_str())
            .field("passing_threshold", &self.passing_threshold.ratio())
            .field("reveal_delay", &self.reveal_delay)
            .field("feed_limit", &self.feed_limit)
            .field("db_url", &self.db_url)
            .field("quiz_bank_path", &self.quiz_bank_path)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

impl AppConfig {
    /// Load `.env` (if present) and resolve settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required settings are missing or an optional
    /// one is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through `lookup`. Blank values count as absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` listing every absent required key, or a
    /// specific error for the first malformed optional value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut missing = Vec::new();
        let mut required = |key: ConfigKey| {
            get(key.env_var()).unwrap_or_else(|| {
                missing.push(key);
                String::new()
            })
        };
        let provider = ProviderKeys {
            api_key: required(ConfigKey::ApiKey),
            auth_domain: required(ConfigKey::AuthDomain),
            project_id: required(ConfigKey::ProjectId),
            storage_bucket: required(ConfigKey::StorageBucket),
            messaging_sender_id: required(ConfigKey::MessagingSenderId),
            app_id: required(ConfigKey::AppId),
        };
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let namespace = match get(NAMESPACE_VAR) {
            Some(raw) => Namespace::new(raw).map_err(|e| ConfigError::InvalidNamespace {
                reason: e.to_string(),
            })?,
            None => Namespace::default(),
        };

        let identity_endpoint = parse_endpoint(
            get(ENDPOINT_VAR)
                .as_deref()
                .unwrap_or(DEFAULT_IDENTITY_ENDPOINT),
        )?;

        let passing_threshold = match get(THRESHOLD_VAR) {
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .and_then(|v| PassingThreshold::new(v).ok())
                .ok_or(ConfigError::InvalidThreshold { raw })?,
            None => PassingThreshold::default(),
        };

        let reveal_delay_ms = match get(REVEAL_DELAY_VAR) {
            Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                key: REVEAL_DELAY_VAR,
                raw,
            })?,
            None => DEFAULT_REVEAL_DELAY_MS,
        };

        let feed_limit = match get(FEED_LIMIT_VAR) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=MAX_FEED_LIMIT).contains(n))
                .ok_or(ConfigError::InvalidNumber {
                    key: FEED_LIMIT_VAR,
                    raw,
                })?,
            None => DEFAULT_FEED_LIMIT,
        };

        Ok(Self {
            provider,
            namespace,
            initial_token: get(TOKEN_VAR),
            identity_endpoint,
            passing_threshold,
            reveal_delay: Duration::from_millis(reveal_delay_ms),
            feed_limit,
            db_url: get(DB_URL_VAR).unwrap_or_else(|| DEFAULT_DB_URL.to_string()),
            quiz_bank_path: get(QUIZ_BANK_VAR).map(PathBuf::from),
            log_filter: get(LOG_VAR).unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidEndpoint {
        raw: raw.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEndpoint {
            raw: raw.to_string(),
        });
    }
    Ok(url)
}
