//! Configuration management for the webhook receiver.
//!
//! All configuration is driven by environment variables. [`WebhookConfig::from_lookup`]
//! takes the variable source as a closure so it can be exercised without touching
//! the process environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MessageBirdError, MessageBirdResult};
use crate::types::SigningKey;

/// Which signature scheme inbound webhooks are verified with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    /// `MessageBird-Signature-JWT` header carrying a signed JWT.
    #[default]
    Jwt,
    /// `MessageBird-Request-Timestamp` + `MessageBird-Signature` HMAC headers.
    Legacy,
}

impl SignatureMode {
    /// The mode name as used in configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for SignatureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureMode {
    type Err = MessageBirdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwt" => Ok(Self::Jwt),
            "legacy" | "hmac" => Ok(Self::Legacy),
            other => Err(MessageBirdError::Config(format!(
                "unknown signature mode: {other} (expected `jwt` or `legacy`)"
            ))),
        }
    }
}

/// Configuration for a webhook receiving endpoint.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Bind address for the HTTP listener.
    pub listen: String,
    /// Key used to verify request signatures.
    pub signing_key: SigningKey,
    /// Signature scheme to enforce.
    pub mode: SignatureMode,
    /// Public base URL the webhook is registered under. Empty disables URL binding.
    pub base_url: String,
    /// Maximum age of a legacy request timestamp.
    pub max_validity: Option<Duration>,
    /// Log level filter.
    pub log_level: String,
}

impl WebhookConfig {
    /// Default bind address.
    pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

    /// Create a configuration with defaults for everything but the key.
    #[must_use]
    pub fn new(signing_key: impl Into<SigningKey>) -> Self {
        Self {
            listen: Self::DEFAULT_LISTEN.to_owned(),
            signing_key: signing_key.into(),
            mode: SignatureMode::default(),
            base_url: String::new(),
            max_validity: None,
            log_level: "info".to_owned(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> MessageBirdResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// `MESSAGEBIRD_SIGNING_KEY` is required; everything else has a default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MessageBirdResult<Self> {
        let signing_key = lookup("MESSAGEBIRD_SIGNING_KEY")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                MessageBirdError::Config("MESSAGEBIRD_SIGNING_KEY must be set".to_owned())
            })?;

        let mut config = Self::new(signing_key);

        if let Some(v) = lookup("WEBHOOK_LISTEN") {
            config.listen = v;
        }
        if let Some(v) = lookup("MESSAGEBIRD_SIGNATURE_MODE") {
            config.mode = v.parse()?;
        }
        if let Some(v) = lookup("MESSAGEBIRD_WEBHOOK_BASE_URL") {
            config.base_url = v.trim().to_owned();
        }
        if let Some(v) = lookup("MESSAGEBIRD_MAX_VALIDITY_HOURS") {
            let hours: u64 = v.trim().parse().map_err(|_| {
                MessageBirdError::Config(format!(
                    "MESSAGEBIRD_MAX_VALIDITY_HOURS must be a whole number of hours, got {v}"
                ))
            })?;
            config.max_validity = Some(Duration::from_secs(hours.saturating_mul(3600)));
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        Ok(config)
    }
}
