//! Configuration management
//!
//! Configuration is loaded in this order, later sources winning:
//! 1. Default values
//! 2. `contacts-bridge.toml` (if present)
//! 3. Environment variables
//!
//! Inside the configuration file `${VAR_NAME}` is expanded from the environment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::ContactProperties;
use crate::{Error, Result};

/// Default configuration file name
pub const CONFIG_FILE: &str = "contacts-bridge.toml";

/// What a detailed session does when its journal token is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenLossPolicy {
    /// Report every current contact as updated and rebase the token.
    ///
    /// Contacts deleted while the history was lost are not in the snapshot,
    /// so no `removed` event is ever reported for them.
    #[default]
    Resync,
    /// Rebase the token without emitting anything
    Rebase,
    /// Switch the session to fingerprint diffing for good
    Fingerprint,
}

impl TokenLossPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "resync" => Some(Self::Resync),
            "rebase" => Some(Self::Rebase),
            "fingerprint" => Some(Self::Fingerprint),
            _ => None,
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Quiet period before a burst of change signals is processed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Use the store's change journal when it is available
    #[serde(default = "default_prefer_journal")]
    pub prefer_journal: bool,

    /// Recovery when a journal token is rejected
    #[serde(default)]
    pub token_loss: TokenLossPolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            prefer_journal: default_prefer_journal(),
            token_loss: TokenLossPolicy::default(),
        }
    }
}

/// Which contact fields feed the structural fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintPolicy {
    /// Hash the thumbnail bytes as well
    #[serde(default = "default_include_thumbnail")]
    pub include_thumbnail: bool,
}

impl FingerprintPolicy {
    /// Properties a fingerprint snapshot has to load
    pub fn properties(&self) -> ContactProperties {
        ContactProperties::detailed(self.include_thumbnail)
    }
}

impl Default for FingerprintPolicy {
    fn default() -> Self {
        Self {
            include_thumbnail: default_include_thumbnail(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub fingerprint: FingerprintPolicy,

    /// Default log directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            fingerprint: FingerprintPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_prefer_journal() -> bool {
    true
}

fn default_include_thumbnail() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Explicit true/false spellings only; anything else is ignored
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Expand `${VAR_NAME}` using `lookup`. Unknown variables expand to "".
    fn expand_vars<F>(value: &str, lookup: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Some(value) = lookup(&var_name) {
                    result.push_str(&value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Parse TOML text, expanding variables and applying overrides from `lookup`
    pub fn from_toml_str_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = Self::expand_vars(content, &lookup);
        let mut config: Config = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str_with(&content, |key| std::env::var(key).ok())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load `contacts-bridge.toml` from the working directory if present,
    /// otherwise fall back to the environment
    pub fn load() -> Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }
        Self::from_env()
    }

    /// Apply `CONTACTS_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = lookup("CONTACTS_DEBOUNCE_MS").and_then(|v| v.trim().parse().ok()) {
            self.listener.debounce_ms = ms;
        }
        if let Some(prefer) = lookup("CONTACTS_PREFER_JOURNAL").and_then(|v| parse_bool(&v)) {
            self.listener.prefer_journal = prefer;
        }
        if let Some(policy) = lookup("CONTACTS_TOKEN_LOSS").and_then(|v| TokenLossPolicy::parse(&v)) {
            self.listener.token_loss = policy;
        }
        if let Some(include) =
            lookup("CONTACTS_FINGERPRINT_THUMBNAIL").and_then(|v| parse_bool(&v))
        {
            self.fingerprint.include_thumbnail = include;
        }
        if let Some(level) = lookup("CONTACTS_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.log_level = level;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.listener.debounce_ms == 0 {
            return Err(Error::Config(
                "listener.debounce_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
