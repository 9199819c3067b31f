//! Configuration types for echoip
//!
//! This module defines all configuration structures used throughout the crate.

use crate::provider::AgreementPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main echoip configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoIpConfig {
    /// Seconds a fetched result stays valid (0 disables caching)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Number of sources that must report the same address
    ///
    /// When unset (or 1) a single-source provider is used.
    #[serde(default)]
    pub min_source_agreement: Option<usize>,

    /// How strictly the agreement threshold is applied
    #[serde(default)]
    pub agreement_policy: AgreementPolicy,

    /// Whether the built-in echo services are registered
    #[serde(default = "default_use_builtins")]
    pub use_builtins: bool,

    /// Additional sources to register
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Only build sources of these types (empty = all)
    #[serde(default)]
    pub source_types: Vec<String>,

    /// Maximum number of sources handed to the provider
    #[serde(default)]
    pub max_sources: Option<usize>,

    /// HTTP client settings shared by all HTTP sources
    #[serde(default)]
    pub http: HttpConfig,
}

impl EchoIpConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            min_source_agreement: None,
            agreement_policy: AgreementPolicy::default(),
            use_builtins: default_use_builtins(),
            sources: Vec::new(),
            source_types: Vec::new(),
            max_sources: None,
            http: HttpConfig::default(),
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Cache TTL as a duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Whether a multisource provider should be built
    pub fn wants_consensus(&self) -> bool {
        self.min_source_agreement.is_some_and(|n| n > 1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.use_builtins && self.sources.is_empty() {
            return Err(crate::Error::config(
                "No sources configured and built-in sources are disabled",
            ));
        }

        if self.min_source_agreement == Some(0) {
            return Err(crate::Error::config("min_source_agreement must be > 0"));
        }

        if self.max_sources == Some(0) {
            return Err(crate::Error::config("max_sources must be > 0"));
        }

        if let (Some(min), Some(max)) = (self.min_source_agreement, self.max_sources)
            && max < min
        {
            return Err(crate::Error::config(format!(
                "max_sources ({max}) is below min_source_agreement ({min})"
            )));
        }

        self.http.validate()?;

        for source in &self.sources {
            source.validate()?;
        }

        Ok(())
    }
}

impl Default for EchoIpConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Service answering with the bare address as plain text
    Simple {
        /// URL to fetch the address from
        url: String,
    },

    /// Service answering with a JSON object
    Json {
        /// URL to fetch the document from
        url: String,
        /// Key holding the address
        ip_key: String,
    },

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Plain-text source for `url`
    pub fn simple(url: impl Into<String>) -> Self {
        SourceConfig::Simple { url: url.into() }
    }

    /// JSON source for `url`, reading the address from `ip_key`
    pub fn json(url: impl Into<String>, ip_key: impl Into<String>) -> Self {
        SourceConfig::Json {
            url: url.into(),
            ip_key: ip_key.into(),
        }
    }

    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Simple { url } => validate_url(url),
            SourceConfig::Json { url, ip_key } => {
                validate_url(url)?;
                if ip_key.is_empty() {
                    return Err(crate::Error::invalid_source(format!(
                        "JSON source {url} needs a non-empty ip_key"
                    )));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::invalid_source(
                        "Custom source factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::invalid_source(
                        "Custom source config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Simple { .. } => "simple",
            SourceConfig::Json { .. } => "json",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

fn validate_url(url: &str) -> Result<(), crate::Error> {
    if url.is_empty() {
        return Err(crate::Error::invalid_source("Source URL cannot be empty"));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(crate::Error::invalid_source(format!(
            "Source URL must use HTTP or HTTPS scheme. Got: {url}"
        )));
    }
    Ok(())
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl HttpConfig {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the HTTP settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("HTTP timeout must be > 0"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(crate::Error::config("HTTP user agent cannot be empty"));
        }
        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_use_builtins() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("echoip/{}", env!("CARGO_PKG_VERSION"))
}
