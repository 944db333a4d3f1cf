//! Client configuration.
//!
//! Loads from a TOML file with `$VAR` / `${VAR}` expansion in the raw text.
//!
//! ```toml
//! api_base_url = "https://api-prod.copus.network/copusV2"
//! request_timeout_secs = 30
//! accept_legacy_challenges = false
//! authorization_validity_secs = 3600
//!
//! [endpoints]
//! xlayer = "/client/payment/okx/getTargetUrl"
//! base-mainnet = "/client/payment/base/getTargetUrl"
//! base-sepolia = "$BASE_SEPOLIA_CHALLENGE_PATH"
//! ```
//!
//! # Environment Variables
//!
//! - `TREASURY_CONFIG` - Path to the configuration file (default: `treasury.toml`)
//! - `TREASURY_API_BASE_URL` - Overrides `api_base_url`

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use treasury402::networks::{BASE_MAINNET, BASE_SEPOLIA, NetworkId, XLAYER};
use url::Url;

use crate::constants::{
    BASE_CHALLENGE_PATH, DEFAULT_API_BASE_URL, DEFAULT_AUTHORIZATION_VALIDITY_SECS,
    DEFAULT_TIMEOUT_SECS, OKX_CHALLENGE_PATH,
};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "TREASURY_CONFIG";

/// Environment variable overriding the API base URL.
pub const API_BASE_URL_ENV: &str = "TREASURY_API_BASE_URL";

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "treasury.toml";

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ClientConfig`].
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
    /// A URL in the configuration does not parse.
    #[error("invalid URL {url}: {source}")]
    Url {
        /// The offending text.
        url: String,
        /// Underlying error.
        source: url::ParseError,
    },
    /// No challenge endpoint is configured for the network.
    #[error("no challenge endpoint configured for {0}")]
    NoEndpoint(NetworkId),
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Settings for the negotiation client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Resource server base URL; endpoint paths are appended to it verbatim.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: Url,

    /// Challenge endpoint path per network. Networks are served by
    /// different payment facilitators, hence different paths.
    #[serde(default = "default_endpoints")]
    pub endpoints: BTreeMap<NetworkId, String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Accept flat `{payTo, amount}` challenges and build the typed data
    /// locally. Off by default.
    #[serde(default)]
    pub accept_legacy_challenges: bool,

    /// Lifetime of a locally built authorization, in seconds.
    #[serde(default = "default_authorization_validity_secs")]
    pub authorization_validity_secs: u64,
}

fn default_api_base_url() -> Url {
    Url::parse(DEFAULT_API_BASE_URL).expect("default API base URL is valid")
}

fn default_endpoints() -> BTreeMap<NetworkId, String> {
    BTreeMap::from([
        (XLAYER, OKX_CHALLENGE_PATH.to_owned()),
        (BASE_MAINNET, BASE_CHALLENGE_PATH.to_owned()),
        (BASE_SEPOLIA, BASE_CHALLENGE_PATH.to_owned()),
    ])
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_authorization_validity_secs() -> u64 {
    DEFAULT_AUTHORIZATION_VALIDITY_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            endpoints: default_endpoints(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            accept_legacy_challenges: false,
            authorization_validity_secs: DEFAULT_AUTHORIZATION_VALIDITY_SECS,
        }
    }
}

impl ClientConfig {
    /// Defaults with a different base URL.
    #[must_use]
    pub fn with_base_url(api_base_url: Url) -> Self {
        Self {
            api_base_url,
            ..Self::default()
        }
    }

    /// Loads from `TREASURY_CONFIG`, falling back to `treasury.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
        Self::load_from(&path)
    }

    /// Loads from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or the
    /// base URL override is invalid.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        let mut config = Self::from_toml(&content)?;

        if let Ok(base) = std::env::var(API_BASE_URL_ENV) {
            config.api_base_url = Url::parse(&base).map_err(|source| ConfigError::Url {
                url: base.clone(),
                source,
            })?;
        }
        Ok(config)
    }

    /// Parses TOML text after environment expansion.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] on malformed input.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&expand_env_vars(content))?)
    }

    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Full challenge endpoint for `network`, without the query string.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NoEndpoint`] if the network has no endpoint
    /// - [`ConfigError::Url`] if the joined URL does not parse
    pub fn endpoint_url(&self, network: &NetworkId) -> Result<Url, ConfigError> {
        let path = self
            .endpoints
            .get(network)
            .ok_or_else(|| ConfigError::NoEndpoint(network.clone()))?;
        let joined = format!(
            "{}/{}",
            self.api_base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|source| ConfigError::Url {
            url: joined,
            source,
        })
    }
}

/// Expands `$VAR` and `${VAR}` from the environment. Unresolved variables
/// are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}
