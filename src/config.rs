//! Settings for the feed client, read from ~/.config/rentfeed/config.toml.
//!
//! Every key is optional and a missing or blank file means defaults. Keys we
//! don't recognise are logged and otherwise ignored.
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// How the unread badge follows confirmed mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterPolicy {
    /// Apply the mutation's delta locally; resync on the next refresh.
    #[default]
    Incremental,
    /// Apply the delta and immediately pull the authoritative count too.
    Refresh,
}

/// Client settings. Absent keys take their [`Default`] value; `Debug`
/// masks `auth_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend root, e.g. "https://api.example.com/v1".
    pub base_url: String,

    /// Rows per feed page.
    pub page_size: u32,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    pub counter_policy: CounterPolicy,

    /// Upper bound on a single response body.
    pub max_response_bytes: usize,

    /// Session token. RENTFEED_TOKEN overrides it.
    pub auth_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            page_size: 10,
            request_timeout_secs: 30,
            counter_policy: CounterPolicy::Incremental,
            max_response_bytes: 2 * 1024 * 1024,
            auth_token: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("counter_policy", &self.counter_policy)
            .field("max_response_bytes", &self.max_response_bytes)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

const KNOWN_KEYS: [&str; 6] = [
    "base_url",
    "page_size",
    "request_timeout_secs",
    "counter_policy",
    "max_response_bytes",
    "auth_token",
];

impl Config {
    /// Largest config file we will read (1 MiB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Read and validate the file at `path`.
    ///
    /// Returns defaults when the file is absent or blank. Bad TOML is a
    /// `Parse` error, out-of-range values are `Invalid`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = read_capped(path, Self::MAX_FILE_SIZE)? else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        };
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Blank config file, using defaults");
            return Ok(Self::default());
        }

        if let Ok(table) = content.parse::<toml::Table>() {
            table
                .keys()
                .filter(|key| !KNOWN_KEYS.contains(&key.as_str()))
                .for_each(|key| tracing::warn!(key = %key, "Ignoring unknown config key"));
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            base_url = %config.base_url,
            page_size = config.page_size,
            counter_policy = ?config.counter_policy,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > Self::MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "page_size must be between 1 and {}, got {}",
                Self::MAX_PAGE_SIZE,
                self.page_size
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Read at most `limit` bytes of `path`. `None` if the file does not exist.
fn read_capped(path: &Path, limit: u64) -> Result<Option<String>, ConfigError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.take(limit + 1).read_to_string(&mut content)?;
    if content.len() as u64 > limit {
        return Err(ConfigError::TooLarge(format!(
            "{} is over {} bytes",
            path.display(),
            limit
        )));
    }
    Ok(Some(content))
}

// ============================================================================
// Tests
// ============================================================================
