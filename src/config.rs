//! Configuration types for api-harvest

use crate::error::{Error, Result};
use crate::types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a batch of requests is issued
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// All requests of a batch in flight at once (optionally capped)
    #[default]
    Concurrent,
    /// One request at a time, in input order
    Sequential,
}

/// Where identifiers of failed requests are written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureFileMode {
    /// One `failures.url` per run: truncated when the run starts, appended by every kind
    #[default]
    Shared,
    /// One `<kind>.failures.url` per resource kind, truncated when that kind starts
    PerResource,
}

/// Request behavior (concurrency, timeouts, decoding)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Concurrent or sequential fetching (default: concurrent)
    #[serde(default)]
    pub mode: FetchMode,

    /// Upper bound on requests in flight (None = the whole batch)
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Treat a response whose Content-Type is not JSON as undecodable (default: true)
    #[serde(default = "default_true")]
    pub require_json_content_type: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::default(),
            max_concurrent: None,
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            require_json_content_type: true,
        }
    }
}

/// Main configuration for a harvest run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// File holding the bearer token on a single line (default: "token/token.txt")
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// Header the token is sent in (default: "Token")
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Base URL that relation templates are joined to
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Directory with `<kind>.url` identifier lists and failure lists (default: "urls")
    #[serde(default = "default_url_dir")]
    pub url_dir: PathBuf,

    /// Directory receiving `<kind>.csv` (default: "output")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Resource kinds to harvest, in chain order (default: all)
    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceKind>,

    /// Request behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Failure list convention
    #[serde(default)]
    pub failures: FailureFileMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
            token_header: default_token_header(),
            api_base: default_api_base(),
            url_dir: default_url_dir(),
            output_dir: default_output_dir(),
            resources: default_resources(),
            fetch: FetchConfig::default(),
            failures: FailureFileMode::default(),
        }
    }
}

impl Config {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read config file {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.token_header.trim().is_empty() {
            return Err(Error::config("token header name is empty", "token_header"));
        }
        if reqwest::header::HeaderName::from_bytes(self.token_header.as_bytes()).is_err() {
            return Err(Error::config(
                format!("'{}' is not a valid header name", self.token_header),
                "token_header",
            ));
        }
        if let Err(e) = url::Url::parse(&self.api_base) {
            return Err(Error::config(
                format!("api_base '{}' is not a URL: {}", self.api_base, e),
                "api_base",
            ));
        }
        if self.fetch.max_concurrent == Some(0) {
            return Err(Error::config(
                "max_concurrent must be at least 1",
                "fetch.max_concurrent",
            ));
        }
        if self.fetch.request_timeout.is_zero() {
            return Err(Error::config(
                "request_timeout must be positive",
                "fetch.request_timeout",
            ));
        }
        if self.resources.is_empty() {
            return Err(Error::config("no resources selected", "resources"));
        }
        if self
            .resources
            .windows(2)
            .any(|pair| pair[0].position() >= pair[1].position())
        {
            return Err(Error::config(
                "resources must be distinct and in chain order (projects, experiments, stats, variations)",
                "resources",
            ));
        }
        Ok(())
    }

    /// Identifier list for `kind`
    pub fn url_file(&self, kind: ResourceKind) -> PathBuf {
        self.url_dir.join(format!("{}.url", kind))
    }

    /// CSV output for `kind`
    pub fn csv_file(&self, kind: ResourceKind) -> PathBuf {
        self.output_dir.join(format!("{}.csv", kind))
    }

    /// Failure list receiving `kind`'s failures under the configured convention
    pub fn failure_file(&self, kind: ResourceKind) -> PathBuf {
        match self.failures {
            FailureFileMode::Shared => self.url_dir.join("failures.url"),
            FailureFileMode::PerResource => self.url_dir.join(format!("{}.failures.url", kind)),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("api-harvest/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token/token.txt")
}

fn default_token_header() -> String {
    "Token".to_string()
}

fn default_api_base() -> String {
    "https://www.optimizelyapis.com/".to_string()
}

fn default_url_dir() -> PathBuf {
    PathBuf::from("urls")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_resources() -> Vec<ResourceKind> {
    ResourceKind::CHAIN.to_vec()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
