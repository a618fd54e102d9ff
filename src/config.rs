//! Configuration loader and validator for the catalog↔CMS mirror.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly. Constructed
/// once at process start and passed in; nothing reads it from global state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub cms: Cms,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Tie tolerance for direction resolution, in seconds. Two timestamps
    /// within this window count as equal, so clock skew between the stores
    /// cannot cause push/pull oscillation. Default in `example()` is 5.
    pub tolerance_seconds: u64,
    /// Total attempts for each mirror/primary write (first try included).
    pub retry_attempts: u32,
    /// Backoff starts here and doubles per failed attempt.
    pub retry_base_ms: u64,
}

/// Mirror CMS API settings and collection mappings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cms {
    pub base_url: String,
    pub token: String,
    /// Shared secret expected on inbound webhook events. Optional; when unset
    /// events are accepted without a signature check.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    pub collections: Collections,
}

/// Mirror collection identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collections {
    pub modules: String,
    pub categories: String,
    pub tags: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.retry_attempts == 0 {
        return Err(ConfigError::Invalid("app.retry_attempts must be > 0"));
    }
    // tolerance_seconds may legitimately be 0 (exact-timestamp comparison),
    // but anything past a day is a typo, not a clock-skew allowance.
    if cfg.app.tolerance_seconds > 86_400 {
        return Err(ConfigError::Invalid(
            "app.tolerance_seconds must be <= 86400",
        ));
    }

    if cfg.cms.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("cms.base_url must be non-empty"));
    }
    if cfg.cms.token.trim().is_empty() {
        return Err(ConfigError::Invalid("cms.token must be non-empty"));
    }

    let colls = &cfg.cms.collections;
    if colls.modules.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "cms.collections.modules must be non-empty",
        ));
    }
    if colls.categories.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "cms.collections.categories must be non-empty",
        ));
    }
    if colls.tags.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "cms.collections.tags must be non-empty",
        ));
    }

    Ok(())
}

/// Canonical example config, also emitted by `catalog-mirror init-config`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  # Direction-resolution tie tolerance. Timestamps within this many seconds
  # count as equal; absorbs clock skew between the two stores.
  tolerance_seconds: 5
  retry_attempts: 3
  retry_base_ms: 500

cms:
  base_url: "https://cms.example.com/"
  token: "YOUR_CMS_API_TOKEN"
  # Optional shared secret for inbound webhook events.
  webhook_secret: "YOUR_WEBHOOK_SECRET"

  collections:
    modules: "coll-modules"
    categories: "coll-categories"
    tags: "coll-tags"
"#
}
