//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use magline_core::{Backoff, HttpConfig, RetryPolicy, retry_always, retry_transient};
use magline_mag::config::DEFAULT_PAGE_SIZE;
use magline_mag::expr::DEFAULT_MAX_EXPRESSION_LEN;
use magline_mag::{FieldRemap, HarvestConfig};

/// Environment variable consulted when no key is configured
pub const KEY_ENV_VAR: &str = "MAG_SUBSCRIPTION_KEY";

/// Global configuration for magline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub mag: MagConfig,
    pub http: HttpSettings,
    pub harvest: HarvestSettings,
    pub output: OutputConfig,
    pub remap: RemapConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MagConfig {
    pub endpoint: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub subscription_key: Option<String>,
}

impl Default for MagConfig {
    fn default() -> Self {
        Self {
            endpoint: magline_core::DEFAULT_ENDPOINT.to_string(),
            subscription_key: std::env::var(KEY_ENV_VAR).ok(),
        }
    }
}

/// Which failures are worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// Every failure, client errors included
    Always,
    /// Transport errors, timeouts, 5xx, 408 and 429 only
    Transient,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Total request timeout in seconds
    pub timeout: u64,
    pub connect_timeout: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter: bool,
    pub retry: RetryMode,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            timeout: 60,
            connect_timeout: 30,
            max_attempts: RetryPolicy::default().max_attempts,
            backoff_base_ms: backoff.base.as_millis() as u64,
            backoff_max_ms: backoff.max.as_millis() as u64,
            jitter: backoff.jitter,
            retry: RetryMode::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    pub max_expression_len: usize,
    pub page_size: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            max_expression_len: DEFAULT_MAX_EXPRESSION_LEN,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("./data"),
        }
    }
}

/// Per-entity field remapping, replacing the built-in tables when given
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemapConfig {
    pub fields_of_study: FieldRemap,
    pub papers: FieldRemap,
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            fields_of_study: FieldRemap::fields_of_study(),
            papers: FieldRemap::papers(),
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./magline.toml (current directory)
    /// 2. ~/.config/magline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("magline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "magline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            endpoint: self.mag.endpoint.clone(),
            timeout: Duration::from_secs(self.http.timeout),
            connect_timeout: Duration::from_secs(self.http.connect_timeout),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.http.max_attempts,
            backoff: Backoff {
                base: Duration::from_millis(self.http.backoff_base_ms),
                max: Duration::from_millis(self.http.backoff_max_ms),
                jitter: self.http.jitter,
            },
            predicate: match self.http.retry {
                RetryMode::Always => retry_always,
                RetryMode::Transient => retry_transient,
            },
        }
    }

    /// Harvest settings with an optional per-expression result limit
    pub fn harvest_config(&self, result_limit: Option<usize>) -> HarvestConfig {
        HarvestConfig {
            max_expression_len: self.harvest.max_expression_len,
            page_size: self.harvest.page_size,
            result_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.mag.endpoint, magline_core::DEFAULT_ENDPOINT);
        assert_eq!(config.http.max_attempts, 10);
        assert_eq!(config.http.retry, RetryMode::Always);
        assert_eq!(config.harvest.max_expression_len, 16_000);
        assert_eq!(config.harvest.page_size, 1_000);
        assert_eq!(config.remap.fields_of_study, FieldRemap::fields_of_study());
        assert_eq!(config.remap.papers, FieldRemap::papers());
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("MAGLINE_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${MAGLINE_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("MAGLINE_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[mag]
subscription_key = "abc123"

[http]
timeout = 5
max_attempts = 3
retry = "transient"

[harvest]
page_size = 250

[remap.fields_of_study]
drop = ["logprob", "prob"]
rename = [{ code = "Id", name = "fos_id" }]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.mag.subscription_key.as_deref(), Some("abc123"));
        assert_eq!(config.http.timeout, 5);
        assert_eq!(config.http.connect_timeout, 30);
        assert_eq!(config.harvest.page_size, 250);
        assert_eq!(config.harvest.max_expression_len, 16_000);
        assert_eq!(config.remap.fields_of_study.rename.len(), 1);
        assert!(config.remap.fields_of_study.compact.is_empty());
        // Untouched tables keep their presets
        assert_eq!(config.remap.papers, FieldRemap::papers());

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert!(!(policy.predicate)(magline_core::FailureKind::ClientStatus(400)));
        assert_eq!(config.http_config().timeout, Duration::from_secs(5));
    }

    #[test]
    fn harvest_config_carries_limit() {
        let config = Config::default();
        let harvest = config.harvest_config(Some(50));
        assert_eq!(harvest.result_limit, Some(50));
        assert_eq!(harvest.page_size, 1_000);
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[output]\ndefault_dir = \"/tmp/mag\"").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.output.default_dir, PathBuf::from("/tmp/mag"));
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http]\ntimeout = \"soon\"").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
