//! Configuration loading for the Byline client.
//!
//! Sectioned TOML. Tuning knobs carry serde defaults; only
//! `api.base_url` and `theme.state_path` must be present.

use std::path::{Path, PathBuf};
use std::time::Duration;

use byline_cache::CacheConfig;
use byline_gateway::GatewayConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheTuning,
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Backend origin, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// JWT access token. Absent means unauthenticated reads only.
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheTuning {
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
    #[serde(default = "default_evict_secs")]
    pub evict_secs: u64,
}

impl Default for CacheTuning {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness_secs(),
            evict_secs: default_evict_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThemeConfig {
    /// Where the theme preference is persisted between sessions.
    pub state_path: PathBuf,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_freshness_secs() -> u64 {
    300
}

fn default_evict_secs() -> u64 {
    600
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (set BYLINE_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl StoreConfig {
    /// Load from the path named by `BYLINE_CONFIG`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("BYLINE_CONFIG")
            .ok()
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingConfigPath)?;
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.timeout_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.freshness_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.freshness_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.evict_secs < self.cache.freshness_secs {
            return Err(ConfigError::InvalidValue {
                field: "cache.evict_secs",
                reason: "must be >= cache.freshness_secs".to_string(),
            });
        }
        if self.theme.state_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "theme.state_path",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Gateway settings derived from the `[api]` section.
    pub fn gateway_config(&self) -> GatewayConfig {
        let mut gateway = GatewayConfig::new(&self.api.base_url)
            .with_timeout(Duration::from_secs(self.api.timeout_secs));
        if let Some(token) = &self.api.auth_token {
            gateway = gateway.with_auth_token(token);
        }
        gateway
    }

    /// Cache settings derived from the `[cache]` section.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_freshness_window(Duration::from_secs(self.cache.freshness_secs))
            .with_evict_age(Duration::from_secs(self.cache.evict_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(toml_text: &str) -> Result<StoreConfig, ConfigError> {
        let config: StoreConfig = toml::from_str(toml_text)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config = parse(
            r#"
            [api]
            base_url = "http://localhost:8000"

            [theme]
            state_path = "/tmp/byline/theme.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.cache.freshness_secs, 300);
        assert_eq!(config.cache.evict_secs, 600);
        assert!(config.api.auth_token.is_none());
    }

    #[test]
    fn test_full_config_roundtrips_into_component_configs() {
        let config = parse(
            r#"
            [api]
            base_url = "https://byline.example/"
            auth_token = "jwt-token"
            timeout_secs = 3

            [cache]
            freshness_secs = 30
            evict_secs = 60

            [theme]
            state_path = "/tmp/byline/theme.json"
            "#,
        )
        .unwrap();

        let gateway = config.gateway_config();
        assert_eq!(gateway.base_url, "https://byline.example/");
        assert_eq!(gateway.auth_token.as_deref(), Some("jwt-token"));
        assert_eq!(gateway.timeout, Duration::from_secs(3));

        let cache = config.cache_config();
        assert_eq!(cache.freshness_window, Duration::from_secs(30));
        assert_eq!(cache.evict_age, Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result = parse(
            r#"
            [api]
            base_url = "http://localhost:8000"
            retries = 3

            [theme]
            state_path = "/tmp/byline/theme.json"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_empty_base_url_is_invalid() {
        let result = parse(
            r#"
            [api]
            base_url = "  "

            [theme]
            state_path = "/tmp/byline/theme.json"
            "#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "api.base_url", .. })
        ));
    }

    #[test]
    fn test_evict_shorter_than_freshness_is_invalid() {
        let result = parse(
            r#"
            [api]
            base_url = "http://localhost:8000"

            [cache]
            freshness_secs = 300
            evict_secs = 30

            [theme]
            state_path = "/tmp/byline/theme.json"
            "#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "cache.evict_secs", .. })
        ));
    }

    #[test]
    fn test_load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("byline.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[api]").unwrap();
        writeln!(file, "base_url = \"http://localhost:8000\"").unwrap();
        writeln!(file, "[theme]").unwrap();
        writeln!(file, "state_path = \"{}\"", dir.path().join("theme.json").display()).unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = StoreConfig::load(Path::new("/nonexistent/byline.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
