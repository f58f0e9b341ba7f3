use crate::error::{ConfigError, CoreError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "reddit-scraper.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub fetch: FetchSettings,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub api_base: String,
    pub token_url: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: "reddit-scraper/0.1".to_string(),
            api_base: "https://oauth.reddit.com".to_string(),
            token_url: "https://www.reddit.com/api/v1/access_token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub page_size: u32,
    pub page_timeout_ms: u64,
    /// Pause between consecutive cursor-discovery requests.
    pub page_delay_ms: u64,
    /// Upper bound on concurrent page requests during fan-out.
    pub max_concurrency: usize,
    pub max_search_pages: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: crate::types::DEFAULT_PAGE_SIZE,
            page_timeout_ms: 10_000,
            page_delay_ms: 2000,
            max_concurrency: 32,
            max_search_pages: 10,
        }
    }
}

impl FetchSettings {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://posts.db".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the TOML file at `path` (or the default file when it exists),
    /// then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    }
                    .into());
                }
                Self::from_file(path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        info!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&contents)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("REDDIT_CLIENT_ID") {
            self.reddit.client_id = Some(value);
        }
        if let Some(value) = lookup("REDDIT_CLIENT_SECRET") {
            self.reddit.client_secret = Some(value);
        }
        if let Some(value) = lookup("REDDIT_USER_AGENT") {
            self.reddit.user_agent = value;
        }
        if let Some(value) = lookup("DATABASE_URL") {
            self.database.url = value;
        }
    }

    /// Checks the settings the fetch pipeline cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reddit.client_id.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingField {
                field: "reddit.client_id".to_string(),
            });
        }
        if self.reddit.client_secret.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingField {
                field: "reddit.client_secret".to_string(),
            });
        }
        if self.fetch.page_size == 0 {
            return Err(invalid("fetch.page_size", self.fetch.page_size));
        }
        if self.fetch.max_concurrency == 0 {
            return Err(invalid("fetch.max_concurrency", self.fetch.max_concurrency));
        }
        if self.fetch.page_timeout_ms == 0 {
            return Err(invalid("fetch.page_timeout_ms", self.fetch.page_timeout_ms));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.fetch.max_concurrency, 32);
        assert_eq!(config.fetch.page_delay(), Duration::from_secs(2));
        assert_eq!(config.reddit.api_base, "https://oauth.reddit.com");
        assert_eq!(config.database.url, "sqlite://posts.db");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [reddit]
            client_id = "abc"
            client_secret = "xyz"

            [fetch]
            max_concurrency = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.reddit.client_id.as_deref(), Some("abc"));
        assert_eq!(config.fetch.max_concurrency, 8);
        assert_eq!(config.fetch.page_timeout_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_toml() {
        let result = AppConfig::from_toml_str("[fetch\nmax_concurrency = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REDDIT_CLIENT_ID", "env-id"),
            ("REDDIT_CLIENT_SECRET", "env-secret"),
            ("DATABASE_URL", "sqlite://other.db"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.reddit.client_id.as_deref(), Some("env-id"));
        assert_eq!(config.reddit.client_secret.as_deref(), Some("env-secret"));
        assert_eq!(config.reddit.user_agent, "reddit-scraper/0.1");
        assert_eq!(config.database.url, "sqlite://other.db");
    }

    #[test]
    fn test_validation_failures() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field }) if field == "reddit.client_id"
        ));

        let mut config = AppConfig::default();
        config.reddit.client_id = Some("id".to_string());
        config.reddit.client_secret = Some("secret".to_string());
        config.fetch.max_concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "fetch.max_concurrency"
        ));
    }
}
