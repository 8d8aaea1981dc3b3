use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Where [`Config::load_with_source`] took its values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    Defaults,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub openai_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            openai_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-mini".to_string(),
            request_timeout_seconds: 45,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub db_file: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_file: "anki_companion.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub export_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            export_dir: "exports".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means any origin is accepted.
    pub allowed_origins: Vec<String>,
    pub rate_limit_requests: usize,
    pub rate_limit_window_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            allowed_origins: Vec::new(),
            rate_limit_requests: 20,
            rate_limit_window_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Reads `config.toml` from the working directory.
    pub fn load() -> Result<Config> {
        Self::load_from_path("config.toml")
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
        Self::load_with_source(path).map(|(config, _)| config)
    }

    /// A missing file falls back to defaults, a malformed one is an error.
    /// Environment overrides are applied in both cases. The source is returned
    /// rather than logged, since logging is configured from the result.
    pub fn load_with_source(path: impl AsRef<Path>) -> Result<(Config, ConfigSource)> {
        let path = path.as_ref();

        let (mut config, source) = if path.exists() {
            let config_content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
            let config = Self::from_toml_str(&config_content)
                .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;
            (config, ConfigSource::File)
        } else {
            (Config::default(), ConfigSource::Defaults)
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok((config, source))
    }

    pub fn from_toml_str(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// `lookup` is injected so overrides can be exercised without touching the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty()) {
            self.api.openai_key = Some(key);
        }

        if let Some(port) = lookup("PORT").and_then(|port| port.parse::<u16>().ok()) {
            self.server.port = port;
        }

        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api
            .openai_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let config = Config::from_toml_str(
            r#"
            [api]
            model = "gpt-4.1"

            [server]
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.api.model, "gpt-4.1");
        assert_eq!(config.api.request_timeout_seconds, 45);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.rate_limit_requests, 20);
        assert_eq!(config.database.db_file, "anki_companion.db");
        assert!(config.api_key().is_none());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "PORT" => Some("4000".to_string()),
            "ALLOWED_ORIGINS" => Some("http://a.test, ,http://b.test".to_string()),
            _ => None,
        });

        assert_eq!(config.api_key(), Some("sk-test"));
        assert_eq!(config.server.port, 4000);
        assert_eq!(
            config.server.allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, source) = Config::load_with_source(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(source, ConfigSource::Defaults);
    }

    #[test]
    fn existing_file_is_reported_as_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nfilter = \"debug\"").unwrap();
        let (config, source) = Config::load_with_source(&path).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(source, ConfigSource::File);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = \"not a number\"").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }
}
