//! Configuration management for the Horizon plugin host.
//!
//! The host configuration lives in a TOML file that is created with default
//! values the first time the host starts.

use anyhow::{Context, Result};
use plugin_runtime::PluginSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::cli::CliArgs;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host identity settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Settings shared by every plugin
    #[serde(default)]
    pub plugins: PluginSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Host identity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Name shown in the startup banner and logs
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: "Horizon Server".to_string(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("error reading config '{}'", path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("error decoding config '{}'", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)
                .context("failed encoding default config")?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("failed creating config '{}'", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command line overrides on top of the file configuration.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(plugin_dir) = &args.plugin_dir {
            self.plugins.directory = plugin_dir.to_string_lossy().to_string();
        }
        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.plugins.directory.is_empty() {
            return Err("Plugin directory cannot be empty".to_string());
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.name, "Horizon Server");
        assert_eq!(config.plugins.directory, "plugins");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());

        // The defaults were written and load back unchanged.
        assert!(path.exists());
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
name = "Test Realm"

[plugins]
directory = "custom_plugins"

[logging]
level = "debug"
json_format = true
"#;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.name, "Test Realm");
        assert_eq!(config.plugins.directory, "custom_plugins");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_missing_sections_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[logging]\nlevel = \"warn\"\n").await.unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.plugins.directory, "plugins");
        assert_eq!(config.server.name, "Horizon Server");
        assert_eq!(config.logging.level, "warn");
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[plugins\ndirectory = ").await.unwrap();

        let err = AppConfig::load_from_file(&path).await.unwrap_err();
        assert!(err.to_string().contains("error decoding config"));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            config_path: PathBuf::from("config.toml"),
            plugin_dir: Some(PathBuf::from("/srv/plugins")),
            log_level: Some("trace".to_string()),
            json_logs: true,
        };

        config.apply_overrides(&args);
        assert_eq!(config.plugins.directory, "/srv/plugins");
        assert_eq!(config.logging.level, "trace");
        assert!(config.logging.json_format);

        // Absent overrides leave the file values alone.
        let mut untouched = AppConfig::default();
        untouched.apply_overrides(&CliArgs::default());
        assert_eq!(untouched, AppConfig::default());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.plugins.directory = String::new();
        assert!(config
            .validate()
            .unwrap_err()
            .contains("Plugin directory cannot be empty"));

        let mut config = AppConfig::default();
        config.logging.level = "invalid_level".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));

        for level in VALID_LOG_LEVELS {
            let mut config = AppConfig::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "Level '{}' should be valid", level);
        }
    }
}
