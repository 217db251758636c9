//! Configuration types and loading

use std::path::{Path, PathBuf};

use eyre::Result;
use serde::{Deserialize, Serialize};

use crate::phone::CountryRules;
use crate::template::DEFAULT_TEMPLATE;
use crate::window::SendWindow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Delay between consecutive sends, milliseconds
    #[serde(default = "default_message_delay_ms")]
    pub message_delay_ms: u64,

    /// Delay after each registration lookup, milliseconds
    #[serde(default = "default_validation_delay_ms")]
    pub validation_delay_ms: u64,

    /// Inline message template ({{name}} and {{phone}} placeholders)
    #[serde(default = "default_template")]
    pub template: String,

    /// Template file overriding the inline text
    #[serde(default)]
    pub template_file: Option<PathBuf>,

    /// Opt-out registry file
    #[serde(default = "default_optout_path")]
    pub optout_path: PathBuf,

    /// Shared progress ledger file
    #[serde(default = "default_progress_path")]
    pub progress_path: PathBuf,

    /// Revalidate contacts already marked REGISTERED
    #[serde(default)]
    pub force_revalidate: bool,

    /// With force_revalidate, also retry INVALID_NUMBER / NOT_REGISTERED rows
    #[serde(default)]
    pub retry_failed: bool,

    #[serde(default)]
    pub country: CountryRules,

    #[serde(default)]
    pub window: SendWindow,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Log level; overridden by --log-level
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Which client to use: "http" or "null"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of the messaging gateway
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for the gateway, if it requires one
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_message_delay_ms() -> u64 {
    5000
}

fn default_validation_delay_ms() -> u64 {
    1500
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bulksend")
}

fn default_optout_path() -> PathBuf {
    data_dir().join("optout.txt")
}

fn default_progress_path() -> PathBuf {
    data_dir().join("progress.json")
}

fn default_provider() -> String {
    "http".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            message_delay_ms: default_message_delay_ms(),
            validation_delay_ms: default_validation_delay_ms(),
            template: default_template(),
            template_file: None,
            optout_path: default_optout_path(),
            progress_path: default_progress_path(),
            force_revalidate: false,
            retry_failed: false,
            country: CountryRules::default(),
            window: SendWindow::default(),
            transport: TransportConfig::default(),
            log_level: None,
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("bulksend").join("config.yml")),
            Some(PathBuf::from("bulksend.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("message_delay_ms: 1000\n").unwrap();
        assert_eq!(config.message_delay_ms, 1000);
        assert_eq!(config.validation_delay_ms, default_validation_delay_ms());
        assert_eq!(config.template, DEFAULT_TEMPLATE);
        assert_eq!(config.country.country_code, "58");
    }

    #[test]
    fn test_save_and_reload() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.yml");

        let mut config = Config::default();
        config.force_revalidate = true;
        config.transport.provider = "null".to_string();
        config.save(&path).unwrap();

        let reloaded = Config::load(Some(&path)).unwrap();
        assert!(reloaded.force_revalidate);
        assert_eq!(reloaded.transport.provider, "null");
    }
}
