use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::core::constants::{DEFAULT_BASE_URL, DEFAULT_GREETING, DEFAULT_MODEL};
use crate::core::error::ChatError;
use crate::utils::url::normalize_base_url;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    /// Base URL of the completion API (e.g., "https://api.together.xyz/v1")
    pub base_url: Option<String>,
    /// Model identifier sent with every completion request
    pub model: Option<String>,
    /// Greeting shown as the seed message of a fresh transcript
    pub greeting: Option<String>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        self.save_to_path(&config_path)
    }

    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    fn get_config_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "causette")
            .expect("Failed to determine config directory");
        proj_dirs.config_dir().join("config.toml")
    }
}

/// Per-run settings: the config file overlaid with environment variables and
/// command-line flags. Resolution happens once, before any request is made.
pub struct SessionSettings {
    pub base_url: String,
    pub model: String,
    pub greeting: String,
    pub api_key: String,
}

impl SessionSettings {
    /// Resolves runtime settings. Precedence for the base URL is CLI flag,
    /// then `TOGETHER_BASE_URL`, then config file, then the built-in default;
    /// the model follows CLI flag, config file, default. A missing
    /// `TOGETHER_API_KEY` is fatal here, before any network activity.
    pub fn resolve(
        config: &Config,
        model_flag: Option<String>,
        base_url_flag: Option<String>,
    ) -> Result<Self, ChatError> {
        let api_key = std::env::var("TOGETHER_API_KEY").map_err(|_| ChatError::MissingApiKey)?;
        Ok(Self::resolve_with_key(
            config,
            model_flag,
            base_url_flag,
            api_key,
        ))
    }

    fn resolve_with_key(
        config: &Config,
        model_flag: Option<String>,
        base_url_flag: Option<String>,
        api_key: String,
    ) -> Self {
        let base_url = base_url_flag
            .or_else(|| std::env::var("TOGETHER_BASE_URL").ok())
            .or_else(|| config.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model_flag
            .or_else(|| config.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let greeting = config
            .greeting
            .clone()
            .unwrap_or_else(|| DEFAULT_GREETING.to_string());

        Self {
            base_url: normalize_base_url(&base_url),
            model,
            greeting,
            api_key,
        }
    }
}
