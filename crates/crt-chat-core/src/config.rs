use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

/// Environment variable holding the completion endpoint credential
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_CONTEXT_WINDOW: usize = 10;
pub const DEFAULT_BOOT_DELAY_MS: u64 = 2000;
pub const DEFAULT_GREETING: &str = "SYSTEM INITIALIZED...\nAI CORE ONLINE\n\nWELCOME TO 70s AI TERMINAL\nREADY FOR INPUT\n\n> HOW MAY I ASSIST YOU TODAY?";

/// User settings, stored as JSON. The API key is never part of it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub model: String,
    /// How many prior messages go out with each request
    pub context_window: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub greeting: String,
    pub boot_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_tokens: None,
            temperature: None,
            system_prompt: None,
            greeting: DEFAULT_GREETING.to_string(),
            boot_delay_ms: DEFAULT_BOOT_DELAY_MS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Reads the credential from the process environment, after giving a
    /// `.env` file in the working directory the chance to populate it.
    pub fn api_key_from_env() -> Option<String> {
        dotenvy::dotenv().ok();
        std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("crt-chat").join("config.json"))
    }
}
