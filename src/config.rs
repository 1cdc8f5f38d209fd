use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rotation::Credential;
use crate::session::SessionSettings;

const KEYRING_SERVICE: &str = "safarimind_api_key";

pub const CONFIG_PATH_ENV: &str = "SAFARIMIND_CONFIG";
pub const MODELS_ENV: &str = "SAFARIMIND_MODELS";
pub const API_KEYS_ENV: &str = "SAFARIMIND_API_KEYS";
pub const API_URL_ENV: &str = "SAFARIMIND_API_URL";
pub const DB_PATH_ENV: &str = "SAFARIMIND_DB";

/// Application settings. Loaded from an optional JSON file, then environment.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api_url: String,
    /// Tried in order for each credential.
    pub models: Vec<String>,
    /// Credential references: `env:VAR`, `keyring:NAME`, or a literal key.
    pub api_keys: Vec<String>,
    pub db_path: PathBuf,
    pub max_input_chars: usize,
    pub typing_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            models: vec![
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-pro".to_string(),
                "gemini-pro".to_string(),
            ],
            api_keys: vec!["env:GEMINI_API_KEY".to_string()],
            db_path: PathBuf::from("safarimind.sqlite"),
            max_input_chars: 4000,
            typing_delay_ms: 600,
            request_timeout_secs: 60,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .context(format!("Failed to read config file '{}'", path.display()))?;
        serde_json::from_str(&raw).context(format!("Failed to parse config file '{}'", path.display()))
    }

    /// Overrides fields from a variable lookup. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(models) = get(MODELS_ENV) {
            self.models = split_list(&models);
        }
        if let Some(keys) = get(API_KEYS_ENV) {
            self.api_keys = split_list(&keys);
        }
        if let Some(url) = get(API_URL_ENV) {
            self.api_url = url.trim().to_string();
        }
        if let Some(path) = get(DB_PATH_ENV) {
            self.db_path = PathBuf::from(path.trim());
        }
    }

    /// Loads `SAFARIMIND_CONFIG` if set, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                log::info!("Loading configuration from {}", path);
                Self::from_file(Path::new(path.trim()))?
            }
            _ => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        log::debug!(
            "Configured {} models and {} credential references",
            config.models.len(),
            config.api_keys.len()
        );
        Ok(config)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_input_chars: self.max_input_chars,
            typing_delay: Duration::from_millis(self.typing_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolves every credential reference, skipping the ones that fail.
    pub fn resolve_credentials(&self) -> Vec<Credential> {
        self.api_keys
            .iter()
            .filter_map(|reference| match resolve_api_key(reference) {
                Ok(key) => Some(Credential::new(key)),
                Err(e) => {
                    log::warn!("Skipping API key reference '{}': {:#}", reference, e);
                    None
                }
            })
            .collect()
    }
}

// --- API Key Retrieval ---

/// Retrieves an API key from a reference: `env:VAR` reads an environment
/// variable, `keyring:NAME` reads the OS keyring, anything else is the key.
pub fn resolve_api_key(reference: &str) -> Result<String> {
    let key = match reference.trim() {
        r if r.starts_with("env:") => {
            let env_var_name = r.trim_start_matches("env:");
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            std::env::var(env_var_name).context(format!(
                "Failed to get API key from environment variable '{}'",
                env_var_name
            ))?
        }
        r if r.starts_with("keyring:") => {
            let name = r.trim_start_matches("keyring:");
            let entry = Entry::new(KEYRING_SERVICE, name).context("Failed to create keyring entry")?;
            log::debug!("Retrieving API key from keyring for: {}", name);
            entry
                .get_password()
                .context(format!("Failed to get API key from keyring for '{}'", name))?
        }
        "" => return Err(anyhow::anyhow!("API key reference is empty")),
        literal => literal.to_string(),
    };
    if key.trim().is_empty() {
        return Err(anyhow::anyhow!("API key from '{}' is empty", reference));
    }
    Ok(key.trim().to_string())
}
