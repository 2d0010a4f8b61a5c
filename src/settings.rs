use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::assigner::PostingRule;
use crate::cleanup::CleanupOptions;
use crate::error::{ImportError, Result};
use crate::models::{VatMode, DEFAULT_CURRENCY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub bank_account: String,
    #[serde(default)]
    pub vat_mode: VatMode,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default)]
    pub cleanup: CleanupOptions,
    #[serde(default)]
    pub posting_rules: Vec<PostingRule>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bank_account: String::new(),
            vat_mode: VatMode::default(),
            default_currency: default_currency(),
            cleanup: CleanupOptions::default(),
            posting_rules: Vec::new(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("bankimport")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Missing files give defaults; unreadable ones are logged and also give defaults.
pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    let content = std::fs::read_to_string(path).unwrap_or_default();
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!("ignoring unreadable settings at {}: {e}", path.display());
        Settings::default()
    })
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ImportError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}
