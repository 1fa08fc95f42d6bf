//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! catalog URL, request timeout, staleness threshold for cached recipes,
//! search page size, and the last query searched.
//!
//! Configuration is stored at `~/.config/recipecache/config.json`. The
//! `RECIPECACHE_API_URL` environment variable overrides the catalog URL.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::{DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};
use crate::cache::DEFAULT_PAGE_SIZE;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "recipecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "RECIPECACHE_API_URL";

/// Days before a cached recipe is refreshed from the catalog
pub const DEFAULT_REFRESH_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub recipe_refresh_days: Option<i64>,
    pub page_size: Option<usize>,
    pub last_query: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn api_base_url(&self) -> String {
        self.resolve_base_url(std::env::var(API_URL_ENV).ok())
    }

    fn resolve_base_url(&self, env_override: Option<String>) -> String {
        env_override
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs.unwrap_or(REQUEST_TIMEOUT_SECS)
    }

    /// Age at which a cached recipe becomes eligible for refresh.
    pub fn refresh_threshold(&self) -> chrono::Duration {
        chrono::Duration::days(self.recipe_refresh_days.unwrap_or(DEFAULT_REFRESH_DAYS))
    }

    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}
