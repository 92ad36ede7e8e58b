//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Category, Game, Platform};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Run scheduling and concurrency settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Delivery sink behavior
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Feed enumeration settings
    #[serde(default)]
    pub feeds: FeedsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::config("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::config("http.timeout_secs must be > 0"));
        }
        if self.runtime.max_concurrent == 0 {
            return Err(AppError::config("runtime.max_concurrent must be > 0"));
        }
        if self.runtime.retry_attempts == 0 {
            return Err(AppError::config("runtime.retry_attempts must be > 0"));
        }
        if self.feeds.page_size == 0 {
            return Err(AppError::config("feeds.page_size must be > 0"));
        }
        if self.feeds.sources.is_empty() {
            return Err(AppError::config("No feed sources defined"));
        }
        for source in &self.feeds.sources {
            if source.categories.is_empty() {
                return Err(AppError::config(format!(
                    "Source {}:{} has no categories",
                    source.platform, source.game
                )));
            }
            if source.platform == Platform::Hoyolab && source.game.hoyolab_gids().is_none() {
                return Err(AppError::config(format!(
                    "Game {} is not hosted on hoyolab",
                    source.game
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            runtime: RuntimeConfig::default(),
            delivery: DeliveryConfig::default(),
            feeds: FeedsConfig::default(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for all requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Accept-Language header
    #[serde(default = "defaults::accept_language")]
    pub accept_language: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            accept_language: defaults::accept_language(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Run scheduling and concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum concurrent detail fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Delay between upstream requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Bounded retry attempts per upstream call
    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff delay in milliseconds, doubled per attempt
    #[serde(default = "defaults::retry_base")]
    pub retry_base_ms: u64,

    /// Whole-run deadline in seconds
    #[serde(default = "defaults::deadline")]
    pub deadline_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            request_delay_ms: defaults::request_delay(),
            retry_attempts: defaults::retry_attempts(),
            retry_base_ms: defaults::retry_base(),
            deadline_secs: defaults::deadline(),
        }
    }
}

/// Delivery sink behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Pause between consecutive webhook posts in milliseconds
    #[serde(default = "defaults::delivery_pause")]
    pub pause_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            pause_ms: defaults::delivery_pause(),
        }
    }
}

/// Feed enumeration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Upstream content language
    #[serde(default = "defaults::language")]
    pub language: String,

    /// Listing size requested per category
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Enabled (platform, game) pairs with their categories
    #[serde(default = "defaults::sources")]
    pub sources: Vec<SourceEntry>,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            language: defaults::language(),
            page_size: defaults::page_size(),
            sources: defaults::sources(),
        }
    }
}

/// One enabled (platform, game) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub platform: Platform,
    pub game: Game,
    pub categories: Vec<Category>,
}

mod defaults {
    use crate::models::{Category, Game, Platform};

    use super::SourceEntry;

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
            .into()
    }
    pub fn accept_language() -> String {
        "en-US,en;q=0.9".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Runtime defaults
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn request_delay() -> u64 {
        100
    }
    pub fn retry_attempts() -> u32 {
        3
    }
    pub fn retry_base() -> u64 {
        2000
    }
    pub fn deadline() -> u64 {
        300
    }

    // Delivery defaults
    pub fn delivery_pause() -> u64 {
        1500
    }

    // Feed defaults
    pub fn language() -> String {
        "en-us".into()
    }
    pub fn page_size() -> usize {
        5
    }

    pub fn sources() -> Vec<SourceEntry> {
        let hoyolab_categories = vec![Category::Notices, Category::Events, Category::Info];
        vec![
            SourceEntry {
                platform: Platform::Hoyolab,
                game: Game::Genshin,
                categories: hoyolab_categories.clone(),
            },
            SourceEntry {
                platform: Platform::Hoyolab,
                game: Game::Starrail,
                categories: hoyolab_categories.clone(),
            },
            SourceEntry {
                platform: Platform::Hoyolab,
                game: Game::Honkai3rd,
                categories: hoyolab_categories.clone(),
            },
            SourceEntry {
                platform: Platform::Hoyolab,
                game: Game::Zzz,
                categories: hoyolab_categories,
            },
            SourceEntry {
                platform: Platform::Gryphline,
                game: Game::Endfield,
                categories: vec![Category::Notices, Category::News],
            },
            SourceEntry {
                platform: Platform::Shadowverse,
                game: Game::Shadowverse,
                categories: vec![Category::News],
            },
        ]
    }
}
