//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (BLOOM_*)
//! 2. TOML config file (if BLOOM_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The cache store names are part of the configuration rather than constants:
//! bumping their version suffix is how a deployment invalidates old caches.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Names of the three stores a worker version owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNames {
    /// Pre-populated shell assets and scripts.
    pub static_assets: String,
    /// Backend API responses.
    pub offline_data: String,
    /// Navigated documents.
    pub html: String,
}

impl CacheNames {
    /// Names following the `<app>-<purpose>-v<n>` layout.
    pub fn versioned(app: &str, version: u32) -> Self {
        Self {
            static_assets: format!("{app}-static-v{version}"),
            offline_data: format!("{app}-offline-v{version}"),
            html: format!("{app}-html-v{version}"),
        }
    }

    /// The retained set: every other store is deleted at activation.
    pub fn retained(&self) -> [&str; 3] {
        [&self.static_assets, &self.offline_data, &self.html]
    }
}

impl Default for CacheNames {
    fn default() -> Self {
        Self { static_assets: "kgf-orders-v2".into(), offline_data: "kgf-offline-v1".into(), html: "kgf-html-v1".into() }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (BLOOM_*)
/// 2. TOML config file (if BLOOM_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the shell is served from. Relative URLs resolve against it.
    ///
    /// Set via BLOOM_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Domain of the hosted backend; requests to it are API data calls.
    ///
    /// Set via BLOOM_API_DOMAIN environment variable.
    #[serde(default = "default_api_domain")]
    pub api_domain: String,

    /// Versioned store names.
    ///
    /// Set via BLOOM_CACHE_NAMES__STATIC_ASSETS and friends.
    #[serde(default)]
    pub cache_names: CacheNames,

    /// Shell assets written to the static store at install.
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Document served to navigations that miss the cache while offline.
    #[serde(default = "default_root_document")]
    pub root_document: String,

    /// Whether a freshly installed worker takes over without waiting.
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,

    /// Path to SQLite cache database.
    ///
    /// Set via BLOOM_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP transport timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total body bytes the store may hold.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_api_domain() -> String {
    "supabase.co".into()
}

fn default_static_assets() -> Vec<String> {
    ["/", "/index.html", "/order.html", "/styles.css", "/manifest.json", "/icons/icon-192.png", "/icons/icon-512.png"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_root_document() -> String {
    "/index.html".into()
}

fn default_true() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./bloom-cache.sqlite")
}

fn default_user_agent() -> String {
    "bloom-sw/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_quota_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            api_domain: default_api_domain(),
            cache_names: CacheNames::default(),
            static_assets: default_static_assets(),
            root_document: default_root_document(),
            skip_waiting_on_install: true,
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            quota_bytes: default_quota_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("BLOOM_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("BLOOM_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The origin as a parsed URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Resolve `path` (absolute or origin-relative) to a full URL.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.origin_url()?
            .join(path)
            .map_err(|e| ConfigError::Invalid { field: "url".into(), reason: format!("{path}: {e}") })
    }

    /// Every static asset resolved against the origin.
    pub fn static_asset_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.static_assets.iter().map(|path| self.resolve(path)).collect()
    }

    pub fn root_document_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.root_document)
    }
}
