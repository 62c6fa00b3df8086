//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: ACTON_, `__` between sections and fields,
//!    e.g. `ACTON_PAGINATION__ORDER_BY=id`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/acton-paginate/{service_name}/config.toml
//! 4. System directory: /etc/acton-paginate/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::query::OrderDirection;

/// Default page size when the request carries no usable `limit`
pub const DEFAULT_LIMIT: u64 = 15;

/// Default sort column when the request carries no `order_by`
pub const DEFAULT_ORDER_BY: &str = "created_at";

/// Default cache lifespan (one year)
pub const DEFAULT_CACHE_DURATION_SECS: u64 = 31_536_000;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Defaults applied to every paginated endpoint
    #[serde(default)]
    pub pagination: PaginationDefaults,

    /// Redis configuration (optional)
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Pagination defaults shared by all call sites
///
/// Per-endpoint [`PaginationOptions`](crate::pagination::PaginationOptions) may
/// still override the cache duration and tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationDefaults {
    /// Page size used when `limit` is missing or not a positive integer
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Upper bound for `limit`; unbounded when `None`
    #[serde(default)]
    pub max_limit: Option<u64>,

    /// Sort column used when `order_by` is missing
    #[serde(default = "default_order_by")]
    pub order_by: String,

    /// Sort direction used when `order` is missing or invalid
    #[serde(default)]
    pub order: OrderDirection,

    /// Cache lifespan in seconds
    #[serde(default = "default_cache_duration_secs")]
    pub cache_duration_secs: u64,

    /// File name prefix for spreadsheet exports
    #[serde(default = "default_export_prefix")]
    pub export_prefix: String,
}

impl PaginationDefaults {
    /// Cache lifespan as a [`Duration`]
    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }
}

impl Default for PaginationDefaults {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            max_limit: None,
            order_by: default_order_by(),
            order: OrderDirection::default(),
            cache_duration_secs: default_cache_duration_secs(),
            export_prefix: default_export_prefix(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (redis://host:port)
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Maximum retry attempts for establishing Redis connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Prefix prepended to every cache key and tag set
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_order_by() -> String {
    DEFAULT_ORDER_BY.to_string()
}

fn default_cache_duration_secs() -> u64 {
    DEFAULT_CACHE_DURATION_SECS
}

fn default_export_prefix() -> String {
    "export".to_string()
}

fn default_redis_max_connections() -> usize {
    20
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

fn default_key_prefix() -> String {
    "acton-paginate".to_string()
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/acton-paginate/{service_name}/config.toml
    /// 3. System directory: /etc/acton-paginate/{service_name}/config.toml
    ///
    /// Environment variables (ACTON_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "acton-paginate".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("ACTON_").split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ACTON_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("acton-paginate");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/acton-paginate")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Get Redis URL
    pub fn redis_url(&self) -> Option<&str> {
        self.redis.as_ref().map(|r| r.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "acton-paginate".to_string(),
                log_level: default_log_level(),
                environment: default_environment(),
            },
            pagination: PaginationDefaults::default(),
            redis: None,
        }
    }
}
