//! Configuration management using Figment with XDG directory support
//!
//! Sources are layered, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. `/etc/resource-controller/{service_name}/config.toml`
//! 3. `~/.config/resource-controller/{service_name}/config.toml` (XDG)
//! 4. `./config.toml`
//! 5. Environment variables prefixed `RESOURCE_CONTROLLER_`, with `__`
//!    separating nested keys (`RESOURCE_CONTROLLER_PAGINATION__MAX_PER_PAGE=50`)
//!
//! ```toml
//! [service]
//! name = "adventures"
//! port = 8080
//! log_level = "debug"
//!
//! [pagination]
//! default_per_page = 25
//! max_per_page = 200
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "RESOURCE_CONTROLLER_";

/// Directory name used under XDG and `/etc`
const CONFIG_DIR: &str = "resource-controller";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service and HTTP server settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// List pagination defaults shared by controllers
    #[serde(default)]
    pub pagination: PaginationConfig,
}

/// Service and HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, used in logs and to locate config files
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Port the HTTP server binds on all interfaces
    #[serde(default = "default_port")]
    pub port: u16,

    /// `EnvFilter` directive for log output
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum request body size in megabytes
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
            log_level: default_log_level(),
            timeout_secs: default_timeout(),
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

/// Page sizing for list operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Page size when the request does not ask for one
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,

    /// Upper bound on any requested page size
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

impl PaginationConfig {
    /// Resolve the effective page size for a request
    ///
    /// ```rust
    /// use resource_controller::config::PaginationConfig;
    ///
    /// let pagination = PaginationConfig::default();
    /// assert_eq!(pagination.per_page(None), 20);
    /// assert_eq!(pagination.per_page(Some(0)), 1);
    /// assert_eq!(pagination.per_page(Some(5000)), 100);
    /// ```
    #[must_use]
    pub fn per_page(&self, requested: Option<u32>) -> u32 {
        let max = self.max_per_page.max(1);
        requested.unwrap_or(self.default_per_page).clamp(1, max)
    }
}

fn default_service_name() -> String {
    CONFIG_DIR.to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_body_limit_mb() -> usize {
    10
}

fn default_per_page() -> u32 {
    20
}

fn default_max_per_page() -> u32 {
    100
}

impl Config {
    /// Load configuration for the default service name
    pub fn load() -> Result<Self> {
        Self::load_for_service(CONFIG_DIR)
    }

    /// Load configuration for a named service, searching the layered paths
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Serialized::default("service.name", service_name));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            } else {
                tracing::debug!("No configuration at {}", path.display());
            }
        }

        let config = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file, bypassing the search paths
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Candidate config files, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(CONFIG_DIR);
        if let Some(path) = xdg_dirs.find_config_file(Path::new(service_name).join("config.toml")) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc")
                .join(CONFIG_DIR)
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }
}
