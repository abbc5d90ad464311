//! Startup configuration
//!
//! Everything the server takes from its environment is collected here once:
//! listen address, runtime configuration location, request timeout and the
//! secrets of builtin tools. Nothing below the entry point reads the
//! environment again.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use abode_core::config::RuntimeConfig;
use abode_core::error::ConfigError;
use abode_core::runtime::Runtime;
use abode_core::tool::builtin::{self, BuiltinSettings, DEFAULT_SEARCH_ENDPOINT, SEARCH_API_KEY_VAR};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const CONFIG_FILE_NAME: &str = "abode.toml";
pub const SEARCH_ENDPOINT_VAR: &str = "ABODE_SEARCH_ENDPOINT";

/// Where the runtime configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Bundled,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Bundled => write!(f, "bundled real-estate configuration"),
        }
    }
}

/// Resolve the configuration file
///
/// An explicit path always wins, even if it does not exist (loading it then
/// fails). Otherwise `./abode.toml`, then `~/.abode/abode.toml`, then the
/// bundled configuration.
pub fn resolve_config_source(explicit: Option<&Path>, cwd: &Path, home: Option<&Path>) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::File(path.to_path_buf());
    }

    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return ConfigSource::File(local);
    }

    if let Some(home) = home {
        let user = home.join(".abode").join(CONFIG_FILE_NAME);
        if user.is_file() {
            return ConfigSource::File(user);
        }
    }

    ConfigSource::Bundled
}

/// Validated startup values
#[derive(Clone)]
pub struct StartupConfig {
    pub addr: String,
    /// `--config`, if given
    pub config_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub ca_bundle: Option<PathBuf>,
    pub search_api_key: Option<String>,
    pub search_endpoint: String,
}

impl fmt::Debug for StartupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupConfig")
            .field("addr", &self.addr)
            .field("config_path", &self.config_path)
            .field("request_timeout", &self.request_timeout)
            .field("ca_bundle", &self.ca_bundle)
            .field("search_api_key", &self.search_api_key.as_ref().map(|_| "<redacted>"))
            .field("search_endpoint", &self.search_endpoint)
            .finish()
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            config_path: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            ca_bundle: None,
            search_api_key: None,
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
        }
    }
}

impl StartupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus the tool secrets found in the process environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.search_api_key = std::env::var(SEARCH_API_KEY_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if let Ok(endpoint) = std::env::var(SEARCH_ENDPOINT_VAR) {
            config.search_endpoint = endpoint;
        }
        config
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ca_bundle(mut self, path: Option<PathBuf>) -> Self {
        self.ca_bundle = path;
        self
    }

    pub fn config_source(&self) -> ConfigSource {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        resolve_config_source(self.config_path.as_deref(), &cwd, dirs::home_dir().as_deref())
    }

    pub fn builtin_settings(&self) -> BuiltinSettings {
        BuiltinSettings {
            search_api_key: self.search_api_key.clone(),
            search_endpoint: self.search_endpoint.clone(),
            ca_bundle: self.ca_bundle.clone(),
        }
    }

    /// Load and validate the runtime, binding the builtin tool catalog
    pub fn load_runtime(&self) -> Result<Runtime, ConfigError> {
        let source = self.config_source();
        tracing::info!(source = %source, "loading runtime configuration");

        let config = match &source {
            ConfigSource::File(path) => RuntimeConfig::load(path)?,
            ConfigSource::Bundled => RuntimeConfig::real_estate()?,
        };
        let catalog = builtin::catalog(&self.builtin_settings())?;

        Runtime::builder(config).catalog(catalog).build()
    }
}
