//! Configuration management for the limiter service.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{LimiterError, Result};

/// Prefix for environment variable overrides, e.g. `GRATITUDE__RATE_LIMITING__RATE=5`.
pub const ENV_PREFIX: &str = "GRATITUDE";

/// Main configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: LimiterConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Path prefixes that bypass rate limiting
    #[serde(default = "default_exempt_prefixes")]
    pub exempt_prefixes: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            exempt_prefixes: default_exempt_prefixes(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4000))
}

fn default_exempt_prefixes() -> Vec<String> {
    vec!["/static/".to_string()]
}

/// Token bucket and eviction settings shared by every key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Steady-state tokens added per second
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Maximum tokens a bucket can hold (burst allowance)
    #[serde(default = "default_capacity")]
    pub capacity: f64,

    /// How often the sweeper runs, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Idle time after which a bucket is evicted, in seconds
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            capacity: default_capacity(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_age_secs: default_max_age(),
        }
    }
}

fn default_rate() -> f64 {
    10.0
}

fn default_capacity() -> f64 {
    20.0
}

fn default_cleanup_interval() -> u64 {
    3600
}

fn default_max_age() -> u64 {
    3600
}

impl LimiterConfig {
    /// Create a configuration with the given rate and capacity and default eviction settings.
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            ..Self::default()
        }
    }

    /// Builder-style: set the sweep interval in whole seconds.
    pub fn cleanup_interval_secs(mut self, secs: u64) -> Self {
        self.cleanup_interval_secs = secs;
        self
    }

    /// Builder-style: set the idle eviction threshold in whole seconds.
    pub fn max_age_secs(mut self, secs: u64) -> Self {
        self.max_age_secs = secs;
        self
    }

    /// Sweep interval as a [`Duration`].
    pub fn cleanup_interval_duration(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Idle eviction threshold as a [`Duration`].
    pub fn max_age_duration(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Check the bucket parameters only.
    pub fn validate_bucket(&self) -> Result<()> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(LimiterError::InvalidRate(self.rate));
        }
        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            return Err(LimiterError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }

    /// Validate the full configuration, including eviction settings.
    pub fn validate(&self) -> Result<()> {
        self.validate_bucket()?;
        if self.cleanup_interval_secs == 0 {
            return Err(LimiterError::InvalidInterval("cleanup_interval_secs"));
        }
        if self.max_age_secs == 0 {
            return Err(LimiterError::InvalidInterval("max_age_secs"));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).map_err(|e| LimiterError::Config(e.to_string()))?;
        config.rate_limiting.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, overlaid with `GRATITUDE__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`AppConfig::load`], but reads overrides from `env` instead of
    /// the process environment when it is given.
    pub fn load_with_env(
        path: Option<&str>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.exempt_prefixes")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        config.rate_limiting.validate()?;
        Ok(config)
    }
}
