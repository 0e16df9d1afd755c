//! Binary bootstrap configuration.
//!
//! The gateway binary reads one file (TOML, YAML or JSON, picked by
//! extension) holding the [`GatewayConfig`] sections plus optional static
//! `services` and `rate_limits` tables that seed the in-memory collaborators.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NEXUS_CONFIG` | `nexus.toml` | Path of the configuration file. |
//! | `NEXUS_PORT` | *(file value)* | Overrides `server.port`. |
//! | `NEXUS_<SECTION>__<KEY>` | *(file value)* | Overrides any nested key, e.g. `NEXUS_ADMISSION__DEFAULT_CAPACITY`. |

use nexus_kernel::config::{ConfigError, ConfigResult, load_with_env};
use nexus_kernel::gateway::{GatewayConfig, RateLimitRule, ServiceInstance};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

pub const CONFIG_PATH_VAR: &str = "NEXUS_CONFIG";
pub const PORT_VAR: &str = "NEXUS_PORT";
pub const DEFAULT_CONFIG_PATH: &str = "nexus.toml";
const ENV_PREFIX: &str = "NEXUS";

/// Everything the binary needs to start.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    /// Instances served by the in-memory discovery registry.
    #[serde(default)]
    pub services: Vec<ServiceInstance>,
    /// Rules served by the in-memory rule store.
    #[serde(default)]
    pub rate_limits: Vec<RateLimitRule>,
}

impl BootstrapConfig {
    /// Load `path`; a missing file yields the defaults.
    pub fn load(path: &str) -> ConfigResult<Self> {
        if !Path::new(path).exists() {
            info!(path = %path, "configuration file not found, using defaults");
            return Ok(Self::default());
        }
        load_with_env(path, ENV_PREFIX)
    }

    /// Load from `NEXUS_CONFIG` and apply `NEXUS_PORT`.
    pub fn from_env() -> ConfigResult<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::load(&path)?;
        if let Ok(raw) = std::env::var(PORT_VAR) {
            config.gateway.server.port = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Parse(format!("{PORT_VAR}='{raw}' is not a valid port")))?;
        }
        Ok(config)
    }
}
