//! Configuration for the TradeMe sign-in demo
//!
//! Sources, later ones winning:
//! - built-in defaults
//! - `trademe.toml` (or the file named by `TRADEME_CONFIG_FILE`)
//! - environment variables with the `TRADEME__` prefix, e.g.
//!   `TRADEME__OAUTH__CONSUMER_KEY` or `TRADEME__SERVER__PORT`

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use ras_identity_oauth1::{OAuth1Endpoints, OAuth1Options};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,

    /// Provider options; consumer key and secret are required
    pub oauth: OAuth1Options,

    /// Use the TradeMe sandbox instead of production; ignored when
    /// `oauth.endpoints` names other endpoints
    pub sandbox: bool,

    /// Secret the state value is sealed with (at least 16 bytes)
    pub state_secret: String,

    /// PEM files of the only roots trusted for backchannel TLS
    pub certificate_pins: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            oauth: OAuth1Options::default(),
            sandbox: true,
            state_secret: default_state_secret(),
            certificate_pins: Vec::new(),
        }
    }
}

fn default_state_secret() -> String {
    "dev-state-secret-change-me-please".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_path =
            std::env::var("TRADEME_CONFIG_FILE").unwrap_or_else(|_| "trademe.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            info!("Loading configuration from {}", config_path);
            builder = builder.add_source(File::with_name(&config_path));
        } else {
            debug!("No config file found at {}, using defaults", config_path);
        }

        builder = builder.add_source(
            Environment::with_prefix("TRADEME")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let mut settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.apply_sandbox();
        settings.validate()?;
        Ok(settings)
    }

    /// Swap the production defaults for the sandbox, keeping explicit endpoints.
    fn apply_sandbox(&mut self) {
        if !self.sandbox {
            return;
        }
        if self.oauth.endpoints == OAuth1Endpoints::production() {
            self.oauth.endpoints = OAuth1Endpoints::sandbox();
        } else {
            warn!("sandbox is set but custom endpoints are configured; using the configured endpoints");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if !cfg!(debug_assertions) && self.state_secret == default_state_secret() {
            anyhow::bail!("state_secret must be changed outside of debug builds");
        }

        self.oauth
            .validate()
            .context("Invalid TradeMe OAuth configuration")?;
        Ok(())
    }
}
