//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(bind_addr) = std::env::var("BOTHERD_CONTROL_BIND_ADDR") {
            config.control_api.bind_addr = bind_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid BOTHERD_CONTROL_BIND_ADDR: {}", bind_addr))?;
        }

        if let Ok(nick_format) = std::env::var("BOTHERD_NICK_FORMAT") {
            config.irc.nick_format = nick_format;
        }

        if let Ok(capacity) = std::env::var("BOTHERD_CHANNELS_PER_CONNECTION") {
            config.irc.channels_per_connection = capacity
                .parse::<usize>()
                .with_context(|| format!("Invalid BOTHERD_CHANNELS_PER_CONNECTION: {}", capacity))?;
        }

        if let Ok(delay) = std::env::var("BOTHERD_RECONNECT_DELAY") {
            config.irc.reconnect_delay = humantime::parse_duration(&delay)
                .with_context(|| format!("Invalid BOTHERD_RECONNECT_DELAY: {}", delay))?;
        }

        if let Ok(log_level) = std::env::var("BOTHERD_LOG_LEVEL") {
            config.daemon.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Apply CLI argument overrides. Highest-priority configuration layer.
    pub fn merge_with_cli_args(
        &mut self,
        control_bind: Option<&str>,
        capacity: Option<usize>,
        nick_format: Option<&str>,
    ) {
        if let Some(bind) = control_bind {
            if let Ok(addr) = bind.parse::<SocketAddr>() {
                self.control_api.bind_addr = addr;
            } else {
                tracing::warn!("Ignoring invalid --control-bind value: {}", bind);
            }
        }
        if let Some(capacity) = capacity {
            self.irc.channels_per_connection = capacity;
        }
        if let Some(format) = nick_format {
            self.irc.nick_format = format.to_string();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_irc_config()
            .with_context(|| "IRC configuration validation failed")?;
        self.validate_daemon_config()
            .with_context(|| "Daemon configuration validation failed")?;
        Ok(())
    }

    fn validate_irc_config(&self) -> Result<()> {
        if !self.irc.nick_format.contains("{}") {
            bail!("nick_format must contain a {{}} sequence placeholder");
        }

        if self.irc.nick_format.len() <= 2 {
            bail!("nick_format must be more than just the placeholder");
        }

        if self.irc.channels_per_connection == 0 {
            bail!("channels_per_connection must be greater than 0");
        }

        if self.irc.channels_per_connection > 500 {
            bail!("channels_per_connection cannot exceed 500");
        }

        if self.irc.username.is_empty() {
            bail!("username must not be empty");
        }

        if self.irc.reconnect_delay.as_millis() == 0 {
            bail!("reconnect_delay must be greater than 0");
        }

        if self.irc.reconnect_delay.as_secs() > 600 {
            bail!("reconnect_delay cannot exceed 10 minutes");
        }

        Ok(())
    }

    fn validate_daemon_config(&self) -> Result<()> {
        if self.daemon.shutdown_timeout.as_secs() == 0 {
            bail!("shutdown_timeout must be greater than 0");
        }

        if self.daemon.shutdown_timeout.as_secs() > 300 {
            bail!("shutdown_timeout cannot exceed 5 minutes");
        }

        Ok(())
    }
}
