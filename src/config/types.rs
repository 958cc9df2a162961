//! Configuration Types

use crate::control::types::ApiAuthConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub irc: IrcConfig,
    pub control_api: ControlApiConfig,
}

/// Daemon-wide settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    pub log_level: String,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// IRC connection settings shared by every connection in the pool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IrcConfig {
    /// Nickname template; `{}` is replaced with an increasing sequence
    /// number until a free name is found.
    pub nick_format: String,
    /// Capacity: how many channels one connection may hold.
    pub channels_per_connection: usize,
    pub username: String,
    pub realname: String,
    pub quit_message: String,
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

/// Control API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlApiConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
    pub auth: ApiAuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig {
                log_level: "info".to_string(),
                shutdown_timeout: Duration::from_secs(30),
            },
            irc: IrcConfig {
                nick_format: "herd-{}".to_string(),
                channels_per_connection: 15,
                username: "botherd".to_string(),
                realname: "botherd channel pool".to_string(),
                quit_message: "retiring".to_string(),
                reconnect_delay: Duration::from_secs(5),
            },
            control_api: ControlApiConfig {
                enabled: true,
                // Loopback only: the control plane does not authenticate
                // its callers beyond the API auth layer.
                bind_addr: "127.0.0.1:8430".parse().expect("valid default bind addr"),
                auth: ApiAuthConfig::default(),
            },
        }
    }
}
