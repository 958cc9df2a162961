//! Control API Types

use crate::metrics::MetricsSnapshot;
use crate::pool::ServerId;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: SystemTime::now(),
        }
    }
}

/// Daemon status information
#[derive(Debug, Serialize)]
pub struct DaemonStatus {
    pub uptime_seconds: u64,
    pub servers: usize,
    pub active_connections: i64,
    pub version: String,
}

/// Statistics summary for the `/stats` endpoint
#[derive(Debug, Serialize)]
pub struct StatsSummary {
    pub uptime_seconds: u64,
    pub servers: usize,
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
}

/// Add-channel request body
#[derive(Debug, Deserialize)]
pub struct AddChannelRequest {
    pub host: String,
    pub port: u16,
    pub channel: String,
}

/// Add-channel verdict: `already_active` mirrors the allocator's
/// `Active`/`Pending` result (true = the channel already had a connection).
#[derive(Debug, Serialize)]
pub struct AddChannelResponse {
    pub server: ServerId,
    pub channel: String,
    pub already_active: bool,
}

/// Remove-channel request body
#[derive(Debug, Deserialize)]
pub struct RemoveChannelRequest {
    pub host: String,
    pub port: u16,
    pub channel: String,
}

/// Send-message request body
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub text: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: SystemTime,
}

/// API authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiAuthConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub basic_auth: Option<BasicAuthConfig>,
}

/// Basic authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

impl Default for ApiAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: Some("default-api-key-change-me".to_string()),
            basic_auth: None,
        }
    }
}
