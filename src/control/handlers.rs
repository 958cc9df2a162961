//! Control API Handlers

use super::types::*;
use crate::allocator::ChannelStatus;
use crate::metrics::Metrics;
use crate::pool::{Pool, ServerId};
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::info;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<Pool>,
    pub metrics: Arc<Metrics>,
    pub start_time: SystemTime,
}

impl AppState {
    fn uptime_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Health check handler
pub async fn health_check() -> Json<ApiResponse<HealthStatus>> {
    let health = HealthStatus {
        status: "healthy".to_string(),
        timestamp: SystemTime::now(),
    };
    Json(ApiResponse::success(health))
}

/// Get daemon status
pub async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<DaemonStatus>> {
    let status = DaemonStatus {
        uptime_seconds: state.uptime_seconds(),
        servers: state.pool.servers().await.len(),
        active_connections: state.metrics.snapshot().active_connections,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    Json(ApiResponse::success(status))
}

/// Get statistics summary
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<StatsSummary>> {
    let stats = StatsSummary {
        uptime_seconds: state.uptime_seconds(),
        servers: state.pool.servers().await.len(),
        counters: state.metrics.snapshot(),
    };
    Json(ApiResponse::success(stats))
}

/// Export metrics in Prometheus text format
pub async fn export_metrics(State(state): State<AppState>) -> String {
    state.metrics.export_prometheus()
}

/// List all servers the pool knows about
pub async fn list_servers(State(state): State<AppState>) -> Json<ApiResponse<Vec<ServerId>>> {
    Json(ApiResponse::success(state.pool.servers().await))
}

/// List active channels on one server
pub async fn list_channels(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, u16)>,
) -> Json<ApiResponse<Vec<String>>> {
    let server = ServerId::new(&host, port);
    match state.pool.channels(&server).await {
        Ok(channels) => Json(ApiResponse::success(channels)),
        Err(e) => Json(ApiResponse::error(e.to_string())),
    }
}

/// List live connection names on one server
pub async fn list_connections(
    State(state): State<AppState>,
    Path((host, port)): Path<(String, u16)>,
) -> Json<ApiResponse<Vec<String>>> {
    let server = ServerId::new(&host, port);
    match state.pool.connections(&server).await {
        Ok(connections) => Json(ApiResponse::success(connections)),
        Err(e) => Json(ApiResponse::error(e.to_string())),
    }
}

/// List the channels one named connection has joined
pub async fn list_connection_channels(
    State(state): State<AppState>,
    Path((host, port, name)): Path<(String, u16, String)>,
) -> Json<ApiResponse<Vec<String>>> {
    let server = ServerId::new(&host, port);
    match state.pool.connection_channels(&server, &name).await {
        Ok(channels) => Json(ApiResponse::success(channels)),
        Err(e) => Json(ApiResponse::error(e.to_string())),
    }
}

/// Add a channel to the pool. Returns immediately; `already_active` is true
/// when the channel already had a confirmed connection, false when the call
/// left it pending.
pub async fn add_channel(
    State(state): State<AppState>,
    Json(request): Json<AddChannelRequest>,
) -> Json<ApiResponse<AddChannelResponse>> {
    if request.channel.is_empty() {
        return Json(ApiResponse::error("channel must not be empty".to_string()));
    }

    let server = ServerId::new(&request.host, request.port);
    let status = state.pool.add_channel(&server, &request.channel).await;

    info!(server = %server, channel = %request.channel, ?status, "channel added via control API");
    Json(ApiResponse::success(AddChannelResponse {
        server,
        channel: request.channel,
        already_active: status == ChannelStatus::Active,
    }))
}

/// Remove a channel from the pool. Always acknowledged; a no-op for
/// channels the pool never managed.
pub async fn remove_channel(
    State(state): State<AppState>,
    Json(request): Json<RemoveChannelRequest>,
) -> Json<ApiResponse<()>> {
    let server = ServerId::new(&request.host, request.port);
    state.pool.remove_channel(&server, &request.channel).await;

    info!(server = %server, channel = %request.channel, "channel removed via control API");
    Json(ApiResponse::success(()))
}

/// Send a message to a channel. Fails when the channel has no active
/// connection; pending channels cannot carry messages yet.
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Json<ApiResponse<()>> {
    let server = ServerId::new(&request.host, request.port);
    match state
        .pool
        .send_message(&server, &request.channel, &request.text)
        .await
    {
        Ok(()) => Json(ApiResponse::success(())),
        Err(e) => Json(ApiResponse::error(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn create_test_state() -> AppState {
        let config = Arc::new(Config::default());
        let metrics = Arc::new(Metrics::new());
        let (pool, spawn_rx) = Pool::new(config, Arc::clone(&metrics));
        // Keep the spawn channel open without a supervisor
        std::mem::forget(spawn_rx);
        AppState {
            pool,
            metrics,
            start_time: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert!(response.0.success);
        assert!(response.0.data.is_some());
    }

    #[tokio::test]
    async fn test_get_status() {
        let state = create_test_state();
        let response = get_status(State(state)).await;
        assert!(response.0.success);
        assert_eq!(response.0.data.unwrap().servers, 0);
    }

    #[tokio::test]
    async fn test_add_channel_then_listed() {
        let state = create_test_state();
        let request = AddChannelRequest {
            host: "irc.example.net".to_string(),
            port: 6667,
            channel: "#commits".to_string(),
        };

        let response = add_channel(State(state.clone()), Json(request)).await;
        assert!(response.0.success);
        assert!(!response.0.data.unwrap().already_active);

        let servers = list_servers(State(state.clone())).await;
        assert_eq!(
            servers.0.data.unwrap(),
            vec![ServerId::new("irc.example.net", 6667)]
        );

        // Still pending, so the active channel list is empty
        let channels = list_channels(
            State(state),
            Path(("irc.example.net".to_string(), 6667)),
        )
        .await;
        assert!(channels.0.success);
        assert!(channels.0.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_channel_rejects_empty_name() {
        let state = create_test_state();
        let request = AddChannelRequest {
            host: "irc.example.net".to_string(),
            port: 6667,
            channel: String::new(),
        };
        let response = add_channel(State(state), Json(request)).await;
        assert!(!response.0.success);
    }

    #[tokio::test]
    async fn test_list_channels_unknown_server() {
        let state = create_test_state();
        let response = list_channels(
            State(state),
            Path(("irc.nowhere.net".to_string(), 6667)),
        )
        .await;
        assert!(!response.0.success);
        assert!(response.0.error.unwrap().contains("unknown server"));
    }

    #[tokio::test]
    async fn test_remove_channel_is_always_acknowledged() {
        let state = create_test_state();
        let request = RemoveChannelRequest {
            host: "irc.example.net".to_string(),
            port: 6667,
            channel: "#never-added".to_string(),
        };
        let response = remove_channel(State(state), Json(request)).await;
        assert!(response.0.success);
    }

    #[tokio::test]
    async fn test_send_message_to_unowned_channel() {
        let state = create_test_state();
        let request = SendMessageRequest {
            host: "irc.example.net".to_string(),
            port: 6667,
            channel: "#z".to_string(),
            text: "hello".to_string(),
        };
        let response = send_message(State(state), Json(request)).await;
        assert!(!response.0.success);
        assert!(response.0.error.unwrap().contains("no active connection"));
    }
}
