//! Connection Pool
//!
//! Top-level registry mapping server identity to its per-server allocator,
//! plus the supervisor that turns spawn requests into connection tasks.
//! Allocator entries are created lazily on the first channel request for a
//! server and released once that server's channel set drains and its last
//! connection has retired.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::allocator::{ChannelStatus, ConnectionAllocator, SpawnRequest};
use crate::config::Config;
use crate::connection::task;
use crate::error::PoolError;
use crate::metrics::Metrics;

/// Identity of one upstream server: normalized `(host, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerId {
    pub host: String,
    pub port: u16,
}

impl ServerId {
    /// Build a normalized identity: host trimmed and lowercased, so
    /// `IRC.Example.Net` and `irc.example.net` address the same pool entry.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.trim().to_ascii_lowercase(),
            port,
        }
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Process-wide state: one allocator per server, all mutation serialized
/// behind per-server mutexes. Control-plane calls and connection lifecycle
/// events go through the same locks, so they can never race on allocator
/// state.
pub struct Pool {
    config: Arc<Config>,
    metrics: Arc<Metrics>,
    servers: RwLock<HashMap<ServerId, Arc<Mutex<ConnectionAllocator>>>>,
    spawn_tx: mpsc::UnboundedSender<SpawnRequest>,
}

impl Pool {
    /// Create an empty pool. The returned receiver feeds [`Pool::supervise`];
    /// tests may hold it directly to observe spawn decisions.
    pub fn new(
        config: Arc<Config>,
        metrics: Arc<Metrics>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SpawnRequest>) {
        let (spawn_tx, spawn_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            config,
            metrics,
            servers: RwLock::new(HashMap::new()),
            spawn_tx,
        });
        (pool, spawn_rx)
    }

    /// Receive spawn requests and launch one connection task per request.
    /// Runs until the pool's spawn channel closes.
    pub async fn supervise(self: Arc<Self>, mut spawn_rx: mpsc::UnboundedReceiver<SpawnRequest>) {
        info!("Pool supervisor started");
        while let Some(request) = spawn_rx.recv().await {
            let Some(allocator) = self.allocator(&request.server).await else {
                // Server released between the request and now; nothing to do
                debug!(server = %request.server, "spawn request for released server, ignoring");
                continue;
            };
            debug!(server = %request.server, "launching connection task");
            tokio::spawn(task::run(
                request.server,
                allocator,
                self.config.irc.clone(),
                Arc::clone(&self.metrics),
                Arc::downgrade(&self),
            ));
        }
        info!("Pool supervisor stopped");
    }

    /// Look up a server's allocator without creating one.
    pub async fn allocator(&self, server: &ServerId) -> Option<Arc<Mutex<ConnectionAllocator>>> {
        self.servers.read().await.get(server).cloned()
    }

    async fn get_or_create(&self, server: &ServerId) -> Arc<Mutex<ConnectionAllocator>> {
        if let Some(allocator) = self.allocator(server).await {
            return allocator;
        }
        let mut servers = self.servers.write().await;
        servers
            .entry(server.clone())
            .or_insert_with(|| {
                info!(server = %server, "creating allocator for new server");
                Arc::new(Mutex::new(ConnectionAllocator::new(
                    server.clone(),
                    self.config.irc.nick_format.clone(),
                    self.config.irc.channels_per_connection,
                    self.spawn_tx.clone(),
                )))
            })
            .clone()
    }

    /// All servers the pool currently knows about, sorted for stable output.
    pub async fn servers(&self) -> Vec<ServerId> {
        let mut servers: Vec<ServerId> = self.servers.read().await.keys().cloned().collect();
        servers.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
        servers
    }

    /// Active channels on one server.
    pub async fn channels(&self, server: &ServerId) -> Result<Vec<String>, PoolError> {
        let allocator = self
            .allocator(server)
            .await
            .ok_or_else(|| PoolError::ServerNotFound(server.clone()))?;
        let allocator = allocator.lock().await;
        Ok(allocator.channels())
    }

    /// Live connection names on one server.
    pub async fn connections(&self, server: &ServerId) -> Result<Vec<String>, PoolError> {
        let allocator = self
            .allocator(server)
            .await
            .ok_or_else(|| PoolError::ServerNotFound(server.clone()))?;
        let allocator = allocator.lock().await;
        Ok(allocator.connection_names())
    }

    /// Channels confirmed on one named connection.
    pub async fn connection_channels(
        &self,
        server: &ServerId,
        name: &str,
    ) -> Result<Vec<String>, PoolError> {
        let allocator = self
            .allocator(server)
            .await
            .ok_or_else(|| PoolError::ServerNotFound(server.clone()))?;
        let allocator = allocator.lock().await;
        allocator
            .connection_channels(name)
            .ok_or_else(|| PoolError::ConnectionNotFound {
                server: server.clone(),
                name: name.to_string(),
            })
    }

    /// Add a channel, creating the server's allocator on first use. Returns
    /// immediately with the allocation verdict; the join itself confirms
    /// later through lifecycle events.
    pub async fn add_channel(&self, server: &ServerId, channel: &str) -> ChannelStatus {
        let allocator = self.get_or_create(server).await;
        let mut allocator = allocator.lock().await;
        allocator.add_channel(channel)
    }

    /// Remove a channel. A no-op for unknown servers or unmanaged channels.
    /// Releases the server entry once its channel set is empty, unless a
    /// connection is still tearing down; the connection task finishes the
    /// release in that case.
    pub async fn remove_channel(&self, server: &ServerId, channel: &str) {
        let Some(allocator) = self.allocator(server).await else {
            debug!(server = %server, channel, "remove for unknown server, ignoring");
            return;
        };
        {
            let mut allocator = allocator.lock().await;
            allocator.remove_channel(channel);
        }
        self.release_if_drained(server).await;
    }

    /// Send a message to a channel through whichever connection owns it.
    pub async fn send_message(
        &self,
        server: &ServerId,
        channel: &str,
        text: &str,
    ) -> Result<(), PoolError> {
        let allocator = self
            .allocator(server)
            .await
            .ok_or_else(|| PoolError::ChannelNotOwned {
                server: server.clone(),
                channel: channel.to_string(),
            })?;
        let allocator = allocator.lock().await;
        allocator.send_message(channel, text)?;
        self.metrics.message_sent();
        Ok(())
    }

    /// Drop a server entry once its channel set is empty and no connection
    /// is live. A server with a connection still leaving or quitting keeps
    /// its entry until that connection's task reports the disconnect and
    /// calls back in here.
    pub async fn release_if_drained(&self, server: &ServerId) {
        let mut servers = self.servers.write().await;
        if let Some(allocator) = servers.get(server) {
            let allocator = allocator.lock().await;
            if !allocator.has_channels() && allocator.live_connection_count() == 0 {
                info!(server = %server, "channel set empty, releasing server");
                drop(allocator);
                servers.remove(server);
            }
        }
    }

    /// Total live connections across all servers.
    pub async fn live_connection_count(&self) -> usize {
        let servers = self.servers.read().await;
        let mut count = 0;
        for allocator in servers.values() {
            count += allocator.lock().await.live_connection_count();
        }
        count
    }

    /// Gracefully retire every connection in the pool: disable reconnects,
    /// request quits everywhere, then wait for the live count to drain.
    pub async fn shutdown(&self, timeout: Duration) {
        {
            let servers = self.servers.read().await;
            for allocator in servers.values() {
                allocator.lock().await.retire_all();
            }
        }

        let start = Instant::now();
        let mut remaining = self.live_connection_count().await;
        info!(remaining, "waiting for connections to retire (timeout: {:?})", timeout);

        while remaining > 0 && start.elapsed() < timeout {
            tokio::time::sleep(Duration::from_millis(200)).await;
            remaining = self.live_connection_count().await;
        }

        if remaining == 0 {
            info!("all connections retired in {:?}", start.elapsed());
        } else {
            warn!(remaining, "shutdown timeout reached with connections still live");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;
    use std::sync::atomic::AtomicBool;

    fn test_pool() -> (
        Arc<Pool>,
        mpsc::UnboundedReceiver<SpawnRequest>,
    ) {
        let config = Arc::new(Config::default());
        let metrics = Arc::new(Metrics::new());
        Pool::new(config, metrics)
    }

    #[tokio::test]
    async fn test_server_id_normalization() {
        let a = ServerId::new("IRC.Example.Net ", 6667);
        let b = ServerId::new("irc.example.net", 6667);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "irc.example.net:6667");
    }

    #[tokio::test]
    async fn test_lazy_creation_and_release() {
        let (pool, mut spawn_rx) = test_pool();
        let server = ServerId::new("irc.example.net", 6667);

        assert!(pool.servers().await.is_empty());

        let status = pool.add_channel(&server, "#a").await;
        assert_eq!(status, ChannelStatus::Pending);
        assert_eq!(pool.servers().await, vec![server.clone()]);
        assert_eq!(spawn_rx.try_recv().unwrap().server, server);

        // Removing the only channel drains and releases the server
        pool.remove_channel(&server, "#a").await;
        assert!(pool.servers().await.is_empty());
        assert!(matches!(
            pool.channels(&server).await,
            Err(PoolError::ServerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_fail_for_unknown_server_and_connection() {
        let (pool, _spawn_rx) = test_pool();
        let server = ServerId::new("irc.example.net", 6667);

        assert!(pool.channels(&server).await.is_err());
        assert!(pool.connections(&server).await.is_err());

        pool.add_channel(&server, "#a").await;
        assert!(matches!(
            pool.connection_channels(&server, "herd-9").await,
            Err(PoolError::ConnectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_release_deferred_while_connection_tears_down() {
        let (pool, _spawn_rx) = test_pool();
        let server = ServerId::new("irc.example.net", 6667);
        pool.add_channel(&server, "#a").await;

        let allocator = pool.allocator(&server).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let name = {
            let mut allocator = allocator.lock().await;
            let name = allocator.allocate_name().unwrap();
            allocator.on_connected(ConnectionHandle::new(
                name.clone(),
                tx,
                Arc::new(AtomicBool::new(true)),
            ));
            allocator.on_joined(&name, "#a");
            name
        };

        // The PART is still in flight: the server must stay addressable so
        // the leave and disconnect confirmations have somewhere to land
        pool.remove_channel(&server, "#a").await;
        assert!(pool.allocator(&server).await.is_some());
        assert_eq!(pool.servers().await, vec![server.clone()]);

        // Teardown completes; now the entry can go
        {
            let mut allocator = allocator.lock().await;
            allocator.on_left(&name, "#a");
            allocator.on_disconnected(&name);
        }
        pool.release_if_drained(&server).await;
        assert!(pool.allocator(&server).await.is_none());
    }

    #[tokio::test]
    async fn test_send_message_to_unmanaged_channel() {
        let (pool, _spawn_rx) = test_pool();
        let server = ServerId::new("irc.example.net", 6667);

        assert!(matches!(
            pool.send_message(&server, "#z", "hello").await,
            Err(PoolError::ChannelNotOwned { .. })
        ));
    }

    #[tokio::test]
    async fn test_message_flows_once_channel_is_active() {
        let (pool, _spawn_rx) = test_pool();
        let server = ServerId::new("irc.example.net", 6667);
        pool.add_channel(&server, "#a").await;

        // Simulate the connection task identifying and confirming the join
        let allocator = pool.allocator(&server).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut allocator = allocator.lock().await;
            let name = allocator.allocate_name().unwrap();
            allocator.on_connected(ConnectionHandle::new(
                name.clone(),
                tx,
                Arc::new(AtomicBool::new(true)),
            ));
            allocator.on_joined(&name, "#a");
        }
        while rx.try_recv().is_ok() {} // drop the join command

        pool.send_message(&server, "#a", "hello").await.unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
