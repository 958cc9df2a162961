//! Connection Allocator
//!
//! Per-server policy engine: decides which connection serves which channel,
//! when to spawn a new connection, when to retire an idle one, and how to
//! name new connections uniquely. Packing is strict first-fit over live
//! connections in insertion order.

use std::collections::{HashMap, VecDeque};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::error::PoolError;
use crate::pool::ServerId;

/// Highest sequence number tried by the naming policy before giving up.
const MAX_NAME_SEQUENCE: usize = 9999;

/// Outcome of an add-channel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The channel already has a confirmed connection.
    Active,
    /// The channel is queued on an existing or not-yet-established
    /// connection; confirmation arrives later via lifecycle events.
    Pending,
}

/// Request for the supervisor to establish one new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub server: ServerId,
}

/// Manages connection allocation for one server.
///
/// All mutation must be serialized behind the pool's per-server mutex;
/// the allocator itself is single-threaded by design.
pub struct ConnectionAllocator {
    server: ServerId,
    nick_format: String,
    capacity: usize,

    /// Live (identified) connections, in insertion order. First-fit scans
    /// this order.
    connections: Vec<ConnectionHandle>,

    /// Confirmed channels, mapped to the owning connection's name.
    active: HashMap<String, String>,

    /// Channels whose join was requested on a specific live connection but
    /// not yet confirmed.
    pending_existing: HashMap<String, String>,

    /// Channels waiting for a connection that does not exist yet. Non-empty
    /// implies exactly one establishment in flight.
    pending_new: VecDeque<String>,

    spawn_in_flight: bool,
    spawn_tx: mpsc::UnboundedSender<SpawnRequest>,
}

impl ConnectionAllocator {
    pub fn new(
        server: ServerId,
        nick_format: String,
        capacity: usize,
        spawn_tx: mpsc::UnboundedSender<SpawnRequest>,
    ) -> Self {
        Self {
            server,
            nick_format,
            capacity,
            connections: Vec::new(),
            active: HashMap::new(),
            pending_existing: HashMap::new(),
            pending_new: VecDeque::new(),
            spawn_in_flight: false,
            spawn_tx,
        }
    }

    pub fn server(&self) -> &ServerId {
        &self.server
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True while any channel is active or queued on this server.
    pub fn has_channels(&self) -> bool {
        !self.active.is_empty() || !self.pending_existing.is_empty() || !self.pending_new.is_empty()
    }

    pub fn live_connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether a nickname is held by a currently-live connection.
    pub fn name_in_use(&self, name: &str) -> bool {
        self.connections.iter().any(|c| c.name() == name)
    }

    /// Return an unused nickname for a newly created connection: the naming
    /// template with the lowest free sequence number substituted in.
    pub fn allocate_name(&self) -> Result<String, PoolError> {
        for sequence in 1..=MAX_NAME_SEQUENCE {
            let name = self.nick_format.replace("{}", &sequence.to_string());
            if !self.name_in_use(&name) {
                return Ok(name);
            }
        }
        Err(PoolError::NameExhausted {
            server: self.server.clone(),
            format: self.nick_format.clone(),
        })
    }

    /// Add a channel to this server's pool. Returns `Active` if a
    /// connection already carries it, `Pending` otherwise; idempotent.
    pub fn add_channel(&mut self, channel: &str) -> ChannelStatus {
        if self.active.contains_key(channel) {
            return ChannelStatus::Active;
        }
        if self.pending_existing.contains_key(channel)
            || self.pending_new.iter().any(|c| c == channel)
        {
            return ChannelStatus::Pending;
        }

        // First-fit over live connections
        for conn in &mut self.connections {
            if conn.load() < self.capacity {
                debug!(server = %self.server, channel, connection = %conn.name(),
                       "assigning channel to existing connection");
                conn.request_join(channel);
                self.pending_existing
                    .insert(channel.to_string(), conn.name().to_string());
                return ChannelStatus::Pending;
            }
        }

        // No spare capacity anywhere; queue for a new connection
        debug!(server = %self.server, channel, "queueing channel for a new connection");
        self.pending_new.push_back(channel.to_string());
        self.maybe_spawn();
        ChannelStatus::Pending
    }

    /// Remove a channel from whichever state it is in. No-op for an
    /// unmanaged channel. A connection left without channels is retired.
    pub fn remove_channel(&mut self, channel: &str) {
        // Still waiting for a new connection: just drop it from the queue.
        // The establishment, if any, is not aborted; the connection will
        // simply come up with less to do.
        self.pending_new.retain(|c| c != channel);

        if let Some(owner) = self.pending_existing.remove(channel) {
            debug!(server = %self.server, channel, connection = %owner,
                   "dropping channel with join still in flight");
            let server = self.server.clone();
            if let Some(conn) = self.connection_mut(&owner) {
                conn.abandon_pending_join(channel);
                // The join may still land; the quit undoes it either way.
                if conn.is_idle() {
                    info!(server = %server, connection = %owner,
                          "last channel removed before its join confirmed, retiring connection");
                    conn.set_auto_reconnect(false);
                    conn.request_quit();
                }
            }
        }

        if let Some(owner) = self.active.remove(channel) {
            let server = self.server.clone();
            if let Some(conn) = self.connection_mut(&owner) {
                // Disable reconnect before the teardown starts so a racing
                // reconnect cannot undo it; the quit itself follows once
                // the leave confirms.
                if conn.load() == 1 {
                    info!(server = %server, connection = %owner,
                          "last channel removed, marking connection for retirement");
                    conn.set_auto_reconnect(false);
                }
                conn.request_leave(channel);
            }
        }
    }

    /// A new connection finished its handshake. Drain up to `capacity`
    /// queued channels onto it, then spawn again if the queue still has
    /// entries.
    pub fn on_connected(&mut self, mut handle: ConnectionHandle) {
        self.spawn_in_flight = false;

        let mut assigned = 0;
        while assigned < self.capacity {
            let Some(channel) = self.pending_new.pop_front() else {
                break;
            };
            handle.request_join(&channel);
            self.pending_existing
                .insert(channel, handle.name().to_string());
            assigned += 1;
        }

        info!(server = %self.server, connection = %handle.name(), assigned,
              "connection identified");
        self.connections.push(handle);
        self.maybe_spawn();
    }

    /// A connection confirmed joining a channel.
    pub fn on_joined(&mut self, name: &str, channel: &str) {
        match self.pending_existing.get(channel) {
            Some(owner) if owner == name => {
                self.pending_existing.remove(channel);
                self.active.insert(channel.to_string(), name.to_string());
                if let Some(conn) = self.connection_mut(name) {
                    conn.confirm_join(channel);
                }
                debug!(server = %self.server, channel, connection = %name, "channel active");
            }
            _ => {
                // The channel was removed (or reassigned) while the join was
                // in flight; undo it on the wire so books and server agree.
                warn!(server = %self.server, channel, connection = %name,
                      "join confirmed for unmanaged channel, leaving it");
                if let Some(conn) = self.connection(name) {
                    conn.request_leave(channel);
                }
            }
        }
    }

    /// A connection confirmed leaving a channel, whether it parted on
    /// request or was kicked. An idle connection is asked to quit; its
    /// reconnect flag decides whether it comes back.
    pub fn on_left(&mut self, name: &str, channel: &str) {
        self.active.remove(channel);
        self.pending_existing.remove(channel);

        let server = self.server.clone();
        if let Some(conn) = self.connection_mut(name) {
            conn.confirm_leave(channel);
            if conn.is_idle() {
                debug!(server = %server, connection = %name,
                       "connection has no channels left, requesting quit");
                conn.request_quit();
            }
        }
    }

    /// A connection dropped, expectedly or not. Channels it still owned are
    /// re-queued for a fresh connection so they survive the drop.
    pub fn on_disconnected(&mut self, name: &str) {
        let Some(position) = self.connections.iter().position(|c| c.name() == name) else {
            debug!(server = %self.server, connection = %name,
                   "disconnect for unknown connection");
            return;
        };
        let handle = self.connections.remove(position);

        let mut orphaned: Vec<String> = self
            .active
            .iter()
            .chain(self.pending_existing.iter())
            .filter(|(_, owner)| owner.as_str() == name)
            .map(|(channel, _)| channel.clone())
            .collect();
        orphaned.sort();

        for channel in orphaned {
            self.active.remove(&channel);
            self.pending_existing.remove(&channel);
            self.pending_new.push_back(channel);
        }

        if !self.pending_new.is_empty() {
            info!(server = %self.server, connection = %name,
                  requeued = self.pending_new.len(),
                  "connection lost, channels re-queued");
        }

        // A reconnecting connection is itself the one establishment in
        // flight; only spawn when nothing will come back on its own.
        if handle.auto_reconnect() && !self.pending_new.is_empty() {
            self.spawn_in_flight = true;
        }
        self.maybe_spawn();
    }

    /// Route a message to whichever connection owns the channel.
    pub fn send_message(&self, channel: &str, text: &str) -> Result<(), PoolError> {
        let owner = self
            .active
            .get(channel)
            .and_then(|name| self.connection(name))
            .ok_or_else(|| PoolError::ChannelNotOwned {
                server: self.server.clone(),
                channel: channel.to_string(),
            })?;
        owner.request_send(channel, text);
        Ok(())
    }

    /// Active channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.active.keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Live connection names, in insertion order.
    pub fn connection_names(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.name().to_string()).collect()
    }

    /// Confirmed channels of one connection, or `None` if the name is not
    /// live.
    pub fn connection_channels(&self, name: &str) -> Option<Vec<String>> {
        self.connection(name).map(|c| c.channels())
    }

    /// Retire every connection: disable reconnects, then quit them all.
    /// Used for daemon shutdown.
    pub fn retire_all(&self) {
        for conn in &self.connections {
            conn.set_auto_reconnect(false);
            conn.request_quit();
        }
    }

    fn connection(&self, name: &str) -> Option<&ConnectionHandle> {
        self.connections.iter().find(|c| c.name() == name)
    }

    fn connection_mut(&mut self, name: &str) -> Option<&mut ConnectionHandle> {
        self.connections.iter_mut().find(|c| c.name() == name)
    }

    fn maybe_spawn(&mut self) {
        if self.pending_new.is_empty() || self.spawn_in_flight {
            return;
        }
        info!(server = %self.server, queued = self.pending_new.len(),
              "establishing a new connection");
        self.spawn_in_flight = true;
        if self
            .spawn_tx
            .send(SpawnRequest {
                server: self.server.clone(),
            })
            .is_err()
        {
            // Only happens while the pool is tearing down.
            warn!(server = %self.server, "spawn channel closed, cannot establish connection");
        }
    }
}
