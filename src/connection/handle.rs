//! Allocator-side view of one live connection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

/// Commands the allocator sends to a connection's I/O task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    Join { channel: String },
    Leave { channel: String },
    Send { channel: String, text: String },
    Quit,
}

/// The allocator's record of one identified connection: its name, which
/// channels it has confirmed, which joins are still in flight, and the
/// mailbox for issuing commands to the I/O task.
#[derive(Debug)]
pub struct ConnectionHandle {
    name: String,
    channels: HashSet<String>,
    pending_joins: HashSet<String>,
    auto_reconnect: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<ConnectionCommand>,
}

impl ConnectionHandle {
    pub fn new(
        name: String,
        commands: mpsc::UnboundedSender<ConnectionCommand>,
        auto_reconnect: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name,
            channels: HashSet::new(),
            pending_joins: HashSet::new(),
            auto_reconnect,
            commands,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Confirmed channels, sorted for stable listings.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.channels.iter().cloned().collect();
        channels.sort();
        channels
    }

    /// Occupied capacity slots: confirmed joins plus joins still in flight.
    pub fn load(&self) -> usize {
        self.channels.len() + self.pending_joins.len()
    }

    /// True once the connection holds no channels at all, confirmed or
    /// requested.
    pub fn is_idle(&self) -> bool {
        self.channels.is_empty() && self.pending_joins.is_empty()
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::Relaxed)
    }

    /// Flip the reconnect policy. Disabled right before an intentional quit
    /// so a racing reconnect cannot undo the teardown.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::Relaxed);
    }

    pub fn request_join(&mut self, channel: &str) {
        self.pending_joins.insert(channel.to_string());
        self.send_command(ConnectionCommand::Join {
            channel: channel.to_string(),
        });
    }

    pub fn request_leave(&self, channel: &str) {
        self.send_command(ConnectionCommand::Leave {
            channel: channel.to_string(),
        });
    }

    pub fn request_send(&self, channel: &str, text: &str) {
        self.send_command(ConnectionCommand::Send {
            channel: channel.to_string(),
            text: text.to_string(),
        });
    }

    pub fn request_quit(&self) {
        self.send_command(ConnectionCommand::Quit);
    }

    /// A requested join was confirmed by the server.
    pub fn confirm_join(&mut self, channel: &str) {
        self.pending_joins.remove(channel);
        self.channels.insert(channel.to_string());
    }

    /// The connection is no longer in the channel, whether it parted or was
    /// kicked before the join even confirmed.
    pub fn confirm_leave(&mut self, channel: &str) {
        self.pending_joins.remove(channel);
        self.channels.remove(channel);
    }

    /// Drop a pending join whose channel was removed before confirmation,
    /// freeing its capacity slot.
    pub fn abandon_pending_join(&mut self, channel: &str) {
        self.pending_joins.remove(channel);
    }

    fn send_command(&self, command: ConnectionCommand) {
        // A closed mailbox means the I/O task already died; the allocator
        // will hear about it through on_disconnected.
        if self.commands.send(command).is_err() {
            warn!(connection = %self.name, "command mailbox closed, connection is going down");
        }
    }
}
