//! Caller-facing error taxonomy for the pool and control plane.

use crate::pool::ServerId;
use thiserror::Error;

/// Errors surfaced to control-plane callers.
///
/// Transport-level failures (an unexpected disconnect, a stalled handshake)
/// are handled internally by the reconnect and re-queue policies and never
/// appear here.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A read query named a server the pool has never seen (or has released).
    #[error("unknown server {0}")]
    ServerNotFound(ServerId),

    /// A read query named a connection that is not live on the given server.
    #[error("unknown connection {name} on {server}")]
    ConnectionNotFound { server: ServerId, name: String },

    /// A message was sent to a channel with no active connection. Channels
    /// that are still pending cannot carry messages yet.
    #[error("channel {channel} has no active connection on {server}")]
    ChannelNotOwned { server: ServerId, channel: String },

    /// The naming policy ran out of free nicknames. This implies a leaked or
    /// stuck connection and is treated as fatal for the server.
    #[error("no free connection name under format {format:?} on {server}")]
    NameExhausted { server: ServerId, format: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let server = ServerId::new("irc.example.net", 6667);
        let err = PoolError::ChannelNotOwned {
            server: server.clone(),
            channel: "#commits".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "channel #commits has no active connection on irc.example.net:6667"
        );

        let err = PoolError::ServerNotFound(server);
        assert!(err.to_string().contains("irc.example.net:6667"));
    }
}
