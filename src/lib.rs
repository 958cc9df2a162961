//! Botherd Library
//!
//! A daemon that maintains a pool of IRC client connections and spreads
//! channel memberships across them, growing and shrinking the pool as
//! channels come and go. Channels are managed at runtime through an
//! HTTP control API.

pub mod allocator;
pub mod config;
pub mod connection;
pub mod control;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod protocol;
pub mod shutdown;

pub use config::Config;
pub use error::PoolError;
pub use pool::{Pool, ServerId};
pub use shutdown::ShutdownCoordinator;

/// Common error type for the daemon
pub type Result<T> = anyhow::Result<T>;
