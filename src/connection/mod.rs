//! Connection Module
//!
//! One IRC client connection: the allocator-side handle and the tokio task
//! that drives the socket and the reconnect policy.

pub mod handle;
pub mod task;

pub use handle::{ConnectionCommand, ConnectionHandle};
