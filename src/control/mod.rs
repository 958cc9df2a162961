//! Control Plane Module
//!
//! Synchronous HTTP/JSON facade over the pool: list servers, channels and
//! connections, add/remove channels, send messages. Calls mutate allocator
//! state and return immediately; join/leave confirmations arrive later via
//! connection lifecycle events.

pub mod api;
pub mod auth;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::ControlApi;
pub use auth::ApiAuth;
pub use server::ControlServer;
pub use types::*;
