//! IRC Protocol Subset
//!
//! Line formatting and parsing for the handful of lifecycle signals the
//! connection state machine needs. Everything else inbound is ignored.

pub mod constants;
pub mod message;

pub use constants::*;
pub use message::{parse_line, ClientMessage, ServerEvent};
