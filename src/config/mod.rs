//! Configuration Module
//!
//! Handles configuration loading, validation, and override layering.

pub mod manager;
pub mod types;

pub use manager::ConfigManager;
pub use types::*;
