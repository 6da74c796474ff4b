//! Chat backend client
//!
//! HTTP client for the two backend calls a conversation needs:
//! - thread creation (`POST`, JSON response)
//! - turn submission (`POST`, text/event-stream response)

pub mod config;
pub mod core;
pub mod streaming;
pub mod thread;

// Re-export main types
pub use config::{ChatClientConfig, ConfigError};
pub use core::ChatClient;
