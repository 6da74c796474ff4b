//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// HTTP client configuration
pub mod http {
    use super::*;

    /// Connection timeout for HTTP requests
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Streaming timeout - a turn that runs SQL and renders charts can take minutes
    pub const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

    /// User agent sent with every request
    pub const USER_AGENT: &str = "Gridwatch/0.1";
}

/// Chat backend endpoints
pub mod api {
    /// Default backend base URL
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

    /// Thread creation endpoint (POST, empty body)
    pub const THREAD_PATH: &str = "/api/threads";

    /// Turn submission endpoint (POST, text/event-stream response)
    pub const STREAM_PATH: &str = "/api/chat/stream";

    /// `parent_message_id` sent on the first turn of a conversation
    pub const FIRST_TURN_PARENT_ID: i64 = 0;
}

/// Transcript configuration
pub mod transcript {
    /// Content shown when a turn fails without a usable error body
    pub const GENERIC_ERROR: &str = "The request failed before a response was received.";

    /// Content shown when a turn is cancelled or abandoned mid-stream
    pub const CANCELLED: &str = "Request cancelled";
}

/// Config file locations
pub mod config {
    /// Config directory name under the platform config dir
    pub const CONFIG_DIR_NAME: &str = "gridwatch";

    /// Config file name
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// Environment variable that overrides the backend base URL
    pub const BASE_URL_ENV: &str = "GRIDWATCH_BASE_URL";
}
