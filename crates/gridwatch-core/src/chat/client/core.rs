//! Core chat client
//!
//! Owns the HTTP client and shared request/response handling.

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use tracing::{error, info};

use super::config::ChatClientConfig;
use crate::chat::error::ChatError;
use crate::chat::retry::parse_retry_after;

/// HTTP client for the chat backend
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    config: ChatClientConfig,
}

impl ChatClient {
    /// Create the HTTP client with timeouts suited to long SSE streams
    fn create_http_client(config: &ChatClientConfig) -> Client {
        Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .timeout(config.stream_timeout())
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build HTTP client: {}. Using default client.", e);
                Client::new()
            })
    }

    pub fn new(config: ChatClientConfig) -> Self {
        info!("Chat client targeting {}", config.base_url);
        Self {
            http: Self::create_http_client(&config),
            config,
        }
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }

    /// POST request with common headers
    pub(crate) fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.post(url).header(CONTENT_TYPE, "application/json")
    }

    /// Pass through success responses; turn anything else into [`ChatError::Status`]
    pub(crate) async fn handle_error_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        error!("API error response: {} - {}", status, body);

        Err(ChatError::Status {
            status: status.as_u16(),
            body,
            retry_after,
        })
    }
}
