//! Thread creation

use serde_json::Value;
use tracing::{debug, info};

use super::core::ChatClient;
use crate::chat::error::ChatError;
use crate::chat::retry::with_retry;
use crate::chat::types::ServerId;

impl ChatClient {
    /// Create a server-side thread, retrying transient failures
    pub async fn create_thread(&self) -> Result<ServerId, ChatError> {
        let thread_id =
            with_retry(&self.config().thread_retry, || self.create_thread_once()).await?;
        info!("Created thread {}", thread_id);
        Ok(thread_id)
    }

    async fn create_thread_once(&self) -> Result<ServerId, ChatError> {
        let url = self.config().thread_url();
        debug!("Creating thread at {}", url);

        let response = self.build_request(&url).send().await?;
        let response = self.handle_error_response(response).await?;
        let body: Value = response.json().await?;

        body.get("thread_id")
            .and_then(ServerId::from_value)
            .ok_or_else(|| {
                ChatError::InvalidResponse(format!(
                    "thread creation returned no thread_id: {}",
                    body
                ))
            })
    }
}
