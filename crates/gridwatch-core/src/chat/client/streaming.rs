//! Turn submission
//!
//! Posts a turn and hands back the raw SSE body as a byte stream. Decoding is
//! left to the caller so it can run inline with transcript updates.

use std::time::Instant;

use futures::StreamExt;
use reqwest::header::ACCEPT;
use tracing::info;

use super::core::ChatClient;
use crate::chat::error::ChatError;
use crate::chat::transport::ByteStream;
use crate::chat::types::TurnRequest;

impl ChatClient {
    /// Submit a turn and open its event stream
    pub async fn submit_turn(&self, request: &TurnRequest) -> Result<ByteStream, ChatError> {
        let call_start = Instant::now();
        info!(
            "Submitting turn: thread_id={:?}, parent_message_id={}, {} chars",
            request.thread_id,
            request.parent_message_id,
            request.query.len()
        );

        let response = self
            .build_request(&self.config().stream_url())
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        info!(
            "Turn response: {} in {:?}",
            response.status(),
            call_start.elapsed()
        );
        let response = self.handle_error_response(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::StreamRead(e.to_string())))
            .boxed())
    }
}
