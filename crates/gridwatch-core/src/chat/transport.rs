//! Transport seam between the conversation and the backend

use bytes::Bytes;
use futures::stream::BoxStream;

use super::client::ChatClient;
use super::error::ChatError;
use super::types::{ServerId, TurnRequest};

/// Raw SSE body, chunked however the network delivered it
pub type ByteStream = BoxStream<'static, Result<Bytes, ChatError>>;

/// Backend calls a conversation depends on
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Create a new server-side thread
    async fn create_thread(&self) -> Result<ServerId, ChatError>;

    /// Submit a turn and open its event stream
    async fn submit_turn(&self, request: &TurnRequest) -> Result<ByteStream, ChatError>;
}

#[async_trait::async_trait]
impl ChatTransport for ChatClient {
    async fn create_thread(&self) -> Result<ServerId, ChatError> {
        ChatClient::create_thread(self).await
    }

    async fn submit_turn(&self, request: &TurnRequest) -> Result<ByteStream, ChatError> {
        ChatClient::submit_turn(self, request).await
    }
}
