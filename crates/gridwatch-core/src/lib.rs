//! Gridwatch Core - Client library for the grid analytics chat backend
//!
//! This crate provides the conversational protocol client used by the
//! Gridwatch CLI:
//! - Incremental SSE frame decoding
//! - Typed chat events and their effect on the transcript
//! - Thread continuity across turns
//! - Turn orchestration with cancellation

pub mod chat;
pub mod constants;
pub mod paths;

// Re-exports for convenience
pub use chat::{
    ChatClient, ChatClientConfig, ChatError, ChatTransport, Conversation, Message, MessageStatus,
    Role, ServerId, TranscriptUpdate,
};
