//! Streaming chat protocol layer
//!
//! Talks to the grid analytics chat backend: creates threads, submits turns,
//! decodes the SSE reply stream, and folds it into a live transcript.

pub mod client;
pub mod conversation;
pub mod error;
pub mod events;
pub mod retry;
pub mod sse;
pub mod thread;
pub mod transport;
pub mod types;

// Transcript state
pub mod accumulator;

pub use accumulator::{Accumulator, TranscriptUpdate};
pub use client::{ChatClient, ChatClientConfig, ConfigError};
pub use conversation::Conversation;
pub use error::{ChatError, DecodeError};
pub use events::{ChatEvent, Dispatcher};
pub use sse::{SseDecoder, SseRecord};
pub use thread::ThreadState;
pub use transport::{ByteStream, ChatTransport};
pub use types::{Message, MessageStatus, Role, ServerId, TableResult, TurnRequest};
