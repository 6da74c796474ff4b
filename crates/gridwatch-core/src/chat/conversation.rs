//! Conversation orchestration
//!
//! A [`Conversation`] is the per-chat context: it owns the thread state, the
//! transcript, and the in-progress flag, and drives one turn at a time:
//!
//! 1. record the user message and open an assistant reply
//! 2. create a thread if none is known (failure is tolerated)
//! 3. submit the turn and decode its event stream inline
//! 4. close the reply as complete or error
//!
//! Separate conversations share nothing but the transport.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::accumulator::{Accumulator, TranscriptUpdate};
use super::error::ChatError;
use super::events::Dispatcher;
use super::sse::SseDecoder;
use super::thread::ThreadState;
use super::transport::ChatTransport;
use super::types::{Message, TurnRequest};

pub struct Conversation {
    transport: Arc<dyn ChatTransport>,
    thread: ThreadState,
    transcript: Accumulator,
    turn_in_progress: bool,
}

impl Conversation {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            thread: ThreadState::new(),
            transcript: Accumulator::new(),
            turn_in_progress: false,
        }
    }

    /// Receive every transcript snapshot from now on, in order
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TranscriptUpdate> {
        self.transcript.subscribe()
    }

    pub fn thread(&self) -> &ThreadState {
        &self.thread
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    /// Whether a turn is currently running
    pub fn is_busy(&self) -> bool {
        self.turn_in_progress
    }

    /// Start over: forget the thread, causal link, and transcript
    pub fn reset(&mut self) -> Result<(), ChatError> {
        if self.turn_in_progress {
            return Err(ChatError::TurnInProgress);
        }
        info!("Resetting conversation");
        self.thread.reset();
        self.transcript.clear();
        Ok(())
    }

    /// Run one turn to completion
    pub async fn send(&mut self, query: &str) -> Result<Message, ChatError> {
        self.send_with_cancel(query, CancellationToken::new()).await
    }

    /// Run one turn, stopping early if `cancel` fires
    ///
    /// On success returns the finished assistant message. On failure the reply
    /// is already marked `error` in the transcript and the cause is returned.
    /// If this future is dropped mid-turn the reply is marked `error` too.
    pub async fn send_with_cancel(
        &mut self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<Message, ChatError> {
        if self.turn_in_progress {
            warn!("Rejecting turn: another turn is still streaming");
            return Err(ChatError::TurnInProgress);
        }
        self.turn_in_progress = true;

        let mut turn = scopeguard::guard(self, |conversation| {
            conversation.turn_in_progress = false;
            if conversation.transcript.is_streaming() {
                warn!("Turn abandoned while streaming");
                conversation.transcript.abandon();
            }
        });

        turn.run_turn(query, &cancel).await
    }

    async fn run_turn(
        &mut self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Message, ChatError> {
        let turn_start = Instant::now();
        info!("=== TURN START === ({} chars)", query.len());

        self.transcript.push_user(query);
        let reply_id = self.transcript.begin_assistant().id;

        let outcome = self.execute(query, cancel).await;

        if let Err(e) = &outcome {
            error!("Turn failed after {:?}: {}", turn_start.elapsed(), e);
            self.transcript.fail(&e.user_description());
        } else {
            info!("=== TURN END === in {:?}", turn_start.elapsed());
        }

        let reply = self.transcript.find(reply_id).cloned().ok_or_else(|| {
            ChatError::InvalidResponse("assistant reply missing from transcript".to_string())
        })?;
        outcome.map(|()| reply)
    }

    async fn execute(&mut self, query: &str, cancel: &CancellationToken) -> Result<(), ChatError> {
        self.ensure_thread(cancel).await?;

        let request = self.thread.next_request(query);
        self.stream_turn(&request, cancel).await
    }

    /// Create a thread if none is held; only cancellation is fatal
    async fn ensure_thread(&mut self, cancel: &CancellationToken) -> Result<(), ChatError> {
        if self.thread.has_thread() {
            return Ok(());
        }

        match cancellable(cancel, self.transport.create_thread()).await {
            Ok(thread_id) => self.thread.set_thread_id(thread_id),
            Err(ChatError::Cancelled) => return Err(ChatError::Cancelled),
            Err(e) => warn!("Thread creation failed, continuing without a thread: {}", e),
        }
        Ok(())
    }

    async fn stream_turn(
        &mut self,
        request: &TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        let mut stream = cancellable(cancel, self.transport.submit_turn(request)).await?;

        let mut decoder = SseDecoder::new();
        let mut dispatcher = Dispatcher::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    for record in decoder.feed(&bytes) {
                        dispatcher.dispatch(&record, &mut self.transcript, &mut self.thread);
                    }
                }
                Some(Err(e)) => {
                    error!(
                        "Stream read error at chunk #{}: {}",
                        decoder.chunk_count() + 1,
                        e
                    );
                    return Err(e);
                }
                None => break,
            }
        }

        decoder.finish();
        info!(
            "Stream ended after {} chunks, {} bytes, {} events ({} dropped)",
            decoder.chunk_count(),
            decoder.bytes_received(),
            dispatcher.dispatched(),
            dispatcher.dropped()
        );

        if !dispatcher.turn_completed() {
            warn!("Stream ended without a response event; closing the reply");
            self.transcript.complete();
        }
        Ok(())
    }
}

/// Race `fut` against cancellation
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, ChatError>>,
) -> Result<T, ChatError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ChatError::Cancelled),
        result = fut => result,
    }
}
