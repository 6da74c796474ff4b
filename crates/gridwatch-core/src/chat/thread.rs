//! Thread continuity
//!
//! Holds the server thread id and the causal link (last confirmed assistant
//! message id) so the next turn can name its parent. No I/O lives here.

use tracing::{debug, warn};

use super::types::{ServerId, TurnRequest};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadState {
    thread_id: Option<ServerId>,
    parent: Option<ServerId>,
}

impl ThreadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_id(&self) -> Option<&ServerId> {
        self.thread_id.as_ref()
    }

    pub fn has_thread(&self) -> bool {
        self.thread_id.is_some()
    }

    /// Store an authoritative thread id
    ///
    /// Setting the same value again is a no-op. A different value replaces the
    /// old one, since the server is the source of truth.
    pub fn set_thread_id(&mut self, id: ServerId) {
        match &self.thread_id {
            Some(current) if *current == id => {}
            Some(current) => {
                warn!("Server moved conversation from thread {} to {}", current, id);
                self.thread_id = Some(id);
            }
            None => {
                debug!("Thread id set to {}", id);
                self.thread_id = Some(id);
            }
        }
    }

    /// Accept a thread id only if none is known yet
    pub fn adopt_thread_id(&mut self, id: ServerId) {
        if self.thread_id.is_none() {
            debug!("Adopting thread id {} from stream", id);
            self.thread_id = Some(id);
        }
    }

    /// Record a confirmed assistant message as the parent of the next turn
    pub fn record_assistant_message(&mut self, id: ServerId) {
        self.parent = Some(id);
    }

    /// Last confirmed assistant message id, if any
    pub fn causal_link(&self) -> Option<&ServerId> {
        self.parent.as_ref()
    }

    /// Value for `parent_message_id`, the first-turn sentinel when unset
    pub fn parent_message_id(&self) -> ServerId {
        self.parent.clone().unwrap_or_else(ServerId::first_turn)
    }

    /// Build the body for the next turn
    pub fn next_request(&self, query: &str) -> TurnRequest {
        TurnRequest {
            query: query.to_string(),
            thread_id: self.thread_id.clone(),
            parent_message_id: self.parent_message_id(),
        }
    }

    /// Forget the thread and causal link
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_turn_request() {
        let state = ThreadState::new();
        let request = state.next_request("Show load");
        assert_eq!(request.thread_id, None);
        assert_eq!(request.parent_message_id, ServerId::Int(0));
        assert_eq!(request.query, "Show load");
    }

    #[test]
    fn test_set_thread_id_idempotent() {
        let mut state = ThreadState::new();
        state.set_thread_id(ServerId::Int(7));
        state.set_thread_id(ServerId::Int(7));
        assert_eq!(state.thread_id(), Some(&ServerId::Int(7)));

        state.set_thread_id(ServerId::Int(8));
        assert_eq!(state.thread_id(), Some(&ServerId::Int(8)));
    }

    #[test]
    fn test_adopt_only_when_unset() {
        let mut state = ThreadState::new();
        state.adopt_thread_id(ServerId::from("a"));
        state.adopt_thread_id(ServerId::from("b"));
        assert_eq!(state.thread_id(), Some(&ServerId::from("a")));
    }

    #[test]
    fn test_causal_link_last_write_wins() {
        let mut state = ThreadState::new();
        state.set_thread_id(ServerId::Int(7));
        state.record_assistant_message(ServerId::Int(42));
        state.record_assistant_message(ServerId::Int(43));

        let request = state.next_request("and now?");
        assert_eq!(request.thread_id, Some(ServerId::Int(7)));
        assert_eq!(request.parent_message_id, ServerId::Int(43));
    }

    #[test]
    fn test_reset() {
        let mut state = ThreadState::new();
        state.set_thread_id(ServerId::Int(1));
        state.record_assistant_message(ServerId::Int(2));
        state.reset();
        assert!(!state.has_thread());
        assert!(state.causal_link().is_none());
    }
}
