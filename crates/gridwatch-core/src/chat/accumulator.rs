//! Conversation transcript accumulator
//!
//! Owns the transcript and the single in-flight assistant message. Every
//! mutation derives a new [`Message`] snapshot from the previous one and
//! publishes it to subscribers before the next mutation runs, so observers see
//! updates in exactly the order records arrived.

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::ToolOutput;
use super::types::{Message, MessageStatus, ServerId, TableResult};

/// Change notification sent to transcript observers
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptUpdate {
    /// A message was appended to the transcript
    Added(Message),
    /// An existing message has a new snapshot
    Updated(Message),
}

impl TranscriptUpdate {
    pub fn message(&self) -> &Message {
        match self {
            TranscriptUpdate::Added(m) | TranscriptUpdate::Updated(m) => m,
        }
    }
}

/// Formatted excerpt appended to the reasoning trace for generated SQL
pub fn sql_excerpt(sql: &str) -> String {
    format!("\n\n**Generated SQL:**\n```sql\n{}\n```\n", sql.trim())
}

// Snapshot transitions. Each returns a new message and leaves `self` untouched.
impl Message {
    fn with_text(&self, delta: &str) -> Self {
        let mut next = self.clone();
        next.content.push_str(delta);
        next
    }

    fn with_thinking(&self, delta: &str) -> Self {
        let mut next = self.clone();
        next.thinking.get_or_insert_with(String::new).push_str(delta);
        next
    }

    fn with_table(&self, table: TableResult) -> Self {
        Self {
            table: Some(table),
            ..self.clone()
        }
    }

    fn with_chart(&self, chart: serde_json::Value) -> Self {
        Self {
            chart: Some(chart),
            ..self.clone()
        }
    }

    fn with_tool_output(&self, output: ToolOutput) -> Self {
        let mut next = self.clone();
        if let Some(sql) = output.sql {
            next.thinking
                .get_or_insert_with(String::new)
                .push_str(&sql_excerpt(&sql));
            next.sql = Some(sql);
        }
        if let Some(table) = output.table {
            next.table = Some(table);
        }
        next
    }

    fn with_server_id(&self, id: ServerId) -> Self {
        Self {
            server_id: Some(id),
            ..self.clone()
        }
    }

    fn finished(&self, status: MessageStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    fn failed(&self, description: String) -> Self {
        Self {
            content: description,
            status: MessageStatus::Error,
            ..self.clone()
        }
    }
}

/// Transcript owner for one conversation
#[derive(Debug, Default)]
pub struct Accumulator {
    messages: Vec<Message>,
    /// Index of the streaming assistant message
    in_flight: Option<usize>,
    subscribers: Vec<mpsc::UnboundedSender<TranscriptUpdate>>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; it receives every later update in order
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TranscriptUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, update: TranscriptUpdate) {
        self.subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn find(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.id == id)
    }

    /// The message currently streaming, if any
    pub fn in_flight(&self) -> Option<&Message> {
        self.in_flight.and_then(|i| self.messages.get(i))
    }

    pub fn is_streaming(&self) -> bool {
        self.in_flight.is_some()
    }

    fn push(&mut self, message: Message) -> Message {
        self.messages.push(message.clone());
        self.publish(TranscriptUpdate::Added(message.clone()));
        message
    }

    /// Record the user's query
    pub fn push_user(&mut self, query: &str) -> Message {
        self.push(Message::user(query))
    }

    /// Start the assistant reply for the current turn
    ///
    /// A reply still streaming from an earlier turn is failed first so at most
    /// one message is ever streaming.
    pub fn begin_assistant(&mut self) -> Message {
        if self.in_flight.is_some() {
            warn!("Starting a new reply while another is streaming; failing the old one");
            self.abandon();
        }
        let message = self.push(Message::assistant());
        self.in_flight = Some(self.messages.len() - 1);
        message
    }

    /// Replace the in-flight message with `f(current)` and publish it
    fn transition(&mut self, f: impl FnOnce(&Message) -> Message) -> Option<Message> {
        let Some(index) = self.in_flight else {
            warn!("Ignoring transcript update with no message in flight");
            return None;
        };

        let next = f(&self.messages[index]);
        if next.status.is_final() {
            self.in_flight = None;
        }
        self.messages[index] = next.clone();
        self.publish(TranscriptUpdate::Updated(next.clone()));
        Some(next)
    }

    pub fn append_text(&mut self, delta: &str) {
        self.transition(|m| m.with_text(delta));
    }

    pub fn append_thinking(&mut self, delta: &str) {
        self.transition(|m| m.with_thinking(delta));
    }

    pub fn set_table(&mut self, table: TableResult) {
        self.transition(|m| m.with_table(table));
    }

    pub fn set_chart(&mut self, chart: serde_json::Value) {
        self.transition(|m| m.with_chart(chart));
    }

    /// Store derived SQL (echoed into the reasoning trace) and any result rows
    pub fn apply_tool_output(&mut self, output: ToolOutput) {
        self.transition(|m| m.with_tool_output(output));
    }

    pub fn set_server_id(&mut self, id: ServerId) {
        self.transition(|m| m.with_server_id(id));
    }

    /// Close the in-flight message successfully
    pub fn complete(&mut self) -> Option<Message> {
        let message = self.transition(|m| m.finished(MessageStatus::Complete))?;
        debug!(
            "Message {} complete: {} chars, table={}, chart={}",
            message.id,
            message.content.len(),
            message.table.is_some(),
            message.chart.is_some()
        );
        Some(message)
    }

    /// Close the in-flight message with an error, replacing its content
    pub fn fail(&mut self, description: &str) -> Option<Message> {
        let message = self.transition(|m| m.failed(description.to_string()))?;
        warn!("Message {} failed: {}", message.id, description);
        Some(message)
    }

    /// Close a reply whose turn stopped without finishing
    pub fn abandon(&mut self) -> Option<Message> {
        self.fail(crate::constants::transcript::CANCELLED)
    }

    /// Clear the transcript
    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_flight = None;
    }
}
