//! Transcript and wire types shared across the chat client

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::constants;

/// Server-assigned identifier for threads and messages
///
/// The backend is free to use numbers or strings; both are carried through
/// unchanged so the next request echoes exactly what the server sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerId {
    Int(i64),
    /// Numbers outside `i64`, kept verbatim
    Num(Number),
    Str(String),
}

impl ServerId {
    /// Parse an id out of an arbitrary JSON value
    ///
    /// Empty strings, zero, and non-scalar values do not identify anything.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(0) => None,
                Some(i) => Some(ServerId::Int(i)),
                None if n.as_f64() == Some(0.0) => None,
                None => Some(ServerId::Num(n.clone())),
            },
            Value::String(s) if !s.trim().is_empty() => Some(ServerId::Str(s.clone())),
            _ => None,
        }
    }

    /// Sentinel sent as `parent_message_id` on the first turn
    pub fn first_turn() -> Self {
        ServerId::Int(constants::api::FIRST_TURN_PARENT_ID)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerId::Int(n) => write!(f, "{}", n),
            ServerId::Num(n) => write!(f, "{}", n),
            ServerId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ServerId {
    fn from(value: i64) -> Self {
        ServerId::Int(value)
    }
}

impl From<&str> for ServerId {
    fn from(value: &str) -> Self {
        ServerId::Str(value.to_string())
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Streaming,
    Complete,
    Error,
}

impl MessageStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, MessageStatus::Streaming)
    }
}

/// Tabular result attached to a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableResult {
    /// Project a list of JSON objects into a table
    ///
    /// The first row's keys fix the column order. Later rows are read through
    /// those columns: missing keys become `null`, extra keys are dropped.
    /// Returns `None` when there is nothing to project.
    pub fn from_records(records: &[Value]) -> Option<Self> {
        let columns: Vec<String> = records.first()?.as_object()?.keys().cloned().collect();

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Some(Self { columns, rows })
    }
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Locally generated identifier
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// Reasoning trace streamed alongside the answer
    pub thinking: Option<String>,
    pub table: Option<TableResult>,
    /// Chart document, already parsed
    pub chart: Option<Value>,
    /// Query text derived by a backend tool (last write wins)
    pub sql: Option<String>,
    /// Id assigned by the server once the turn confirms it
    pub server_id: Option<ServerId>,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    fn new(role: Role, content: String, status: MessageStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            thinking: None,
            table: None,
            chart: None,
            sql: None,
            server_id: None,
            created_at: Utc::now(),
            status,
        }
    }

    /// User messages are final the moment they are recorded
    pub fn user(query: impl Into<String>) -> Self {
        Self::new(Role::User, query.into(), MessageStatus::Complete)
    }

    /// Empty assistant message awaiting streamed content
    pub fn assistant() -> Self {
        Self::new(Role::Assistant, String::new(), MessageStatus::Streaming)
    }

    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }
}

/// Body of a turn-submission request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ServerId>,
    pub parent_message_id: ServerId,
}
