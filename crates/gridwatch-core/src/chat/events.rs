//! Event parsing and dispatch
//!
//! Turns decoded SSE records into typed [`ChatEvent`]s and routes them to the
//! transcript and thread state. Parsing never aborts the stream: callers get a
//! [`DecodeError`] and decide to drop the record.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::accumulator::Accumulator;
use super::error::DecodeError;
use super::sse::SseRecord;
use super::thread::ThreadState;
use super::types::{Role, ServerId, TableResult};

/// Wire event names
pub mod names {
    pub const TEXT_DELTA: &str = "response.text.delta";
    pub const THINKING_DELTA: &str = "response.thinking.delta";
    pub const TABLE: &str = "response.table";
    pub const CHART: &str = "response.chart";
    pub const TOOL_RESULT: &str = "response.tool_result";
    pub const RESPONSE: &str = "response";
    pub const METADATA: &str = "metadata";
}

/// What a backend tool produced for one content item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub sql: Option<String>,
    pub table: Option<TableResult>,
}

impl ToolOutput {
    fn is_empty(&self) -> bool {
        self.sql.is_none() && self.table.is_none()
    }
}

/// Typed form of a decoded record
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TextDelta(String),
    ThinkingDelta(String),
    Table(TableResult),
    Chart {
        tool_use_id: Option<String>,
        spec: Value,
    },
    ToolResult(Vec<ToolOutput>),
    /// End of the assistant turn, with the authoritative ids
    TurnComplete {
        thread_id: Option<ServerId>,
        message_id: Option<ServerId>,
    },
    Metadata {
        role: Option<Role>,
        message_id: Option<ServerId>,
        thread_id: Option<ServerId>,
    },
    Unknown(String),
}

#[derive(Deserialize)]
struct TextPayload {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct TablePayload {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct ChartPayload {
    #[serde(default)]
    tool_use_id: Option<String>,
    #[serde(default)]
    chart_spec: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Value>),
    One(Value),
}

#[derive(Deserialize)]
struct ToolResultPayload {
    content: OneOrMany,
}

#[derive(Deserialize)]
struct ResponsePayload {
    #[serde(default)]
    thread_id: Value,
    #[serde(default)]
    message_id: Value,
}

#[derive(Deserialize)]
struct MetadataPayload {
    metadata: MetadataFields,
}

#[derive(Deserialize)]
struct MetadataFields {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    message_id: Value,
    #[serde(default)]
    thread_id: Value,
}

/// Parse one record into a [`ChatEvent`]
pub fn parse_record(record: &SseRecord) -> Result<ChatEvent, DecodeError> {
    let json_err = |source| DecodeError::Json {
        event: record.event.clone(),
        source,
    };

    let payload: Value = serde_json::from_str(&record.data).map_err(json_err)?;

    let event = match record.event.as_str() {
        names::TEXT_DELTA => {
            let p: TextPayload = serde_json::from_value(payload).map_err(json_err)?;
            ChatEvent::TextDelta(p.text)
        }
        names::THINKING_DELTA => {
            let p: TextPayload = serde_json::from_value(payload).map_err(json_err)?;
            ChatEvent::ThinkingDelta(p.text)
        }
        names::TABLE => {
            let p: TablePayload = serde_json::from_value(payload).map_err(json_err)?;
            ChatEvent::Table(TableResult {
                columns: p.columns,
                rows: p.rows,
            })
        }
        names::CHART => {
            let p: ChartPayload = serde_json::from_value(payload).map_err(json_err)?;
            if p.chart_spec.is_null() {
                return Err(DecodeError::MissingField {
                    event: record.event.clone(),
                    field: "chart_spec",
                });
            }
            ChatEvent::Chart {
                tool_use_id: p.tool_use_id,
                spec: parse_chart_spec(p.chart_spec)?,
            }
        }
        names::TOOL_RESULT => {
            let p: ToolResultPayload = serde_json::from_value(payload).map_err(json_err)?;
            let items = match p.content {
                OneOrMany::Many(items) => items,
                OneOrMany::One(item) => vec![item],
            };
            ChatEvent::ToolResult(
                items
                    .iter()
                    .map(parse_tool_item)
                    .filter(|output| !output.is_empty())
                    .collect(),
            )
        }
        names::RESPONSE => {
            let p: ResponsePayload = serde_json::from_value(payload).map_err(json_err)?;
            ChatEvent::TurnComplete {
                thread_id: ServerId::from_value(&p.thread_id),
                message_id: ServerId::from_value(&p.message_id),
            }
        }
        names::METADATA => {
            let p: MetadataPayload = serde_json::from_value(payload).map_err(json_err)?;
            let role = match p.metadata.role.as_deref() {
                Some("assistant") => Some(Role::Assistant),
                Some("user") => Some(Role::User),
                _ => None,
            };
            ChatEvent::Metadata {
                role,
                message_id: ServerId::from_value(&p.metadata.message_id),
                thread_id: ServerId::from_value(&p.metadata.thread_id),
            }
        }
        other => ChatEvent::Unknown(other.to_string()),
    };

    Ok(event)
}

/// Chart specs arrive either inline or as a JSON document inside a string
fn parse_chart_spec(spec: Value) -> Result<Value, DecodeError> {
    match spec {
        Value::String(embedded) => serde_json::from_str(&embedded).map_err(DecodeError::ChartSpec),
        other => Ok(other),
    }
}

fn parse_tool_item(item: &Value) -> ToolOutput {
    let sql_of = |v: &Value| {
        v.get("sql")
            .and_then(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    match item.get("type").and_then(|t| t.as_str()) {
        Some("json") => {
            let Some(json) = item.get("json") else {
                return ToolOutput::default();
            };
            let records = json
                .get("results")
                .and_then(|r| r.as_array())
                .or_else(|| json.get("data").and_then(|d| d.as_array()));
            ToolOutput {
                sql: sql_of(json),
                table: records.and_then(|r| TableResult::from_records(r)),
            }
        }
        Some("text") => ToolOutput {
            sql: sql_of(item),
            table: None,
        },
        _ => ToolOutput::default(),
    }
}

/// Routes decoded records to the transcript and thread state
#[derive(Debug, Default)]
pub struct Dispatcher {
    dispatched: usize,
    dropped: usize,
    turn_completed: bool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and apply one record
    ///
    /// Malformed records are logged and dropped; the stream carries on.
    pub fn dispatch(
        &mut self,
        record: &SseRecord,
        transcript: &mut Accumulator,
        thread: &mut ThreadState,
    ) {
        match parse_record(record) {
            Ok(event) => {
                self.dispatched += 1;
                self.apply(event, transcript, thread);
            }
            Err(e) => {
                self.dropped += 1;
                warn!("Dropping '{}' record: {}", record.event, e);
            }
        }
    }

    fn apply(&mut self, event: ChatEvent, transcript: &mut Accumulator, thread: &mut ThreadState) {
        match event {
            ChatEvent::TextDelta(text) => {
                debug!("  -> TextDelta: {} chars", text.len());
                transcript.append_text(&text);
            }
            ChatEvent::ThinkingDelta(text) => {
                debug!("  -> ThinkingDelta: {} chars", text.len());
                transcript.append_thinking(&text);
            }
            ChatEvent::Table(table) => {
                debug!(
                    "  -> Table: {} columns, {} rows",
                    table.columns.len(),
                    table.rows.len()
                );
                transcript.set_table(table);
            }
            ChatEvent::Chart { tool_use_id, spec } => {
                debug!("  -> Chart: tool_use_id={:?}", tool_use_id);
                transcript.set_chart(spec);
            }
            ChatEvent::ToolResult(outputs) => {
                debug!("  -> ToolResult: {} items", outputs.len());
                for output in outputs {
                    transcript.apply_tool_output(output);
                }
            }
            ChatEvent::Metadata {
                role,
                message_id,
                thread_id,
            } => {
                if let Some(thread_id) = thread_id {
                    thread.adopt_thread_id(thread_id);
                }
                match (role, message_id) {
                    (Some(Role::Assistant), Some(id)) => {
                        info!("Assistant message id {} confirmed by metadata", id);
                        thread.record_assistant_message(id.clone());
                        transcript.set_server_id(id);
                    }
                    (Some(Role::User), Some(id)) => {
                        debug!("  -> Metadata: user message id {}", id);
                    }
                    (role, id) => {
                        debug!("  -> Metadata ignored: role={:?}, message_id={:?}", role, id);
                    }
                }
            }
            ChatEvent::TurnComplete {
                thread_id,
                message_id,
            } => {
                info!(
                    "Turn complete: thread_id={:?}, message_id={:?}",
                    thread_id, message_id
                );
                if let Some(thread_id) = thread_id {
                    thread.set_thread_id(thread_id);
                }
                if let Some(id) = message_id {
                    thread.record_assistant_message(id.clone());
                    transcript.set_server_id(id);
                }
                transcript.complete();
                self.turn_completed = true;
            }
            ChatEvent::Unknown(name) => {
                debug!("Ignoring unknown event '{}'", name);
            }
        }
    }

    /// Whether a `response` event closed the turn
    pub fn turn_completed(&self) -> bool {
        self.turn_completed
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::chat::types::MessageStatus;

    fn rec(event: &str, data: &str) -> SseRecord {
        SseRecord {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    fn streaming_transcript() -> Accumulator {
        let mut transcript = Accumulator::new();
        transcript.push_user("Show load");
        transcript.begin_assistant();
        transcript
    }

    #[test]
    fn test_parse_text_delta() {
        let event = parse_record(&rec(names::TEXT_DELTA, r#"{"text":"Load is"}"#)).unwrap();
        assert_eq!(event, ChatEvent::TextDelta("Load is".to_string()));
    }

    #[test]
    fn test_parse_malformed_payload() {
        let err = parse_record(&rec(names::TEXT_DELTA, "{not json")).unwrap_err();
        assert!(matches!(err, DecodeError::Json { .. }));
    }

    #[test]
    fn test_parse_chart_embedded_string() {
        let data = json!({"tool_use_id": "t1", "chart_spec": "{\"mark\":\"line\"}"}).to_string();
        let event = parse_record(&rec(names::CHART, &data)).unwrap();
        assert_eq!(
            event,
            ChatEvent::Chart {
                tool_use_id: Some("t1".to_string()),
                spec: json!({"mark": "line"}),
            }
        );
    }

    #[test]
    fn test_parse_chart_inline_object() {
        let data = json!({"chart_spec": {"mark": "bar"}}).to_string();
        let event = parse_record(&rec(names::CHART, &data)).unwrap();
        assert!(matches!(event, ChatEvent::Chart { tool_use_id: None, .. }));
    }

    #[test]
    fn test_parse_chart_bad_embedded_string() {
        let data = json!({"chart_spec": "{mark: line"}).to_string();
        let err = parse_record(&rec(names::CHART, &data)).unwrap_err();
        assert!(matches!(err, DecodeError::ChartSpec(_)));
    }

    #[test]
    fn test_parse_chart_without_spec() {
        let err = parse_record(&rec(names::CHART, r#"{"tool_use_id":"t1"}"#)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingField {
                field: "chart_spec",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_tool_result_rows_projected() {
        let data = json!({
            "content": [{
                "type": "json",
                "json": {"results": [{"a": 1, "b": 2}, {"a": 3, "b": 4}]}
            }]
        })
        .to_string();
        let event = parse_record(&rec(names::TOOL_RESULT, &data)).unwrap();
        let ChatEvent::ToolResult(outputs) = event else {
            panic!("Expected ToolResult");
        };
        assert_eq!(outputs.len(), 1);
        let table = outputs[0].table.clone().unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows, vec![vec![json!(1), json!(2)], vec![json!(3), json!(4)]]);
    }

    #[test]
    fn test_parse_tool_result_single_object_and_text_item() {
        let data = json!({"content": {"type": "text", "sql": "SELECT 1"}}).to_string();
        let event = parse_record(&rec(names::TOOL_RESULT, &data)).unwrap();
        assert_eq!(
            event,
            ChatEvent::ToolResult(vec![ToolOutput {
                sql: Some("SELECT 1".to_string()),
                table: None,
            }])
        );
    }

    #[test]
    fn test_parse_tool_result_data_fallback_and_noise() {
        let data = json!({
            "content": [
                {"type": "json", "json": {
                    "sql": "SELECT region, mw FROM load",
                    "data": [{"region": "N", "mw": 12}]
                }},
                {"type": "image"},
                {"type": "json"}
            ]
        })
        .to_string();
        let ChatEvent::ToolResult(outputs) = parse_record(&rec(names::TOOL_RESULT, &data)).unwrap()
        else {
            panic!("Expected ToolResult");
        };
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].sql.as_deref(), Some("SELECT region, mw FROM load"));
        assert_eq!(outputs[0].table.as_ref().unwrap().columns, vec!["region", "mw"]);
    }

    #[test]
    fn test_parse_metadata() {
        let data = json!({"metadata": {"role": "assistant", "message_id": 42}}).to_string();
        assert_eq!(
            parse_record(&rec(names::METADATA, &data)).unwrap(),
            ChatEvent::Metadata {
                role: Some(Role::Assistant),
                message_id: Some(ServerId::Int(42)),
                thread_id: None,
            }
        );
    }

    #[test]
    fn test_parse_unknown_event() {
        let event = parse_record(&rec("response.heartbeat", "{}")).unwrap();
        assert_eq!(event, ChatEvent::Unknown("response.heartbeat".to_string()));
    }

    #[test]
    fn test_dispatch_text_deltas_concatenate_in_order() {
        let mut transcript = streaming_transcript();
        let mut thread = ThreadState::new();
        let mut dispatcher = Dispatcher::new();

        for part in ["Grid ", "load ", "is ", "nominal."] {
            let data = json!({ "text": part }).to_string();
            dispatcher.dispatch(&rec(names::TEXT_DELTA, &data), &mut transcript, &mut thread);
        }

        assert_eq!(transcript.in_flight().unwrap().content, "Grid load is nominal.");
        assert_eq!(dispatcher.dispatched(), 4);
    }

    #[test]
    fn test_dispatch_malformed_record_is_skipped() {
        let mut transcript = streaming_transcript();
        let mut thread = ThreadState::new();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch(
            &rec(names::TEXT_DELTA, r#"{"text":"a"}"#),
            &mut transcript,
            &mut thread,
        );
        dispatcher.dispatch(&rec(names::TEXT_DELTA, r#"{"text":"#), &mut transcript, &mut thread);
        dispatcher.dispatch(
            &rec(names::TEXT_DELTA, r#"{"text":"b"}"#),
            &mut transcript,
            &mut thread,
        );

        assert_eq!(transcript.in_flight().unwrap().content, "ab");
        assert_eq!(dispatcher.dropped(), 1);
        assert_eq!(dispatcher.dispatched(), 2);
    }

    #[test]
    fn test_dispatch_metadata_sets_causal_link() {
        let mut transcript = streaming_transcript();
        let mut thread = ThreadState::new();
        let mut dispatcher = Dispatcher::new();

        let meta = json!({"metadata": {"role": "assistant", "message_id": 42}}).to_string();
        dispatcher.dispatch(&rec(names::METADATA, &meta), &mut transcript, &mut thread);
        dispatcher.dispatch(&rec(names::RESPONSE, "{}"), &mut transcript, &mut thread);

        assert_eq!(thread.parent_message_id(), ServerId::Int(42));
        assert!(dispatcher.turn_completed());
        assert_eq!(transcript.last().unwrap().status, MessageStatus::Complete);
    }

    #[test]
    fn test_dispatch_user_metadata_does_not_touch_causal_link() {
        let mut transcript = streaming_transcript();
        let mut thread = ThreadState::new();
        let mut dispatcher = Dispatcher::new();

        let meta = json!({"metadata": {"role": "user", "message_id": 41}}).to_string();
        dispatcher.dispatch(&rec(names::METADATA, &meta), &mut transcript, &mut thread);

        assert_eq!(thread.parent_message_id(), ServerId::first_turn());
    }

    #[test]
    fn test_dispatch_metadata_thread_only_when_unknown() {
        let mut transcript = streaming_transcript();
        let mut thread = ThreadState::new();
        let mut dispatcher = Dispatcher::new();
        thread.set_thread_id(ServerId::Int(7));

        let meta = json!({"metadata": {"role": "assistant", "message_id": 5, "thread_id": 9}})
            .to_string();
        dispatcher.dispatch(&rec(names::METADATA, &meta), &mut transcript, &mut thread);

        assert_eq!(thread.thread_id(), Some(&ServerId::Int(7)));
    }

    #[test]
    fn test_dispatch_bad_chart_keeps_other_attachments() {
        let mut transcript = streaming_transcript();
        let mut thread = ThreadState::new();
        let mut dispatcher = Dispatcher::new();

        let table = json!({"columns": ["a"], "rows": [[1]]}).to_string();
        let chart = json!({"chart_spec": "not a chart"}).to_string();
        dispatcher.dispatch(
            &rec(names::TEXT_DELTA, r#"{"text":"hi"}"#),
            &mut transcript,
            &mut thread,
        );
        dispatcher.dispatch(&rec(names::TABLE, &table), &mut transcript, &mut thread);
        dispatcher.dispatch(&rec(names::CHART, &chart), &mut transcript, &mut thread);

        let message = transcript.in_flight().unwrap();
        assert_eq!(message.content, "hi");
        assert!(message.table.is_some());
        assert!(message.chart.is_none());
        assert_eq!(dispatcher.dropped(), 1);
    }
}
