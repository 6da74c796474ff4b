//! Transcript rendering
//!
//! Turns the snapshot stream from a conversation into incremental terminal
//! output. Text is printed as it grows; tables, charts, and SQL are printed
//! once the reply closes.

use std::collections::HashMap;
use std::io::{self, Write};

use gridwatch_core::chat::TableResult;
use gridwatch_core::{Message, MessageStatus, Role, TranscriptUpdate};
use uuid::Uuid;

/// Rows shown before a table is truncated
const MAX_TABLE_ROWS: usize = 20;

/// Widest a table cell may render
const MAX_CELL_WIDTH: usize = 32;

/// Tracks how much of each reply has already been written
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    printed: HashMap<Uuid, usize>,
    show_thinking: bool,
}

impl TranscriptPrinter {
    pub fn new(show_thinking: bool) -> Self {
        Self {
            printed: HashMap::new(),
            show_thinking,
        }
    }

    /// Render one update
    pub fn render(&mut self, update: &TranscriptUpdate, out: &mut impl Write) -> io::Result<()> {
        let message = update.message();
        if message.role == Role::User {
            return Ok(());
        }

        match message.status {
            MessageStatus::Streaming => self.print_new_text(message, out),
            MessageStatus::Complete => {
                let result = self
                    .print_new_text(message, out)
                    .and_then(|()| writeln!(out))
                    .and_then(|()| self.print_attachments(message, out));
                self.printed.remove(&message.id);
                result
            }
            MessageStatus::Error => {
                if self.printed.remove(&message.id).unwrap_or(0) > 0 {
                    writeln!(out)?;
                }
                writeln!(out, "✗ {}", message.content)
            }
        }
    }

    fn print_new_text(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        let printed = self.printed.entry(message.id).or_insert(0);
        if let Some(delta) = message.content.get(*printed..) {
            if !delta.is_empty() {
                write!(out, "{}", delta)?;
                out.flush()?;
            }
        }
        *printed = message.content.len();
        Ok(())
    }

    fn print_attachments(&self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        if self.show_thinking {
            if let Some(thinking) = message.thinking.as_deref().filter(|t| !t.trim().is_empty()) {
                writeln!(out, "\n--- reasoning ---\n{}", thinking.trim())?;
            } else if let Some(sql) = &message.sql {
                writeln!(out, "\n--- sql ---\n{}", sql)?;
            }
        }
        if let Some(table) = &message.table {
            writeln!(out)?;
            write_table(table, out)?;
        }
        if let Some(chart) = &message.chart {
            let kind = chart
                .get("mark")
                .and_then(|m| m.as_str().or_else(|| m.get("type").and_then(|t| t.as_str())))
                .unwrap_or("chart");
            writeln!(out, "\n[{} chart attached]", kind)?;
        }
        Ok(())
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX_CELL_WIDTH {
        let cut: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
        format!("{}…", cut)
    } else {
        text
    }
}

/// Whether `update` closes an assistant reply
pub fn closes_reply(update: &TranscriptUpdate) -> bool {
    let message = update.message();
    message.role == Role::Assistant && message.status.is_final()
}

/// Write a plain-text grid for `table`
pub fn write_table(table: &TableResult, out: &mut impl Write) -> io::Result<()> {
    let shown = &table.rows[..table.rows.len().min(MAX_TABLE_ROWS)];
    let cells: Vec<Vec<String>> = shown
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    writeln!(out, "{}", line(&table.columns))?;
    writeln!(
        out,
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    )?;
    for row in &cells {
        writeln!(out, "{}", line(row))?;
    }
    if table.rows.len() > shown.len() {
        writeln!(out, "({} more rows)", table.rows.len() - shown.len())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn render_all(printer: &mut TranscriptPrinter, updates: &[TranscriptUpdate]) -> String {
        let mut out = Vec::new();
        for update in updates {
            printer.render(update, &mut out).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    fn snapshot(base: &Message, content: &str, status: MessageStatus) -> Message {
        Message {
            content: content.to_string(),
            status,
            ..base.clone()
        }
    }

    #[test]
    fn test_prints_only_new_text() {
        let reply = Message::assistant();
        let updates = vec![
            TranscriptUpdate::Added(Message::user("Show load")),
            TranscriptUpdate::Added(reply.clone()),
            TranscriptUpdate::Updated(snapshot(&reply, "Load is", MessageStatus::Streaming)),
            TranscriptUpdate::Updated(snapshot(&reply, "Load is high.", MessageStatus::Streaming)),
            TranscriptUpdate::Updated(snapshot(&reply, "Load is high.", MessageStatus::Complete)),
        ];

        let output = render_all(&mut TranscriptPrinter::new(false), &updates);
        assert_eq!(output, "Load is high.\n");
    }

    #[test]
    fn test_error_replaces_partial_output() {
        let reply = Message::assistant();
        let updates = vec![
            TranscriptUpdate::Updated(snapshot(&reply, "partial", MessageStatus::Streaming)),
            TranscriptUpdate::Updated(snapshot(&reply, "Error 500: boom", MessageStatus::Error)),
        ];

        let output = render_all(&mut TranscriptPrinter::new(false), &updates);
        assert_eq!(output, "partial\n✗ Error 500: boom\n");
    }

    #[test]
    fn test_closes_reply() {
        let reply = Message::assistant();
        let streaming = TranscriptUpdate::Updated(snapshot(&reply, "a", MessageStatus::Streaming));
        let done = TranscriptUpdate::Updated(snapshot(&reply, "a", MessageStatus::Complete));
        let failed = TranscriptUpdate::Updated(snapshot(&reply, "x", MessageStatus::Error));
        let user = TranscriptUpdate::Added(Message::user("q"));

        assert!(!closes_reply(&streaming));
        assert!(closes_reply(&done));
        assert!(closes_reply(&failed));
        assert!(!closes_reply(&user));
    }

    /// Writer that fails every write
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_still_closes_reply() {
        let reply = Message::assistant();
        let mut printer = TranscriptPrinter::new(false);

        let streaming = TranscriptUpdate::Updated(snapshot(&reply, "a", MessageStatus::Streaming));
        let done = TranscriptUpdate::Updated(snapshot(&reply, "a", MessageStatus::Complete));
        assert!(printer.render(&streaming, &mut ClosedPipe).is_err());
        assert!(printer.render(&done, &mut ClosedPipe).is_err());
        assert!(closes_reply(&done));
        assert!(printer.printed.is_empty());
    }

    #[test]
    fn test_table_and_chart_follow_completion() {
        let mut reply = snapshot(&Message::assistant(), "F1 leads.", MessageStatus::Complete);
        reply.table = Some(TableResult {
            columns: vec!["feeder".into(), "mw".into()],
            rows: vec![vec![json!("F1"), json!(12.5)], vec![json!("F2"), json!(null)]],
        });
        reply.chart = Some(json!({"mark": "bar"}));

        let output = render_all(
            &mut TranscriptPrinter::new(false),
            &[TranscriptUpdate::Updated(reply)],
        );
        assert!(output.starts_with("F1 leads.\n"));
        assert!(output.contains("feeder | mw"));
        assert!(output.contains("F1     | 12.5"));
        assert!(output.contains("[bar chart attached]"));
    }

    #[test]
    fn test_long_table_is_truncated() {
        let table = TableResult {
            columns: vec!["n".into()],
            rows: (0..25).map(|i| vec![json!(i)]).collect(),
        };
        let mut out = Vec::new();
        write_table(&table, &mut out).unwrap();
        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("(5 more rows)"));
        assert!(!output.contains("\n24\n"));
    }
}
