//! SSE (Server-Sent Events) frame decoding
//!
//! Reassembles arbitrarily fragmented byte chunks into `(event, data)` records.
//! The decoder holds no I/O: [`advance`] is a pure step function over
//! [`DecoderState`], and [`SseDecoder`] wraps it with counters for logging.

use tracing::{debug, trace};

/// One decoded `event:` / `data:` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseRecord {
    pub event: String,
    pub data: String,
}

/// Parser state carried between chunks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderState {
    /// Event name seen but not yet paired with data
    pub pending_event: String,
    /// Data payload seen but not yet paired with an event name
    pub pending_data: String,
    /// Bytes after the last line terminator
    pub carryover: Vec<u8>,
}

/// Advance the decoder by one chunk
///
/// Complete lines are consumed; the unterminated tail stays in `carryover`.
/// Lines are only decoded as UTF-8 once complete, so multi-byte characters
/// split across chunks survive intact.
pub fn advance(mut state: DecoderState, chunk: &[u8]) -> (DecoderState, Vec<SseRecord>) {
    state.carryover.extend_from_slice(chunk);

    let mut records = Vec::new();
    let Some(last_newline) = state.carryover.iter().rposition(|b| *b == b'\n') else {
        return (state, records);
    };

    let rest = state.carryover.split_off(last_newline + 1);
    let complete = std::mem::replace(&mut state.carryover, rest);

    for raw in complete.split(|b| *b == b'\n') {
        let decoded = String::from_utf8_lossy(raw);
        let line = decoded.strip_suffix('\r').unwrap_or(&*decoded);
        if let Some(record) = process_line(&mut state, line) {
            records.push(record);
        }
    }

    (state, records)
}

/// Apply one complete line to the pending record
fn process_line(state: &mut DecoderState, line: &str) -> Option<SseRecord> {
    // A blank line ends the frame; any half-record in it is dropped
    if line.is_empty() {
        if !state.pending_event.is_empty() || !state.pending_data.is_empty() {
            trace!(
                "Discarding incomplete frame: event={:?}, data={} bytes",
                state.pending_event,
                state.pending_data.len()
            );
            state.pending_event.clear();
            state.pending_data.clear();
        }
        return None;
    }
    if line.starts_with(':') {
        return None;
    }

    if let Some(name) = field_value(line, "event") {
        state.pending_event = name.trim().to_string();
    } else if let Some(data) = field_value(line, "data") {
        if data.trim().is_empty() {
            trace!("Discarding record with blank data payload");
            state.pending_event.clear();
            state.pending_data.clear();
            return None;
        }
        state.pending_data = data.to_string();
    } else {
        trace!("Ignoring SSE line: {}", line);
        return None;
    }

    if state.pending_event.is_empty() || state.pending_data.is_empty() {
        return None;
    }

    Some(SseRecord {
        event: std::mem::take(&mut state.pending_event),
        data: std::mem::take(&mut state.pending_data),
    })
}

/// Value of a `field: value` line, with the single optional space removed
fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let value = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

/// Stateful wrapper around [`advance`] used by the request loop
#[derive(Debug, Default)]
pub struct SseDecoder {
    state: DecoderState,
    chunk_count: usize,
    bytes_received: usize,
    record_count: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every record it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        self.chunk_count += 1;
        self.bytes_received += chunk.len();

        let (state, records) = advance(std::mem::take(&mut self.state), chunk);
        self.state = state;
        self.record_count += records.len();

        trace!(
            "SSE chunk #{}: {} bytes, {} records, {} bytes carried",
            self.chunk_count,
            chunk.len(),
            records.len(),
            self.state.carryover.len()
        );

        records
    }

    /// End of stream: the unterminated tail is dropped
    pub fn finish(&mut self) {
        if !self.state.carryover.is_empty() {
            debug!(
                "Discarding {} bytes of unterminated SSE line at end of stream",
                self.state.carryover.len()
            );
        }
        self.state = DecoderState::default();
        debug!(
            "SSE decoder finished: {} chunks, {} bytes, {} records",
            self.chunk_count, self.bytes_received, self.record_count
        );
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: &str, data: &str) -> SseRecord {
        SseRecord {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    fn decode_all(chunks: &[&[u8]]) -> Vec<SseRecord> {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.feed(chunk));
        }
        decoder.finish();
        out
    }

    const STREAM: &str = "event: response.text.delta\n\
data: {\"text\":\"Load is\"}\n\
\n\
event: response.text.delta\n\
data: {\"text\":\" high.\"}\n\
\n\
event: response\n\
data: {\"message_id\":101}\n\
\n";

    #[test]
    fn test_single_chunk_multiple_records() {
        let records = decode_all(&[STREAM.as_bytes()]);
        assert_eq!(
            records,
            vec![
                record("response.text.delta", "{\"text\":\"Load is\"}"),
                record("response.text.delta", "{\"text\":\" high.\"}"),
                record("response", "{\"message_id\":101}"),
            ]
        );
    }

    #[test]
    fn test_every_split_point_decodes_identically() {
        let whole = decode_all(&[STREAM.as_bytes()]);
        let bytes = STREAM.as_bytes();
        for i in 0..=bytes.len() {
            for j in i..=bytes.len() {
                let split = decode_all(&[&bytes[..i], &bytes[i..j], &bytes[j..]]);
                assert_eq!(split, whole, "split at {} and {}", i, j);
            }
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let chunks: Vec<&[u8]> = STREAM.as_bytes().chunks(1).collect();
        assert_eq!(decode_all(&chunks).len(), 3);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let text = "event: response.text.delta\ndata: {\"text\":\"40 °C ⚡\"}\n";
        let bytes = text.as_bytes();
        let degree = text.find('°').unwrap();
        let records = decode_all(&[&bytes[..degree + 1], &bytes[degree + 1..]]);
        assert_eq!(records, vec![record("response.text.delta", "{\"text\":\"40 °C ⚡\"}")]);
    }

    #[test]
    fn test_crlf_and_comments() {
        let text = ": keep-alive\r\nevent: metadata\r\ndata: {\"a\":1}\r\n\r\n";
        assert_eq!(decode_all(&[text.as_bytes()]), vec![record("metadata", "{\"a\":1}")]);
    }

    #[test]
    fn test_no_space_after_colon() {
        let text = "event:response\ndata:{\"b\":2}\n";
        assert_eq!(decode_all(&[text.as_bytes()]), vec![record("response", "{\"b\":2}")]);
    }

    #[test]
    fn test_data_before_event_pairs_within_frame() {
        let text = "data: {\"x\":1}\nevent: response.table\n\n";
        assert_eq!(
            decode_all(&[text.as_bytes()]),
            vec![record("response.table", "{\"x\":1}")]
        );
    }

    #[test]
    fn test_half_frames_do_not_leak_into_next_frame() {
        let text = format!("data: {{}}\n\nevent: ping\n\n{}", STREAM);
        let whole = decode_all(&[STREAM.as_bytes()]);
        assert_eq!(decode_all(&[text.as_bytes()]), whole);

        let bytes = text.as_bytes();
        for i in 0..=bytes.len() {
            assert_eq!(decode_all(&[&bytes[..i], &bytes[i..]]), whole, "split at {}", i);
        }
    }

    #[test]
    fn test_blank_line_clears_pending_state() {
        let (state, records) = advance(DecoderState::default(), b"data: {}\n");
        assert!(records.is_empty());
        assert_eq!(state.pending_data, "{}");

        let (state, records) = advance(state, b"\n");
        assert!(records.is_empty());
        assert_eq!(state, DecoderState::default());
    }

    #[test]
    fn test_blank_data_discards_record() {
        let text = "event: response.text.delta\ndata: \n\
event: response.text.delta\ndata: {\"text\":\"ok\"}\n";
        assert_eq!(
            decode_all(&[text.as_bytes()]),
            vec![record("response.text.delta", "{\"text\":\"ok\"}")]
        );
    }

    #[test]
    fn test_unterminated_tail_is_discarded() {
        let text = "event: response\ndata: {\"message_id\":1}\n\
                    event: response.text.delta\ndata: {\"te";
        let records = decode_all(&[text.as_bytes()]);
        assert_eq!(records, vec![record("response", "{\"message_id\":1}")]);
    }

    #[test]
    fn test_advance_is_pure() {
        let (state, records) = advance(DecoderState::default(), b"event: metadata\nda");
        assert!(records.is_empty());
        assert_eq!(state.pending_event, "metadata");
        assert_eq!(state.carryover, b"da");

        let (state, records) = advance(state, b"ta: {}\n");
        assert_eq!(records, vec![record("metadata", "{}")]);
        assert_eq!(state, DecoderState::default());
    }

    #[test]
    fn test_decoder_counters() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"event: a\n");
        decoder.feed(b"data: {}\n");
        assert_eq!(decoder.chunk_count(), 2);
        assert_eq!(decoder.bytes_received(), 18);
        assert_eq!(decoder.record_count(), 1);
    }
}
