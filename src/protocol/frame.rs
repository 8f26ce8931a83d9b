/// Incremental frame decoder for the upstream wire stream.
///
/// The wire is newline-delimited and mixes two sub-formats: bare NDJSON
/// lines and SSE-prefixed lines (`event: <name>` followed by `data: <json>`).
/// A read boundary may split a line, so undecoded text is buffered across
/// feeds.
use memchr::memchr;
use serde_json::Value;

use super::StreamEvent;

/// Incremental line parser producing [`StreamEvent`]s.
///
/// Feed it raw text chunks (arriving at arbitrary byte boundaries) and it
/// yields fully-decoded protocol events. Once a terminal event
/// (`message-end` or `stream-end`) has been emitted the decoder ignores all
/// further input.
pub struct FrameDecoder {
    buffer: String,
    /// SSE `event:` type applying to subsequent `data:` lines. Cleared only
    /// by being overwritten.
    sse_event_type: Option<String>,
    terminated: bool,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            sse_event_type: None,
            terminated: false,
        }
    }

    /// Whether a terminal event has been emitted. Callers should stop
    /// reading the underlying byte stream once this returns true.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feed raw text and return any complete events decoded.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append decoded events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<StreamEvent>) {
        if self.terminated {
            return;
        }
        self.buffer.push_str(chunk);

        let mut consumed = 0;
        while let Some(rel_pos) = memchr(b'\n', &self.buffer.as_bytes()[consumed..]) {
            let line_end = consumed + rel_pos;
            Self::process_line(
                &self.buffer[consumed..line_end],
                &mut self.sse_event_type,
                &mut self.terminated,
                out,
            );
            consumed = line_end + 1;
            if self.terminated {
                break;
            }
        }

        if consumed == self.buffer.len() {
            self.buffer.clear();
        } else if consumed > 0 {
            self.buffer.drain(..consumed);
        }
    }

    fn process_line(
        line: &str,
        sse_event_type: &mut Option<String>,
        terminated: &mut bool,
        out: &mut Vec<StreamEvent>,
    ) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if let Some(value) = line.strip_prefix("event:") {
            *sse_event_type = Some(value.trim().to_string());
            return;
        }

        let payload = line.strip_prefix("data: ").unwrap_or(line);
        if !payload.starts_with('{') {
            // Covers [DONE]-style sentinels, comments, and stray text.
            return;
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unparseable stream frame");
                return;
            }
        };

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| sse_event_type.clone());

        match kind.as_deref() {
            Some("content-delta" | "text-generation") => {
                if let Some(text) = extract_text(&value) {
                    if !text.is_empty() {
                        out.push(StreamEvent::TextDelta(text));
                    }
                }
            }
            Some("tool-call-start") => {
                out.push(decode_tool_call_start(&value));
            }
            Some("tool-call-delta") => {
                out.push(StreamEvent::ToolCallDelta {
                    index: extract_index(&value),
                    arguments: extract_str(&value, "/delta/message/tool_calls/function/arguments"),
                });
            }
            Some("message-end") => {
                *terminated = true;
                out.push(StreamEvent::MessageEnd {
                    message: value.get("message").cloned().unwrap_or(Value::Null),
                });
            }
            Some("stream-end") => {
                *terminated = true;
                out.push(StreamEvent::StreamEnd);
            }
            // Unrecognized kinds are a no-op, not a defect.
            _ => {}
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract text from either payload shape:
/// `{delta:{message:{content:{text}}}}` or `{text}`.
fn extract_text(value: &Value) -> Option<String> {
    value
        .pointer("/delta/message/content/text")
        .and_then(Value::as_str)
        .or_else(|| value.get("text").and_then(Value::as_str))
        .map(str::to_string)
}

fn extract_index(value: &Value) -> usize {
    value
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|idx| usize::try_from(idx).ok())
        .unwrap_or(0)
}

fn extract_str(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn decode_tool_call_start(value: &Value) -> StreamEvent {
    StreamEvent::ToolCallStart {
        index: extract_index(value),
        id: extract_str(value, "/delta/message/tool_calls/id"),
        name: extract_str(value, "/delta/message/tool_calls/function/name"),
        arguments: extract_str(value, "/delta/message/tool_calls/function/arguments"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> Vec<StreamEvent> {
        let mut decoder = FrameDecoder::new();
        decoder.feed(input)
    }

    #[test]
    fn test_decode_bare_ndjson_text_delta() {
        let events =
            decode_all("{\"type\":\"content-delta\",\"delta\":{\"message\":{\"content\":{\"text\":\"Hi\"}}}}\n");
        assert_eq!(events, vec![StreamEvent::TextDelta("Hi".to_string())]);
    }

    #[test]
    fn test_decode_text_generation_flat_shape() {
        let events = decode_all("{\"type\":\"text-generation\",\"text\":\"Hello\"}\n");
        assert_eq!(events, vec![StreamEvent::TextDelta("Hello".to_string())]);
    }

    #[test]
    fn test_decode_data_prefixed_line() {
        let events = decode_all("data: {\"type\":\"text-generation\",\"text\":\"Hi\"}\n");
        assert_eq!(events, vec![StreamEvent::TextDelta("Hi".to_string())]);
    }

    #[test]
    fn test_empty_text_delta_not_emitted() {
        let events = decode_all("{\"type\":\"text-generation\",\"text\":\"\"}\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_sse_event_type_fallback() {
        let input = "event: message-end\ndata: {\"message\":{\"role\":\"assistant\"}}\n";
        let events = decode_all(input);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::MessageEnd { message } if message["role"] == "assistant"
        ));
    }

    #[test]
    fn test_explicit_type_wins_over_sse_event_type() {
        let input =
            "event: message-end\ndata: {\"type\":\"text-generation\",\"text\":\"still going\"}\n";
        let events = decode_all(input);
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta("still going".to_string())]
        );
    }

    #[test]
    fn test_sse_event_type_persists_until_overwritten() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed("event: text-generation\ndata: {\"text\":\"a\"}\n");
        assert_eq!(events, vec![StreamEvent::TextDelta("a".to_string())]);
        // Not cleared after use — the next typeless data line reuses it.
        let events = decoder.feed("data: {\"text\":\"b\"}\n");
        assert_eq!(events, vec![StreamEvent::TextDelta("b".to_string())]);
    }

    #[test]
    fn test_tool_call_start_and_delta() {
        let input = concat!(
            "{\"type\":\"tool-call-start\",\"index\":0,\"delta\":{\"message\":{\"tool_calls\":",
            "{\"id\":\"call_1\",\"function\":{\"name\":\"lookup\",\"arguments\":\"\"}}}}}\n",
            "{\"type\":\"tool-call-delta\",\"index\":0,\"delta\":{\"message\":{\"tool_calls\":",
            "{\"function\":{\"arguments\":\"{\\\"q\\\":1}\"}}}}}\n",
        );
        let events = decode_all(input);
        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallStart {
                    index: 0,
                    id: "call_1".to_string(),
                    name: "lookup".to_string(),
                    arguments: String::new(),
                },
                StreamEvent::ToolCallDelta {
                    index: 0,
                    arguments: "{\"q\":1}".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_malformed_json_skipped_non_fatally() {
        let input = "{\"type\":\"text-generation\",\"text\":\"a\"}\n{not json\n{\"type\":\"text-generation\",\"text\":\"b\"}\n";
        let events = decode_all(input);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("a".to_string()),
                StreamEvent::TextDelta("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_json_lines_discarded() {
        let events = decode_all("[DONE]\n: keep-alive comment\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_unknown_event_kind_ignored() {
        let events = decode_all("{\"type\":\"citation-start\",\"index\":0}\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_terminal_event_stops_decoding() {
        let input = "{\"type\":\"stream-end\"}\n{\"type\":\"text-generation\",\"text\":\"late\"}\n";
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(input);
        assert_eq!(events, vec![StreamEvent::StreamEnd]);
        assert!(decoder.is_terminated());
        // Further feeds are ignored outright.
        assert!(decoder
            .feed("{\"type\":\"text-generation\",\"text\":\"more\"}\n")
            .is_empty());
    }

    #[test]
    fn test_frame_splitting_invariance() {
        let input = concat!(
            "event: message-end\n",
            "data: {\"message\":{\"role\":\"assistant\",\"content\":\"done\"}}\n",
        );
        let whole = decode_all(
            "{\"type\":\"content-delta\",\"delta\":{\"message\":{\"content\":{\"text\":\"Hel\"}}}}\n",
        );

        // Same logical content, delivered one byte at a time.
        let full = format!(
            "{}{}",
            "{\"type\":\"content-delta\",\"delta\":{\"message\":{\"content\":{\"text\":\"Hel\"}}}}\n",
            input
        );
        for split_chunk in [1usize, 2, 3, 7, 16] {
            let mut decoder = FrameDecoder::new();
            let mut events = Vec::new();
            let bytes = full.as_bytes();
            let mut pos = 0;
            while pos < bytes.len() {
                let end = (pos + split_chunk).min(bytes.len());
                // Test input is ASCII, so any split is a char boundary.
                decoder.feed_into(std::str::from_utf8(&bytes[pos..end]).unwrap(), &mut events);
                pos = end;
            }
            assert_eq!(events.len(), 2, "chunk size {split_chunk}");
            assert_eq!(events[0], whole[0], "chunk size {split_chunk}");
            assert!(events[1].is_terminal(), "chunk size {split_chunk}");
        }
    }

    #[test]
    fn test_message_end_carries_payload() {
        let events =
            decode_all("{\"type\":\"message-end\",\"message\":{\"role\":\"assistant\",\"tool_calls\":[]}}\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::MessageEnd { message } if message["role"] == "assistant"
        ));
    }
}
