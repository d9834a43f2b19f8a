//! Transcript events at the transport boundary.
//!
//! Agent output is a stream of JSON lines whose exact shape depends on the
//! transport. Frames are parsed once at ingress into this tagged union and
//! handled as records from then on. The parser accepts both the harness's
//! canonical shape and the agent CLI's stream-json envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cost::UsageTotals;

/// One event from the agent transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEvent {
    /// An assistant message. One of these marks one turn.
    Message { text: String },
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        id: String,
        name: String,
        output: String,
        is_error: bool,
    },
    /// Incremental token usage for the current turn.
    UsageUpdate {
        input: u64,
        output: u64,
        cache_read: u64,
        cache_write: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// The agent's final frame.
    Completion {
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    Error { message: String },
}

impl TranscriptEvent {
    pub fn usage(input: u64, output: u64) -> Self {
        TranscriptEvent::UsageUpdate {
            input,
            output,
            cache_read: 0,
            cache_write: 0,
            model: None,
        }
    }

    pub fn usage_totals(&self) -> Option<UsageTotals> {
        match self {
            TranscriptEvent::UsageUpdate {
                input,
                output,
                cache_read,
                cache_write,
                ..
            } => Some(UsageTotals {
                input: *input,
                output: *output,
                cache_read: *cache_read,
                cache_write: *cache_write,
            }),
            _ => None,
        }
    }
}

/// Parse one transcript line into zero or more events.
///
/// Non-JSON lines and unrecognized frames are skipped: agents interleave
/// plain progress text with structured output and the stream must survive it.
pub fn parse_transcript_line(line: &str) -> Vec<TranscriptEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    // Canonical shape first.
    if let Ok(event) = serde_json::from_str::<TranscriptEvent>(trimmed) {
        return vec![event];
    }

    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Vec::new();
    };

    match value.get("type").and_then(Value::as_str) {
        Some("assistant") => parse_assistant_frame(&value),
        Some("user") => parse_user_frame(&value),
        Some("result") => parse_result_frame(&value),
        Some("error") => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| value.get("error").and_then(Value::as_str))
                .unwrap_or("unknown error")
                .to_string();
            vec![TranscriptEvent::Error { message }]
        }
        _ => Vec::new(),
    }
}

/// `{"type":"assistant","message":{"content":[...],"usage":{...}}}`
fn parse_assistant_frame(value: &Value) -> Vec<TranscriptEvent> {
    let mut events = Vec::new();
    let message = value.get("message").unwrap_or(value);

    if let Some(content) = message.get("content").and_then(Value::as_array) {
        let mut text = String::new();
        for block in content {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(Value::as_str) {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(t);
                    }
                }
                Some("tool_use") => {
                    events.push(TranscriptEvent::ToolCall {
                        id: block
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        name: block
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        input: block.get("input").cloned().unwrap_or(Value::Null),
                    });
                }
                _ => {}
            }
        }
        // The message event leads so turn counting sees it before its tools.
        if !text.is_empty() {
            events.insert(0, TranscriptEvent::Message { text });
        }
    }

    if let Some(usage) = extract_usage(message.get("usage")) {
        events.push(usage);
    }
    events
}

/// `{"type":"user","message":{"content":[{"type":"tool_result",...}]}}`
fn parse_user_frame(value: &Value) -> Vec<TranscriptEvent> {
    let mut events = Vec::new();
    let content = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array);
    let Some(content) = content else {
        return events;
    };

    for block in content {
        if block.get("type").and_then(Value::as_str) == Some("tool_result") {
            let output = match block.get("content") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            events.push(TranscriptEvent::ToolResult {
                id: block
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                output,
                is_error: block
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            });
        }
    }
    events
}

/// `{"type":"result","is_error":...,"result":"...","usage":{...}}`
fn parse_result_frame(value: &Value) -> Vec<TranscriptEvent> {
    let mut events = Vec::new();
    if let Some(usage) = extract_usage(value.get("usage")) {
        events.push(usage);
    }
    events.push(TranscriptEvent::Completion {
        is_error: value
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        summary: value
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string),
    });
    events
}

fn extract_usage(usage: Option<&Value>) -> Option<TranscriptEvent> {
    let usage = usage?;
    let field = |names: &[&str]| -> u64 {
        names
            .iter()
            .find_map(|n| usage.get(n).and_then(Value::as_u64))
            .unwrap_or(0)
    };
    let input = field(&["input_tokens", "prompt_tokens"]);
    let output = field(&["output_tokens", "completion_tokens"]);
    let cache_read = field(&["cache_read_input_tokens", "cache_read_tokens"]);
    let cache_write = field(&["cache_creation_input_tokens", "cache_write_tokens"]);
    if input == 0 && output == 0 && cache_read == 0 && cache_write == 0 {
        return None;
    }
    Some(TranscriptEvent::UsageUpdate {
        input,
        output,
        cache_read,
        cache_write,
        model: usage.get("model").and_then(Value::as_str).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_message_round_trip() {
        let event = TranscriptEvent::Message {
            text: "working on it".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(parse_transcript_line(&json), vec![event]);
    }

    #[test]
    fn test_canonical_completion() {
        let line = r#"{"type":"completion","is_error":false,"summary":"done"}"#;
        let events = parse_transcript_line(line);
        assert_eq!(
            events,
            vec![TranscriptEvent::Completion {
                is_error: false,
                summary: Some("done".to_string())
            }]
        );
    }

    #[test]
    fn test_blank_and_garbage_lines_are_skipped() {
        assert!(parse_transcript_line("").is_empty());
        assert!(parse_transcript_line("   ").is_empty());
        assert!(parse_transcript_line("plain progress text").is_empty());
        assert!(parse_transcript_line("{\"type\":\"system\"}").is_empty());
    }

    #[test]
    fn test_cli_assistant_frame_with_text_and_tool() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"let me check"},
            {"type":"tool_use","id":"t1","name":"Read","input":{"path":"a.rs"}}
        ],"usage":{"input_tokens":120,"output_tokens":40}}}"#
            .replace('\n', "");
        let events = parse_transcript_line(&line);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], TranscriptEvent::Message { text } if text == "let me check"));
        assert!(matches!(&events[1], TranscriptEvent::ToolCall { name, .. } if name == "Read"));
        assert!(matches!(
            &events[2],
            TranscriptEvent::UsageUpdate { input: 120, output: 40, .. }
        ));
    }

    #[test]
    fn test_cli_result_frame() {
        let line = r#"{"type":"result","is_error":false,"result":"all done","usage":{"input_tokens":10,"output_tokens":5,"cache_read_input_tokens":2}}"#;
        let events = parse_transcript_line(line);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            TranscriptEvent::UsageUpdate { cache_read: 2, .. }
        ));
        assert!(matches!(
            &events[1],
            TranscriptEvent::Completion { is_error: false, summary: Some(s) } if s == "all done"
        ));
    }

    #[test]
    fn test_cli_tool_result_frame() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"file contents","is_error":false}]}}"#;
        let events = parse_transcript_line(line);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            TranscriptEvent::ToolResult { id, output, is_error: false, .. }
                if id == "t1" && output == "file contents"
        ));
    }

    #[test]
    fn test_openai_style_usage_names() {
        let line = r#"{"type":"result","usage":{"prompt_tokens":100,"completion_tokens":20}}"#;
        let events = parse_transcript_line(line);
        assert!(matches!(
            &events[0],
            TranscriptEvent::UsageUpdate { input: 100, output: 20, .. }
        ));
    }

    #[test]
    fn test_error_frame() {
        let line = r#"{"type":"error","message":"connection reset"}"#;
        let events = parse_transcript_line(line);
        assert_eq!(
            events,
            vec![TranscriptEvent::Error {
                message: "connection reset".to_string()
            }]
        );
    }
}
