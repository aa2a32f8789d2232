use std::collections::BTreeMap;

use relayhub_protocol::encode_event;
use serde_json::{Value as JsonValue, json};

use crate::TransformError;

pub fn parse_object(body: &[u8], what: &str) -> Result<JsonValue, TransformError> {
    let value: JsonValue = serde_json::from_slice(body)
        .map_err(|err| TransformError::request(format!("{what}: {err}")))?;
    if !value.is_object() {
        return Err(TransformError::request(format!("{what}: not a JSON object")));
    }
    Ok(value)
}

pub fn parse_response_object(body: &[u8], what: &str) -> Result<JsonValue, TransformError> {
    serde_json::from_slice(body).map_err(|err| TransformError::response(format!("{what}: {err}")))
}

/// Collapse a Claude `system` field (string or text-block array) into one
/// string.
pub fn system_text(system: &JsonValue) -> Option<String> {
    match system {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Array(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter_map(|block| block["text"].as_str())
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}

/// Flatten message content (string or block array) into plain text, rendering
/// non-text blocks as their JSON.
pub fn content_text(content: &JsonValue) -> String {
    match content {
        JsonValue::String(text) => text.clone(),
        JsonValue::Array(blocks) => {
            let mut out = String::new();
            for block in blocks {
                if let Some(text) = block["text"].as_str() {
                    out.push_str(text);
                } else if !block.is_null() {
                    out.push_str(&block.to_string());
                }
            }
            out
        }
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Serialize tool-call arguments the way OpenAI expects: a JSON string.
pub fn args_json_string(input: &JsonValue) -> String {
    match input {
        JsonValue::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// Parse an accumulated arguments string back into a JSON value; malformed
/// fragments degrade to an empty object rather than failing the stream.
pub fn parse_args(raw: &str) -> JsonValue {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| json!({}))
}

pub fn gen_message_id() -> String {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("msg_{nanos}")
}

pub fn map_chat_finish_reason(reason: &str) -> &'static str {
    match reason {
        "length" => "max_tokens",
        "tool_calls" | "function_call" => "tool_use",
        _ => "end_turn",
    }
}

pub fn map_gemini_finish_reason(reason: &str, saw_tool_call: bool) -> &'static str {
    match reason {
        "MAX_TOKENS" => "max_tokens",
        _ if saw_tool_call => "tool_use",
        _ => "end_turn",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
}

/// Emits the Claude-side SSE event sequence for a translated stream.
///
/// Tracks which content blocks are open so `message_stop` is always preceded
/// by matching `content_block_stop` events, whatever the upstream sent.
#[derive(Debug, Default)]
pub struct ClaudeEmitter {
    started: bool,
    finished: bool,
    next_index: u64,
    open: BTreeMap<u64, BlockKind>,
    saw_tool_use: bool,
}

impl ClaudeEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn saw_tool_use(&self) -> bool {
        self.saw_tool_use
    }

    pub fn message_start(&mut self, id: &str, model: &str) -> Option<String> {
        if self.started {
            return None;
        }
        self.started = true;
        Some(encode_event(
            Some("message_start"),
            &json!({
                "type": "message_start",
                "message": {
                    "id": id,
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": model,
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": 0, "output_tokens": 0}
                }
            }),
        ))
    }

    pub fn start_text_block(&mut self) -> (u64, String) {
        let index = self.alloc(BlockKind::Text);
        let frame = encode_event(
            Some("content_block_start"),
            &json!({
                "type": "content_block_start",
                "index": index,
                "content_block": {"type": "text", "text": ""}
            }),
        );
        (index, frame)
    }

    pub fn start_tool_block(&mut self, id: &str, name: &str) -> (u64, String) {
        self.saw_tool_use = true;
        let index = self.alloc(BlockKind::ToolUse);
        let frame = encode_event(
            Some("content_block_start"),
            &json!({
                "type": "content_block_start",
                "index": index,
                "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}
            }),
        );
        (index, frame)
    }

    pub fn text_delta(&self, index: u64, text: &str) -> String {
        encode_event(
            Some("content_block_delta"),
            &json!({
                "type": "content_block_delta",
                "index": index,
                "delta": {"type": "text_delta", "text": text}
            }),
        )
    }

    pub fn input_json_delta(&self, index: u64, partial_json: &str) -> String {
        encode_event(
            Some("content_block_delta"),
            &json!({
                "type": "content_block_delta",
                "index": index,
                "delta": {"type": "input_json_delta", "partial_json": partial_json}
            }),
        )
    }

    pub fn stop_block(&mut self, index: u64) -> Option<String> {
        self.open.remove(&index)?;
        Some(encode_event(
            Some("content_block_stop"),
            &json!({"type": "content_block_stop", "index": index}),
        ))
    }

    pub fn stop_all_blocks(&mut self, out: &mut Vec<String>) {
        let indices: Vec<u64> = self.open.keys().copied().collect();
        for index in indices {
            if let Some(frame) = self.stop_block(index) {
                out.push(frame);
            }
        }
    }

    pub fn message_delta(&self, stop_reason: &str, usage: Option<(u64, u64)>) -> String {
        let usage = match usage {
            Some((input, output)) => json!({"input_tokens": input, "output_tokens": output}),
            None => json!({"output_tokens": 0}),
        };
        encode_event(
            Some("message_delta"),
            &json!({
                "type": "message_delta",
                "delta": {"stop_reason": stop_reason, "stop_sequence": null},
                "usage": usage
            }),
        )
    }

    pub fn message_stop(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(encode_event(
            Some("message_stop"),
            &json!({"type": "message_stop"}),
        ))
    }

    fn alloc(&mut self, kind: BlockKind) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.open.insert(index, kind);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_start_is_emitted_once() {
        let mut emitter = ClaudeEmitter::new();
        assert!(emitter.message_start("msg_1", "m").is_some());
        assert!(emitter.message_start("msg_1", "m").is_none());
        assert!(emitter.started());
    }

    #[test]
    fn stop_all_closes_open_blocks_in_order() {
        let mut emitter = ClaudeEmitter::new();
        emitter.message_start("msg_1", "m");
        let (text_index, _) = emitter.start_text_block();
        let (tool_index, _) = emitter.start_tool_block("toolu_1", "get");
        assert_eq!((text_index, tool_index), (0, 1));

        let mut frames = Vec::new();
        emitter.stop_all_blocks(&mut frames);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("\"index\":0"));
        assert!(frames[1].contains("\"index\":1"));
        assert!(emitter.saw_tool_use());
    }

    #[test]
    fn system_text_joins_blocks() {
        let system = json!([{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]);
        assert_eq!(system_text(&system), Some("a\nb".to_string()));
        assert_eq!(system_text(&json!("solo")), Some("solo".to_string()));
        assert_eq!(system_text(&json!(null)), None);
    }

    #[test]
    fn parse_args_degrades_gracefully() {
        assert_eq!(parse_args("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_args(""), json!({}));
        assert_eq!(parse_args("{broken"), json!({}));
    }
}
