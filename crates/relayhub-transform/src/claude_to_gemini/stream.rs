use relayhub_protocol::data_payload;
use serde_json::Value as JsonValue;

use crate::support::{ClaudeEmitter, gen_message_id, map_gemini_finish_reason};

/// Gemini streaming chunks translated into Claude stream events.
///
/// With `alt=sse` the upstream sends `data:` framed JSON objects; without it,
/// a JSON array streamed one element per line. Both shapes are accepted.
#[derive(Debug, Default)]
pub struct GeminiToClaudeStream {
    emitter: ClaudeEmitter,
    text_block: Option<u64>,
    tool_seq: u64,
    usage: Option<(u64, u64)>,
    finished: bool,
}

impl GeminiToClaudeStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) -> Vec<String> {
        let Some(chunk) = parse_chunk(line) else {
            return Vec::new();
        };

        let mut out = Vec::new();

        if !self.emitter.started() {
            let id = chunk["responseId"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(gen_message_id);
            let model = chunk["modelVersion"].as_str().unwrap_or("unknown");
            if let Some(frame) = self.emitter.message_start(&id, model) {
                out.push(frame);
            }
        }

        if let Some(meta) = chunk.get("usageMetadata").filter(|m| m.is_object()) {
            let input = meta["promptTokenCount"].as_u64().unwrap_or(0);
            let output = meta["candidatesTokenCount"].as_u64().unwrap_or(0);
            self.usage = Some(match self.usage {
                Some((i, o)) => (i.max(input), o.max(output)),
                None => (input, output),
            });
        }

        let candidate = &chunk["candidates"][0];
        if let Some(parts) = candidate["content"]["parts"].as_array() {
            for part in parts {
                self.push_part(part, &mut out);
            }
        }

        if let Some(reason) = candidate["finishReason"].as_str()
            && !self.finished
        {
            self.finished = true;
            self.emitter.stop_all_blocks(&mut out);
            let stop_reason = map_gemini_finish_reason(reason, self.emitter.saw_tool_use());
            out.push(self.emitter.message_delta(stop_reason, self.usage));
            if let Some(frame) = self.emitter.message_stop() {
                out.push(frame);
            }
        }

        out
    }

    fn push_part(&mut self, part: &JsonValue, out: &mut Vec<String>) {
        if let Some(text) = part["text"].as_str() {
            if text.is_empty() {
                return;
            }
            let index = match self.text_block {
                Some(index) => index,
                None => {
                    let (index, frame) = self.emitter.start_text_block();
                    self.text_block = Some(index);
                    out.push(frame);
                    index
                }
            };
            out.push(self.emitter.text_delta(index, text));
        } else if let Some(call) = part.get("functionCall").filter(|c| c.is_object()) {
            self.tool_seq += 1;
            let id = format!("toolu_{}", self.tool_seq);
            let name = call["name"].as_str().unwrap_or_default();
            let (index, frame) = self.emitter.start_tool_block(&id, name);
            out.push(frame);
            let args = if call["args"].is_null() {
                "{}".to_string()
            } else {
                call["args"].to_string()
            };
            out.push(self.emitter.input_json_delta(index, &args));
        }
    }
}

/// Accept `data:` framed payloads and bare JSON-array streaming lines.
fn parse_chunk(line: &str) -> Option<JsonValue> {
    let trimmed = line.trim();
    let payload = match data_payload(trimmed) {
        Some(payload) => payload.trim(),
        None => trimmed
            .trim_start_matches(['[', ','])
            .trim_end_matches([']', ','])
            .trim(),
    };
    if !payload.starts_with('{') {
        return None;
    }
    serde_json::from_str(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_types(frames: &[String]) -> Vec<String> {
        frames
            .iter()
            .map(|frame| {
                frame
                    .lines()
                    .next()
                    .unwrap()
                    .trim_start_matches("event: ")
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn sse_framed_text_stream() {
        let mut stream = GeminiToClaudeStream::new();
        let mut frames = Vec::new();
        frames.extend(stream.push_line(
            r#"data: {"responseId":"r1","modelVersion":"gemini-test","candidates":[{"content":{"parts":[{"text":"hel"}]}}]}"#,
        ));
        frames.extend(stream.push_line(
            r#"data: {"candidates":[{"content":{"parts":[{"text":"lo"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":5,"candidatesTokenCount":2}}"#,
        ));

        assert_eq!(
            event_types(&frames),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );
        assert!(frames[0].contains("\"id\":\"r1\""));
        assert!(frames[0].contains("gemini-test"));
        assert!(frames[5].contains("\"input_tokens\":5"));
    }

    #[test]
    fn json_array_lines_are_accepted() {
        let mut stream = GeminiToClaudeStream::new();
        assert!(stream.push_line("[").is_empty());
        let frames = stream.push_line(
            r#"{"candidates":[{"content":{"parts":[{"text":"x"}]}}]},"#,
        );
        assert!(!frames.is_empty());
        assert!(frames.iter().any(|f| f.contains("\"text\":\"x\"")));
    }

    #[test]
    fn function_call_opens_tool_block_with_single_delta() {
        let mut stream = GeminiToClaudeStream::new();
        let mut frames = Vec::new();
        frames.extend(stream.push_line(
            r#"data: {"candidates":[{"content":{"parts":[{"functionCall":{"name":"f","args":{"a":1}}}]},"finishReason":"STOP"}]}"#,
        ));
        let types = event_types(&frames);
        assert!(types.contains(&"content_block_start".to_string()));
        let delta = frames.iter().find(|f| f.contains("input_json_delta")).unwrap();
        assert!(delta.contains("{\\\"a\\\":1}"));
        let message_delta = frames
            .iter()
            .find(|f| f.starts_with("event: message_delta"))
            .unwrap();
        assert!(message_delta.contains("\"stop_reason\":\"tool_use\""));
    }

    #[test]
    fn generated_message_id_when_absent() {
        let mut stream = GeminiToClaudeStream::new();
        let frames = stream.push_line(
            r#"data: {"candidates":[{"content":{"parts":[{"text":"x"}]}}]}"#,
        );
        assert!(frames[0].contains("\"id\":\"msg_"));
    }
}
