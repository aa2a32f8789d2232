use std::collections::BTreeMap;

use relayhub_protocol::data_payload;
use serde_json::Value as JsonValue;

use crate::support::ClaudeEmitter;

/// Responses `response.*` SSE events translated 1:1 into Claude stream
/// events. Open blocks are tracked per `output_index` so stops land on the
/// right Claude block.
#[derive(Debug, Default)]
pub struct ResponsesToClaudeStream {
    emitter: ClaudeEmitter,
    blocks: BTreeMap<u64, u64>,
}

impl ResponsesToClaudeStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) -> Vec<String> {
        let Some(payload) = data_payload(line) else {
            return Vec::new();
        };
        let Ok(event) = serde_json::from_str::<JsonValue>(payload) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        match event["type"].as_str() {
            Some("response.created") => {
                let response = &event["response"];
                let id = response["id"].as_str().unwrap_or("unknown");
                let model = response["model"].as_str().unwrap_or("unknown");
                if let Some(frame) = self.emitter.message_start(id, model) {
                    out.push(frame);
                }
            }
            Some("response.output_item.added") => {
                let item = &event["item"];
                if item["type"] == "function_call" {
                    self.ensure_started(&mut out);
                    let call_id = item["call_id"]
                        .as_str()
                        .or_else(|| item["id"].as_str())
                        .unwrap_or_default()
                        .to_string();
                    let name = item["name"].as_str().unwrap_or_default().to_string();
                    let (index, frame) = self.emitter.start_tool_block(&call_id, &name);
                    self.blocks.insert(output_index(&event), index);
                    out.push(frame);
                }
            }
            Some("response.content_part.added") => {
                self.ensure_started(&mut out);
                let (index, frame) = self.emitter.start_text_block();
                self.blocks.insert(output_index(&event), index);
                out.push(frame);
            }
            Some("response.output_text.delta") => {
                if let (Some(index), Some(delta)) = (
                    self.blocks.get(&output_index(&event)).copied(),
                    event["delta"].as_str(),
                ) {
                    out.push(self.emitter.text_delta(index, delta));
                }
            }
            Some("response.function_call_arguments.delta") => {
                if let (Some(index), Some(delta)) = (
                    self.blocks.get(&output_index(&event)).copied(),
                    event["delta"].as_str(),
                ) {
                    out.push(self.emitter.input_json_delta(index, delta));
                }
            }
            Some("response.content_part.done") | Some("response.output_item.done") => {
                if let Some(index) = self.blocks.remove(&output_index(&event))
                    && let Some(frame) = self.emitter.stop_block(index)
                {
                    out.push(frame);
                }
            }
            Some("response.completed") => {
                self.emitter.stop_all_blocks(&mut out);
                let usage = &event["response"]["usage"];
                let usage = usage.is_object().then(|| {
                    (
                        usage["input_tokens"].as_u64().unwrap_or(0),
                        usage["output_tokens"].as_u64().unwrap_or(0),
                    )
                });
                let stop_reason = if self.emitter.saw_tool_use() {
                    "tool_use"
                } else {
                    "end_turn"
                };
                out.push(self.emitter.message_delta(stop_reason, usage));
                if let Some(frame) = self.emitter.message_stop() {
                    out.push(frame);
                }
            }
            _ => {}
        }
        out
    }

    fn ensure_started(&mut self, out: &mut Vec<String>) {
        if !self.emitter.started()
            && let Some(frame) = self.emitter.message_start("unknown", "unknown")
        {
            out.push(frame);
        }
    }
}

fn output_index(event: &JsonValue) -> u64 {
    event["output_index"].as_u64().unwrap_or(0)
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
    fn text_stream_maps_one_to_one() {
        let mut stream = ResponsesToClaudeStream::new();
        let mut frames = Vec::new();
        frames.extend(stream.push_line(
            r#"data: {"type":"response.created","response":{"id":"resp_1","model":"o-x"}}"#,
        ));
        frames.extend(stream.push_line(
            r#"data: {"type":"response.content_part.added","output_index":0,"part":{"type":"output_text"}}"#,
        ));
        frames.extend(stream.push_line(
            r#"data: {"type":"response.output_text.delta","output_index":0,"delta":"hi"}"#,
        ));
        frames.extend(
            stream.push_line(r#"data: {"type":"response.content_part.done","output_index":0}"#),
        );
        frames.extend(stream.push_line(
            r#"data: {"type":"response.completed","response":{"usage":{"input_tokens":4,"output_tokens":1}}}"#,
        ));

        assert_eq!(
            event_types(&frames),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );
        assert!(frames[0].contains("\"id\":\"resp_1\""));
        assert!(frames[4].contains("\"stop_reason\":\"end_turn\""));
        assert!(frames[4].contains("\"input_tokens\":4"));
    }

    #[test]
    fn function_call_stream_opens_tool_block() {
        let mut stream = ResponsesToClaudeStream::new();
        let mut frames = Vec::new();
        frames.extend(stream.push_line(
            r#"data: {"type":"response.created","response":{"id":"resp_1","model":"o-x"}}"#,
        ));
        frames.extend(stream.push_line(
            r#"data: {"type":"response.output_item.added","output_index":0,"item":{"type":"function_call","call_id":"call_1","name":"f"}}"#,
        ));
        frames.extend(stream.push_line(
            r#"data: {"type":"response.function_call_arguments.delta","output_index":0,"delta":"{\"a\":1}"}"#,
        ));
        frames.extend(
            stream.push_line(r#"data: {"type":"response.output_item.done","output_index":0}"#),
        );
        frames.extend(stream.push_line(r#"data: {"type":"response.completed","response":{}}"#));

        assert_eq!(
            event_types(&frames),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop"
            ]
        );
        assert!(frames[1].contains("\"tool_use\""));
        assert!(frames[1].contains("\"id\":\"call_1\""));
        assert!(frames[4].contains("\"stop_reason\":\"tool_use\""));
    }

    #[test]
    fn message_item_done_without_part_done_still_stops_block() {
        let mut stream = ResponsesToClaudeStream::new();
        stream.push_line(r#"data: {"type":"response.created","response":{"id":"r","model":"m"}}"#);
        stream.push_line(r#"data: {"type":"response.content_part.added","output_index":0}"#);
        let frames =
            stream.push_line(r#"data: {"type":"response.output_item.done","output_index":0}"#);
        assert_eq!(event_types(&frames), vec!["content_block_stop"]);
    }
}
