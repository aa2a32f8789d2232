use std::collections::BTreeMap;

use relayhub_protocol::{data_payload, encode_event, is_done_payload};
use serde_json::{Value as JsonValue, json};

/// Chat-completions SSE chunks synthesised back into Responses `response.*`
/// events for clients that asked `/v1/responses`.
#[derive(Debug, Default)]
pub struct ChatToResponsesStream {
    response_id: String,
    model: String,
    created: bool,
    message_added: bool,
    part_added: bool,
    next_output_index: u64,
    message_output_index: u64,
    tool_calls: BTreeMap<u64, ToolItem>,
    text: String,
    usage: JsonValue,
    done: bool,
}

#[derive(Debug, Default)]
struct ToolItem {
    output_index: u64,
    call_id: String,
    name: String,
    arguments: String,
    added: bool,
}

impl ChatToResponsesStream {
    pub fn new() -> Self {
        Self {
            usage: JsonValue::Null,
            ..Self::default()
        }
    }

    pub fn push_line(&mut self, line: &str) -> Vec<String> {
        let Some(payload) = data_payload(line) else {
            return Vec::new();
        };
        if is_done_payload(payload) {
            return self.finish();
        }
        let Ok(chunk) = serde_json::from_str::<JsonValue>(payload) else {
            return Vec::new();
        };

        let mut out = Vec::new();

        if let Some(usage) = chunk.get("usage").filter(|u| u.is_object()) {
            self.usage = json!({
                "input_tokens": usage["prompt_tokens"].as_u64().unwrap_or(0),
                "output_tokens": usage["completion_tokens"].as_u64().unwrap_or(0),
                "cache_read_input_tokens":
                    usage["prompt_tokens_details"]["cached_tokens"].as_u64().unwrap_or(0),
                "reasoning_tokens":
                    usage["completion_tokens_details"]["reasoning_tokens"].as_u64().unwrap_or(0),
            });
        }

        if !self.created {
            self.response_id = chunk["id"].as_str().unwrap_or("resp_unknown").to_string();
            self.model = chunk["model"].as_str().unwrap_or_default().to_string();
            self.created = true;
            out.push(encode_event(
                Some("response.created"),
                &json!({
                    "type": "response.created",
                    "response": self.response_skeleton("in_progress"),
                }),
            ));
        }

        let delta = &chunk["choices"][0]["delta"];
        if let Some(text) = delta["content"].as_str()
            && !text.is_empty()
        {
            self.ensure_message_item(&mut out);
            self.text.push_str(text);
            out.push(encode_event(
                Some("response.output_text.delta"),
                &json!({
                    "type": "response.output_text.delta",
                    "output_index": self.message_output_index,
                    "content_index": 0,
                    "delta": text,
                }),
            ));
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for call in tool_calls {
                self.push_tool_fragment(call, &mut out);
            }
        }

        out
    }

    fn ensure_message_item(&mut self, out: &mut Vec<String>) {
        if !self.message_added {
            self.message_added = true;
            self.message_output_index = self.next_output_index;
            self.next_output_index += 1;
            out.push(encode_event(
                Some("response.output_item.added"),
                &json!({
                    "type": "response.output_item.added",
                    "output_index": self.message_output_index,
                    "item": {
                        "type": "message",
                        "id": format!("{}_msg_0", self.response_id),
                        "role": "assistant",
                        "status": "in_progress",
                    },
                }),
            ));
        }
        if !self.part_added {
            self.part_added = true;
            out.push(encode_event(
                Some("response.content_part.added"),
                &json!({
                    "type": "response.content_part.added",
                    "output_index": self.message_output_index,
                    "content_index": 0,
                    "part": {"type": "output_text", "text": "", "annotations": []},
                }),
            ));
        }
    }

    fn push_tool_fragment(&mut self, call: &JsonValue, out: &mut Vec<String>) {
        let index = call["index"].as_u64().unwrap_or(0);
        let item = self.tool_calls.entry(index).or_default();

        if let Some(id) = call["id"].as_str() {
            item.call_id = id.to_string();
        }
        if let Some(name) = call["function"]["name"].as_str() {
            item.name = name.to_string();
        }

        if !item.added && !item.call_id.is_empty() && !item.name.is_empty() {
            item.added = true;
            item.output_index = self.next_output_index;
            self.next_output_index += 1;
            out.push(encode_event(
                Some("response.output_item.added"),
                &json!({
                    "type": "response.output_item.added",
                    "output_index": item.output_index,
                    "item": {
                        "type": "function_call",
                        "id": format!("{}_fc_{index}", self.response_id),
                        "call_id": item.call_id,
                        "name": item.name,
                        "arguments": "",
                        "status": "in_progress",
                    },
                }),
            ));
        }

        if let Some(fragment) = call["function"]["arguments"].as_str()
            && !fragment.is_empty()
        {
            item.arguments.push_str(fragment);
            if item.added {
                out.push(encode_event(
                    Some("response.function_call_arguments.delta"),
                    &json!({
                        "type": "response.function_call_arguments.delta",
                        "output_index": item.output_index,
                        "delta": fragment,
                    }),
                ));
            }
        }
    }

    fn finish(&mut self) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.done = true;
        let mut out = Vec::new();

        if self.message_added {
            out.push(encode_event(
                Some("response.content_part.done"),
                &json!({
                    "type": "response.content_part.done",
                    "output_index": self.message_output_index,
                    "content_index": 0,
                    "part": {"type": "output_text", "text": self.text, "annotations": []},
                }),
            ));
            out.push(encode_event(
                Some("response.output_item.done"),
                &json!({
                    "type": "response.output_item.done",
                    "output_index": self.message_output_index,
                    "item": {
                        "type": "message",
                        "id": format!("{}_msg_0", self.response_id),
                        "role": "assistant",
                        "status": "completed",
                        "content": [{"type": "output_text", "text": self.text, "annotations": []}],
                    },
                }),
            ));
        }

        for (index, item) in &self.tool_calls {
            if !item.added {
                continue;
            }
            out.push(encode_event(
                Some("response.output_item.done"),
                &json!({
                    "type": "response.output_item.done",
                    "output_index": item.output_index,
                    "item": {
                        "type": "function_call",
                        "id": format!("{}_fc_{index}", self.response_id),
                        "call_id": item.call_id,
                        "name": item.name,
                        "arguments": item.arguments,
                        "status": "completed",
                    },
                }),
            ));
        }

        out.push(encode_event(
            Some("response.completed"),
            &json!({
                "type": "response.completed",
                "response": self.response_skeleton("completed"),
            }),
        ));
        out
    }

    fn response_skeleton(&self, status: &str) -> JsonValue {
        let mut response = json!({
            "id": self.response_id,
            "object": "response",
            "status": status,
            "model": self.model,
        });
        if status == "completed" && !self.usage.is_null() {
            response["usage"] = self.usage.clone();
        }
        response
    }
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
    fn text_stream_synthesises_response_events() {
        let mut stream = ChatToResponsesStream::new();
        let mut frames = Vec::new();
        frames.extend(stream.push_line(
            r#"data: {"id":"chatcmpl-1","model":"gpt-x","choices":[{"delta":{"content":"hi"}}]}"#,
        ));
        frames.extend(stream.push_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":4,"completion_tokens":2,"completion_tokens_details":{"reasoning_tokens":1}}}"#,
        ));
        frames.extend(stream.push_line("data: [DONE]"));

        assert_eq!(
            event_types(&frames),
            vec![
                "response.created",
                "response.output_item.added",
                "response.content_part.added",
                "response.output_text.delta",
                "response.content_part.done",
                "response.output_item.done",
                "response.completed"
            ]
        );
        let completed = frames.last().unwrap();
        assert!(completed.contains("\"input_tokens\":4"));
        assert!(completed.contains("\"reasoning_tokens\":1"));
    }

    #[test]
    fn tool_fragments_reconstruct_function_call_item() {
        let mut stream = ChatToResponsesStream::new();
        let mut frames = Vec::new();
        frames.extend(stream.push_line(
            r#"data: {"id":"c1","model":"m","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_2","function":{"name":"f","arguments":"{\"a\""}}]}}]}"#,
        ));
        frames.extend(stream.push_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":":1}"}}]}}]}"#,
        ));
        frames.extend(stream.push_line("data: [DONE]"));

        let types = event_types(&frames);
        assert!(types.contains(&"response.function_call_arguments.delta".to_string()));
        let done = frames
            .iter()
            .find(|f| f.starts_with("event: response.output_item.done"))
            .unwrap();
        assert!(done.contains("\"call_id\":\"call_2\""));
        assert!(done.contains("{\\\"a\\\":1}"));
        assert_eq!(types.last().unwrap(), "response.completed");
    }
}
