use std::collections::BTreeMap;

use relayhub_protocol::{data_payload, is_done_payload};
use serde_json::Value as JsonValue;

use crate::support::{ClaudeEmitter, map_chat_finish_reason};

#[derive(Debug, Default)]
struct ToolCallSlot {
    id: Option<String>,
    name: Option<String>,
    block_index: Option<u64>,
    pending_args: String,
}

/// Chat-completions SSE chunks translated into Claude stream events.
///
/// Tool-call fragments arrive keyed by the chunk's `tool_calls[].index`; a
/// `content_block_start` is only emitted once both id and name are known, with
/// any argument fragments seen before that point replayed afterwards.
#[derive(Debug, Default)]
pub struct ChatToClaudeStream {
    emitter: ClaudeEmitter,
    text_block: Option<u64>,
    tool_calls: BTreeMap<u64, ToolCallSlot>,
    finish_reason: Option<String>,
    usage: Option<(u64, u64)>,
}

impl ChatToClaudeStream {
    pub fn new() -> Self {
        Self::default()
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
            let input = usage["prompt_tokens"].as_u64().unwrap_or(0);
            let output = usage["completion_tokens"].as_u64().unwrap_or(0);
            self.usage = Some(match self.usage {
                Some((i, o)) => (i.max(input), o.max(output)),
                None => (input, output),
            });
        }

        let choice = &chunk["choices"][0];
        if choice.is_null() {
            return out;
        }

        if !self.emitter.started() {
            let id = chunk["id"].as_str().unwrap_or("unknown");
            let model = chunk["model"].as_str().unwrap_or("unknown");
            if let Some(frame) = self.emitter.message_start(id, model) {
                out.push(frame);
            }
        }

        let delta = &choice["delta"];
        if let Some(text) = delta["content"].as_str()
            && !text.is_empty()
        {
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
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for call in tool_calls {
                self.push_tool_fragment(call, &mut out);
            }
        }

        if let Some(reason) = choice["finish_reason"].as_str() {
            self.finish_reason = Some(reason.to_string());
        }

        out
    }

    fn push_tool_fragment(&mut self, call: &JsonValue, out: &mut Vec<String>) {
        let index = call["index"].as_u64().unwrap_or(0);
        let slot = self.tool_calls.entry(index).or_default();

        if let Some(id) = call["id"].as_str() {
            slot.id = Some(id.to_string());
        }
        if let Some(name) = call["function"]["name"].as_str() {
            slot.name = Some(name.to_string());
        }
        if let Some(fragment) = call["function"]["arguments"].as_str() {
            slot.pending_args.push_str(fragment);
        }

        if slot.block_index.is_none()
            && let (Some(id), Some(name)) = (slot.id.clone(), slot.name.clone())
        {
            let (block_index, frame) = self.emitter.start_tool_block(&id, &name);
            slot.block_index = Some(block_index);
            out.push(frame);
        }

        if let Some(block_index) = slot.block_index
            && !slot.pending_args.is_empty()
        {
            let args = std::mem::take(&mut slot.pending_args);
            out.push(self.emitter.input_json_delta(block_index, &args));
        }
    }

    fn finish(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        self.emitter.stop_all_blocks(&mut out);

        let stop_reason = self
            .finish_reason
            .as_deref()
            .map(map_chat_finish_reason)
            .unwrap_or("end_turn");
        out.push(self.emitter.message_delta(stop_reason, self.usage));
        if let Some(frame) = self.emitter.message_stop() {
            out.push(frame);
        }
        out
    }
}
