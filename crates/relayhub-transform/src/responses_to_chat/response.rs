use serde_json::{Value as JsonValue, json};

use crate::TransformError;
use crate::support::parse_response_object;

/// Rewrite a buffered chat-completions response into a Responses result.
pub fn transform_response(body: &[u8]) -> Result<Vec<u8>, TransformError> {
    let value = parse_response_object(body, "chat response")?;
    let choice = &value["choices"][0];
    let message = &choice["message"];
    let id = value["id"].as_str().unwrap_or("resp_unknown");

    let mut output = Vec::new();
    if let Some(text) = message["content"].as_str()
        && !text.is_empty()
    {
        output.push(json!({
            "type": "message",
            "id": format!("{id}_msg_0"),
            "role": "assistant",
            "status": "completed",
            "content": [{"type": "output_text", "text": text, "annotations": []}],
        }));
    }
    if let Some(tool_calls) = message["tool_calls"].as_array() {
        for (seq, call) in tool_calls.iter().enumerate() {
            output.push(json!({
                "type": "function_call",
                "id": format!("{id}_fc_{seq}"),
                "call_id": call["id"].as_str().unwrap_or_default(),
                "name": call["function"]["name"].as_str().unwrap_or_default(),
                "arguments": call["function"]["arguments"].as_str().unwrap_or("{}"),
                "status": "completed",
            }));
        }
    }

    let out = json!({
        "id": id,
        "object": "response",
        "status": "completed",
        "model": value["model"].as_str().unwrap_or_default(),
        "output": output,
        "usage": map_usage(&value["usage"]),
    });

    serde_json::to_vec(&out).map_err(TransformError::response)
}

fn map_usage(usage: &JsonValue) -> JsonValue {
    json!({
        "input_tokens": usage["prompt_tokens"].as_u64().unwrap_or(0),
        "output_tokens": usage["completion_tokens"].as_u64().unwrap_or(0),
        "input_tokens_details": {
            "cached_tokens": usage["prompt_tokens_details"]["cached_tokens"].as_u64().unwrap_or(0)
        },
        "output_tokens_details": {
            "reasoning_tokens": usage["completion_tokens_details"]["reasoning_tokens"].as_u64().unwrap_or(0)
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_tool_calls_become_output_items() {
        let body = json!({
            "id": "chatcmpl-9",
            "model": "gpt-x",
            "choices": [{"message": {
                "role": "assistant",
                "content": "done",
                "tool_calls": [{"id": "call_1", "function": {"name": "f", "arguments": "{}"}}]
            }, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 6, "completion_tokens": 3}
        });
        let out: JsonValue =
            serde_json::from_slice(&transform_response(&serde_json::to_vec(&body).unwrap()).unwrap())
                .unwrap();
        assert_eq!(out["object"], "response");
        assert_eq!(out["status"], "completed");
        assert_eq!(out["output"][0]["type"], "message");
        assert_eq!(out["output"][0]["content"][0]["text"], "done");
        assert_eq!(out["output"][1]["type"], "function_call");
        assert_eq!(out["output"][1]["call_id"], "call_1");
        assert_eq!(out["usage"]["input_tokens"], 6);
    }
}
