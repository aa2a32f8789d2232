use serde_json::{Map, Value as JsonValue, json};

use crate::TransformError;
use crate::support::{gen_message_id, map_chat_finish_reason, parse_args, parse_response_object};

/// Rewrite a buffered chat-completions response into a Claude message.
pub fn transform_response(body: &[u8]) -> Result<Vec<u8>, TransformError> {
    let value = parse_response_object(body, "chat response")?;
    let choice = &value["choices"][0];
    let message = &choice["message"];

    let mut content = Vec::new();
    if let Some(text) = message["content"].as_str()
        && !text.is_empty()
    {
        content.push(json!({"type": "text", "text": text}));
    }
    if let Some(tool_calls) = message["tool_calls"].as_array() {
        for call in tool_calls {
            content.push(json!({
                "type": "tool_use",
                "id": call["id"].as_str().unwrap_or_default(),
                "name": call["function"]["name"].as_str().unwrap_or_default(),
                "input": parse_args(call["function"]["arguments"].as_str().unwrap_or_default()),
            }));
        }
    }

    let stop_reason = choice["finish_reason"]
        .as_str()
        .map(map_chat_finish_reason)
        .unwrap_or("end_turn");

    let mut out = Map::new();
    out.insert(
        "id".to_string(),
        json!(value["id"].as_str().map(str::to_string).unwrap_or_else(gen_message_id)),
    );
    out.insert("type".to_string(), json!("message"));
    out.insert("role".to_string(), json!("assistant"));
    out.insert(
        "model".to_string(),
        json!(value["model"].as_str().unwrap_or_default()),
    );
    out.insert("content".to_string(), JsonValue::Array(content));
    out.insert("stop_reason".to_string(), json!(stop_reason));
    out.insert("stop_sequence".to_string(), JsonValue::Null);
    out.insert("usage".to_string(), map_usage(&value["usage"]));

    serde_json::to_vec(&JsonValue::Object(out)).map_err(TransformError::response)
}

fn map_usage(usage: &JsonValue) -> JsonValue {
    json!({
        "input_tokens": usage["prompt_tokens"].as_u64().unwrap_or(0),
        "output_tokens": usage["completion_tokens"].as_u64().unwrap_or(0),
    })
}
