use serde_json::{Map, Value as JsonValue, json};

use crate::TransformError;
use crate::support::{gen_message_id, parse_args, parse_response_object};

/// Rewrite a buffered Responses result into a Claude message.
pub fn transform_response(body: &[u8]) -> Result<Vec<u8>, TransformError> {
    let value = parse_response_object(body, "responses response")?;

    let mut content = Vec::new();
    let mut saw_tool_call = false;
    if let Some(output) = value["output"].as_array() {
        for item in output {
            match item["type"].as_str() {
                Some("message") => {
                    if let Some(parts) = item["content"].as_array() {
                        for part in parts {
                            if let Some(text) = part["text"].as_str()
                                && !text.is_empty()
                            {
                                content.push(json!({"type": "text", "text": text}));
                            }
                        }
                    }
                }
                Some("function_call") => {
                    saw_tool_call = true;
                    let call_id = item["call_id"]
                        .as_str()
                        .or_else(|| item["id"].as_str())
                        .unwrap_or_default();
                    content.push(json!({
                        "type": "tool_use",
                        "id": call_id,
                        "name": item["name"].as_str().unwrap_or_default(),
                        "input": parse_args(item["arguments"].as_str().unwrap_or_default()),
                    }));
                }
                _ => {}
            }
        }
    }

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
    out.insert(
        "stop_reason".to_string(),
        json!(if saw_tool_call { "tool_use" } else { "end_turn" }),
    );
    out.insert("stop_sequence".to_string(), JsonValue::Null);
    out.insert(
        "usage".to_string(),
        json!({
            "input_tokens": value["usage"]["input_tokens"].as_u64().unwrap_or(0),
            "output_tokens": value["usage"]["output_tokens"].as_u64().unwrap_or(0),
        }),
    );

    serde_json::to_vec(&JsonValue::Object(out)).map_err(TransformError::response)
}
