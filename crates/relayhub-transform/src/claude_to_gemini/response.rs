use serde_json::{Map, Value as JsonValue, json};

use crate::TransformError;
use crate::support::{gen_message_id, map_gemini_finish_reason, parse_response_object};

/// Rewrite a buffered Gemini generateContent response into a Claude message.
pub fn transform_response(body: &[u8]) -> Result<Vec<u8>, TransformError> {
    let value = parse_response_object(body, "gemini response")?;
    let candidate = &value["candidates"][0];

    let mut content = Vec::new();
    let mut tool_seq = 0u64;
    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                if !text.is_empty() {
                    content.push(json!({"type": "text", "text": text}));
                }
            } else if let Some(call) = part.get("functionCall").filter(|c| c.is_object()) {
                tool_seq += 1;
                content.push(json!({
                    "type": "tool_use",
                    "id": format!("toolu_{tool_seq}"),
                    "name": call["name"].as_str().unwrap_or_default(),
                    "input": if call["args"].is_null() { json!({}) } else { call["args"].clone() },
                }));
            }
        }
    }

    let stop_reason = map_gemini_finish_reason(
        candidate["finishReason"].as_str().unwrap_or_default(),
        tool_seq > 0,
    );

    let mut out = Map::new();
    out.insert("id".to_string(), json!(gen_message_id()));
    out.insert("type".to_string(), json!("message"));
    out.insert("role".to_string(), json!("assistant"));
    out.insert(
        "model".to_string(),
        json!(value["modelVersion"].as_str().unwrap_or_default()),
    );
    out.insert("content".to_string(), JsonValue::Array(content));
    out.insert("stop_reason".to_string(), json!(stop_reason));
    out.insert("stop_sequence".to_string(), JsonValue::Null);
    out.insert(
        "usage".to_string(),
        json!({
            "input_tokens": value["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
            "output_tokens": value["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0),
        }),
    );

    serde_json::to_vec(&JsonValue::Object(out)).map_err(TransformError::response)
}
