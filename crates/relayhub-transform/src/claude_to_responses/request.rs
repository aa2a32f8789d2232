use serde_json::{Map, Value as JsonValue, json};

use crate::TransformError;
use crate::support::{args_json_string, content_text, parse_object, system_text};

/// Rewrite a Claude create-message body into an OpenAI Responses body.
pub fn transform_request(
    model: &str,
    body: &[u8],
    is_streaming: bool,
) -> Result<Vec<u8>, TransformError> {
    let value = parse_object(body, "claude request")?;

    let mut out = Map::new();
    out.insert("model".to_string(), json!(model));
    if let Some(text) = system_text(&value["system"]) {
        out.insert("instructions".to_string(), json!(text));
    }

    let mut input = Vec::new();
    if let Some(messages) = value["messages"].as_array() {
        for message in messages {
            map_message(message, &mut input);
        }
    }
    out.insert("input".to_string(), JsonValue::Array(input));

    if let Some(tools) = map_tools(&value["tools"]) {
        out.insert("tools".to_string(), tools);
        out.insert("tool_choice".to_string(), json!("auto"));
    }
    if let Some(max_tokens) = value["max_tokens"].as_u64() {
        out.insert("max_output_tokens".to_string(), json!(max_tokens));
    }
    for key in ["temperature", "top_p"] {
        if let Some(v) = value.get(key).filter(|v| !v.is_null()) {
            out.insert(key.to_string(), v.clone());
        }
    }
    if is_streaming {
        out.insert("stream".to_string(), json!(true));
    }

    serde_json::to_vec(&JsonValue::Object(out)).map_err(TransformError::request)
}

fn map_message(message: &JsonValue, input: &mut Vec<JsonValue>) {
    let role = message["role"].as_str().unwrap_or("user");
    let text_type = if role == "assistant" {
        "output_text"
    } else {
        "input_text"
    };

    let blocks = match &message["content"] {
        JsonValue::String(text) => {
            input.push(message_item(role, text_type, text));
            return;
        }
        JsonValue::Array(blocks) => blocks,
        _ => return,
    };

    let mut texts: Vec<&str> = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("tool_use") => {
                flush_texts(&mut texts, role, text_type, input);
                input.push(json!({
                    "type": "function_call",
                    "call_id": block["id"].as_str().unwrap_or_default(),
                    "name": block["name"].as_str().unwrap_or_default(),
                    "arguments": args_json_string(&block["input"]),
                }));
            }
            Some("tool_result") => {
                flush_texts(&mut texts, role, text_type, input);
                input.push(json!({
                    "type": "function_call_output",
                    "call_id": block["tool_use_id"].as_str().unwrap_or_default(),
                    "output": content_text(&block["content"]),
                }));
            }
            _ => {
                if let Some(text) = block["text"].as_str() {
                    texts.push(text);
                }
            }
        }
    }
    flush_texts(&mut texts, role, text_type, input);
}

fn flush_texts(texts: &mut Vec<&str>, role: &str, text_type: &str, input: &mut Vec<JsonValue>) {
    if texts.is_empty() {
        return;
    }
    let joined = std::mem::take(texts).join("");
    input.push(message_item(role, text_type, &joined));
}

fn message_item(role: &str, text_type: &str, text: &str) -> JsonValue {
    json!({
        "type": "message",
        "role": role,
        "content": [{"type": text_type, "text": text}],
    })
}

fn map_tools(tools: &JsonValue) -> Option<JsonValue> {
    let list = tools.as_array()?;
    if list.is_empty() {
        return None;
    }
    let mapped: Vec<JsonValue> = list
        .iter()
        .filter_map(|tool| {
            let name = tool["name"].as_str()?;
            let mut entry = Map::new();
            entry.insert("type".to_string(), json!("function"));
            entry.insert("name".to_string(), json!(name));
            if let Some(description) = tool["description"].as_str() {
                entry.insert("description".to_string(), json!(description));
            }
            if !tool["input_schema"].is_null() {
                entry.insert("parameters".to_string(), tool["input_schema"].clone());
            }
            Some(JsonValue::Object(entry))
        })
        .collect();
    Some(JsonValue::Array(mapped))
}
