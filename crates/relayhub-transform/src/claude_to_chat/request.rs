use serde_json::{Map, Value as JsonValue, json};

use crate::TransformError;
use crate::support::{args_json_string, content_text, parse_object, system_text};

/// Rewrite a Claude create-message body into an OpenAI chat-completions body.
pub fn transform_request(
    model: &str,
    body: &[u8],
    is_streaming: bool,
) -> Result<Vec<u8>, TransformError> {
    let value = parse_object(body, "claude request")?;

    let mut messages = Vec::new();
    if let Some(text) = system_text(&value["system"]) {
        messages.push(json!({"role": "system", "content": text}));
    }
    if let Some(list) = value["messages"].as_array() {
        for message in list {
            map_message(message, &mut messages);
        }
    }

    let mut out = Map::new();
    out.insert("model".to_string(), json!(model));
    out.insert("messages".to_string(), JsonValue::Array(messages));

    if let Some(tools) = map_tools(&value["tools"]) {
        out.insert("tools".to_string(), tools);
        out.insert("tool_choice".to_string(), map_tool_choice(&value["tool_choice"]));
    }
    if let Some(max_tokens) = value.get("max_tokens").filter(|v| !v.is_null()) {
        out.insert("max_tokens".to_string(), max_tokens.clone());
    }
    for key in ["temperature", "top_p"] {
        if let Some(v) = value.get(key).filter(|v| !v.is_null()) {
            out.insert(key.to_string(), v.clone());
        }
    }
    if let Some(stop) = map_stop_sequences(&value["stop_sequences"]) {
        out.insert("stop".to_string(), stop);
    }
    if is_streaming {
        out.insert("stream".to_string(), json!(true));
        out.insert("stream_options".to_string(), json!({"include_usage": true}));
    }

    serde_json::to_vec(&JsonValue::Object(out)).map_err(TransformError::request)
}

fn map_message(message: &JsonValue, out: &mut Vec<JsonValue>) {
    let role = message["role"].as_str().unwrap_or("user");
    match role {
        "assistant" => map_assistant_message(&message["content"], out),
        _ => map_user_message(&message["content"], out),
    }
}

fn map_user_message(content: &JsonValue, out: &mut Vec<JsonValue>) {
    let blocks = match content {
        JsonValue::String(text) => {
            out.push(json!({"role": "user", "content": text}));
            return;
        }
        JsonValue::Array(blocks) => blocks,
        _ => return,
    };

    let mut parts: Vec<JsonValue> = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("tool_result") => {
                flush_user_parts(&mut parts, out);
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": block["tool_use_id"].as_str().unwrap_or_default(),
                    "content": content_text(&block["content"]),
                }));
            }
            Some("image") => {
                if let Some(url) = image_url(&block["source"]) {
                    parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
                }
            }
            _ => {
                if let Some(text) = block["text"].as_str() {
                    parts.push(json!({"type": "text", "text": text}));
                }
            }
        }
    }
    flush_user_parts(&mut parts, out);
}

fn flush_user_parts(parts: &mut Vec<JsonValue>, out: &mut Vec<JsonValue>) {
    if parts.is_empty() {
        return;
    }
    let taken = std::mem::take(parts);
    let all_text = taken.iter().all(|part| part["type"] == "text");
    let content = if all_text {
        let joined: String = taken
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();
        json!(joined)
    } else {
        JsonValue::Array(taken)
    };
    out.push(json!({"role": "user", "content": content}));
}

fn map_assistant_message(content: &JsonValue, out: &mut Vec<JsonValue>) {
    let mut text = String::new();
    let mut tool_calls: Vec<JsonValue> = Vec::new();

    match content {
        JsonValue::String(value) => text.push_str(value),
        JsonValue::Array(blocks) => {
            for block in blocks {
                match block["type"].as_str() {
                    Some("tool_use") => tool_calls.push(json!({
                        "id": block["id"].as_str().unwrap_or_default(),
                        "type": "function",
                        "function": {
                            "name": block["name"].as_str().unwrap_or_default(),
                            "arguments": args_json_string(&block["input"]),
                        }
                    })),
                    _ => {
                        if let Some(value) = block["text"].as_str() {
                            text.push_str(value);
                        }
                    }
                }
            }
        }
        _ => {}
    }

    if text.is_empty() && tool_calls.is_empty() {
        return;
    }
    let mut message = Map::new();
    message.insert("role".to_string(), json!("assistant"));
    message.insert(
        "content".to_string(),
        if text.is_empty() { JsonValue::Null } else { json!(text) },
    );
    if !tool_calls.is_empty() {
        message.insert("tool_calls".to_string(), JsonValue::Array(tool_calls));
    }
    out.push(JsonValue::Object(message));
}

fn image_url(source: &JsonValue) -> Option<String> {
    match source["type"].as_str() {
        Some("base64") => {
            let media_type = source["media_type"].as_str().unwrap_or("image/png");
            let data = source["data"].as_str()?;
            Some(format!("data:{media_type};base64,{data}"))
        }
        Some("url") => source["url"].as_str().map(|url| url.to_string()),
        _ => None,
    }
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
            let mut function = Map::new();
            function.insert("name".to_string(), json!(name));
            if let Some(description) = tool["description"].as_str() {
                function.insert("description".to_string(), json!(description));
            }
            if !tool["input_schema"].is_null() {
                function.insert("parameters".to_string(), tool["input_schema"].clone());
            }
            Some(json!({"type": "function", "function": function}))
        })
        .collect();
    Some(JsonValue::Array(mapped))
}

fn map_tool_choice(choice: &JsonValue) -> JsonValue {
    match choice["type"].as_str() {
        Some("any") => json!("required"),
        Some("tool") => json!({
            "type": "function",
            "function": {"name": choice["name"].as_str().unwrap_or_default()}
        }),
        _ => json!("auto"),
    }
}

fn map_stop_sequences(sequences: &JsonValue) -> Option<JsonValue> {
    let list = sequences.as_array()?;
    match list.as_slice() {
        [] => None,
        [single] => Some(single.clone()),
        _ => Some(JsonValue::Array(list.clone())),
    }
}
