use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue, json};

use crate::TransformError;
use crate::support::{content_text, parse_object, system_text};

/// Rewrite a Claude create-message body into a Gemini generateContent body.
///
/// The model is not part of the body; the translator's `target_path` embeds
/// it in the URL.
pub fn transform_request(body: &[u8]) -> Result<Vec<u8>, TransformError> {
    let value = parse_object(body, "claude request")?;

    let mut out = Map::new();
    if let Some(text) = system_text(&value["system"]) {
        out.insert(
            "system_instruction".to_string(),
            json!({"parts": [{"text": text}]}),
        );
    }

    // functionResponse parts need the function's name; Claude tool results
    // only carry the tool_use id.
    let tool_names = collect_tool_names(&value["messages"]);

    let mut contents = Vec::new();
    if let Some(messages) = value["messages"].as_array() {
        for message in messages {
            if let Some(content) = map_message(message, &tool_names) {
                contents.push(content);
            }
        }
    }
    out.insert("contents".to_string(), JsonValue::Array(contents));

    if let Some(tools) = map_tools(&value["tools"]) {
        out.insert("tools".to_string(), tools);
    }
    if let Some(config) = generation_config(&value) {
        out.insert("generationConfig".to_string(), config);
    }

    serde_json::to_vec(&JsonValue::Object(out)).map_err(TransformError::request)
}

fn collect_tool_names(messages: &JsonValue) -> HashMap<String, String> {
    let mut names = HashMap::new();
    let Some(messages) = messages.as_array() else {
        return names;
    };
    for message in messages {
        let Some(blocks) = message["content"].as_array() else {
            continue;
        };
        for block in blocks {
            if block["type"] == "tool_use"
                && let (Some(id), Some(name)) = (block["id"].as_str(), block["name"].as_str())
            {
                names.insert(id.to_string(), name.to_string());
            }
        }
    }
    names
}

fn map_message(message: &JsonValue, tool_names: &HashMap<String, String>) -> Option<JsonValue> {
    let role = match message["role"].as_str() {
        Some("assistant") => "model",
        _ => "user",
    };

    let mut parts = Vec::new();
    match &message["content"] {
        JsonValue::String(text) => parts.push(json!({"text": text})),
        JsonValue::Array(blocks) => {
            for block in blocks {
                match block["type"].as_str() {
                    Some("tool_use") => parts.push(json!({
                        "functionCall": {
                            "name": block["name"].as_str().unwrap_or_default(),
                            "args": if block["input"].is_null() { json!({}) } else { block["input"].clone() },
                        }
                    })),
                    Some("tool_result") => {
                        let id = block["tool_use_id"].as_str().unwrap_or_default();
                        let name = tool_names.get(id).cloned().unwrap_or_else(|| id.to_string());
                        parts.push(json!({
                            "functionResponse": {
                                "name": name,
                                "response": {"result": content_text(&block["content"])},
                            }
                        }));
                    }
                    Some("image") => {
                        if let Some(part) = inline_data(&block["source"]) {
                            parts.push(part);
                        }
                    }
                    _ => {
                        if let Some(text) = block["text"].as_str() {
                            parts.push(json!({"text": text}));
                        }
                    }
                }
            }
        }
        _ => {}
    }

    if parts.is_empty() {
        return None;
    }
    Some(json!({"role": role, "parts": parts}))
}

fn inline_data(source: &JsonValue) -> Option<JsonValue> {
    if source["type"] != "base64" {
        return None;
    }
    Some(json!({
        "inlineData": {
            "mimeType": source["media_type"].as_str().unwrap_or("image/png"),
            "data": source["data"].as_str()?,
        }
    }))
}

fn map_tools(tools: &JsonValue) -> Option<JsonValue> {
    let list = tools.as_array()?;
    if list.is_empty() {
        return None;
    }
    let declarations: Vec<JsonValue> = list
        .iter()
        .filter_map(|tool| {
            let name = tool["name"].as_str()?;
            let mut entry = Map::new();
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
    Some(json!([{"functionDeclarations": declarations}]))
}

fn generation_config(value: &JsonValue) -> Option<JsonValue> {
    let mut config = Map::new();
    if let Some(max_tokens) = value["max_tokens"].as_u64() {
        config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    for (claude_key, gemini_key) in [
        ("temperature", "temperature"),
        ("top_p", "topP"),
        ("top_k", "topK"),
    ] {
        if let Some(v) = value.get(claude_key).filter(|v| !v.is_null()) {
            config.insert(gemini_key.to_string(), v.clone());
        }
    }
    if let Some(stops) = value["stop_sequences"].as_array().filter(|s| !s.is_empty()) {
        config.insert("stopSequences".to_string(), json!(stops));
    }
    if config.is_empty() {
        None
    } else {
        Some(JsonValue::Object(config))
    }
}
