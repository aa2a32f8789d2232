use serde_json::{Map, Value as JsonValue, json};

use crate::TransformError;
use crate::support::parse_object;

/// Rewrite an OpenAI Responses body into a chat-completions body.
pub fn transform_request(
    model: &str,
    body: &[u8],
    is_streaming: bool,
) -> Result<Vec<u8>, TransformError> {
    let value = parse_object(body, "responses request")?;

    let mut messages = Vec::new();
    if let Some(instructions) = value["instructions"].as_str()
        && !instructions.is_empty()
    {
        messages.push(json!({"role": "system", "content": instructions}));
    }

    match &value["input"] {
        JsonValue::String(text) => messages.push(json!({"role": "user", "content": text})),
        JsonValue::Array(items) => {
            for item in items {
                map_input_item(item, &mut messages);
            }
        }
        _ => {}
    }

    let mut out = Map::new();
    out.insert("model".to_string(), json!(model));
    out.insert("messages".to_string(), JsonValue::Array(messages));

    if let Some(tools) = map_tools(&value["tools"]) {
        out.insert("tools".to_string(), tools);
        if let Some(choice) = value.get("tool_choice").filter(|v| !v.is_null()) {
            out.insert("tool_choice".to_string(), choice.clone());
        }
    }
    if let Some(max_tokens) = value["max_output_tokens"].as_u64() {
        out.insert("max_tokens".to_string(), json!(max_tokens));
    }
    for key in ["temperature", "top_p"] {
        if let Some(v) = value.get(key).filter(|v| !v.is_null()) {
            out.insert(key.to_string(), v.clone());
        }
    }
    if is_streaming {
        out.insert("stream".to_string(), json!(true));
        out.insert("stream_options".to_string(), json!({"include_usage": true}));
    }

    serde_json::to_vec(&JsonValue::Object(out)).map_err(TransformError::request)
}

fn map_input_item(item: &JsonValue, messages: &mut Vec<JsonValue>) {
    match item["type"].as_str() {
        Some("function_call") => messages.push(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": item["call_id"].as_str().unwrap_or_default(),
                "type": "function",
                "function": {
                    "name": item["name"].as_str().unwrap_or_default(),
                    "arguments": item["arguments"].as_str().unwrap_or("{}"),
                }
            }]
        })),
        Some("function_call_output") => messages.push(json!({
            "role": "tool",
            "tool_call_id": item["call_id"].as_str().unwrap_or_default(),
            "content": item["output"].as_str().unwrap_or_default(),
        })),
        // Plain messages, including bare `{role, content}` items.
        _ => {
            let role = item["role"].as_str().unwrap_or("user");
            let text = item_text(&item["content"]);
            messages.push(json!({"role": role, "content": text}));
        }
    }
}

fn item_text(content: &JsonValue) -> String {
    match content {
        JsonValue::String(text) => text.clone(),
        JsonValue::Array(parts) => parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect(),
        _ => String::new(),
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
            if !tool["parameters"].is_null() {
                function.insert("parameters".to_string(), tool["parameters"].clone());
            }
            Some(json!({"type": "function", "function": function}))
        })
        .collect();
    Some(JsonValue::Array(mapped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(body: serde_json::Value) -> JsonValue {
        let out = transform_request("gpt-x", &serde_json::to_vec(&body).unwrap(), false).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn instructions_and_string_input() {
        let out = transform(json!({"instructions": "be brief", "input": "hi"}));
        assert_eq!(out["messages"][0]["role"], "system");
        assert_eq!(out["messages"][0]["content"], "be brief");
        assert_eq!(out["messages"][1]["role"], "user");
        assert_eq!(out["messages"][1]["content"], "hi");
    }

    #[test]
    fn function_call_pairs_keep_call_id() {
        let out = transform(json!({
            "input": [
                {"type": "message", "role": "user", "content": [{"type": "input_text", "text": "go"}]},
                {"type": "function_call", "call_id": "call_7", "name": "f", "arguments": "{\"a\":1}"},
                {"type": "function_call_output", "call_id": "call_7", "output": "ok"}
            ]
        }));
        assert_eq!(out["messages"][0]["content"], "go");
        let call = &out["messages"][1]["tool_calls"][0];
        assert_eq!(call["id"], "call_7");
        assert_eq!(call["function"]["arguments"], "{\"a\":1}");
        assert_eq!(out["messages"][2]["role"], "tool");
        assert_eq!(out["messages"][2]["tool_call_id"], "call_7");
        assert_eq!(out["messages"][2]["content"], "ok");
    }

    #[test]
    fn flat_tools_become_nested_functions() {
        let out = transform(json!({
            "input": [],
            "tools": [{"type": "function", "name": "f", "parameters": {"type": "object"}}],
            "max_output_tokens": 128
        }));
        assert_eq!(out["tools"][0]["function"]["name"], "f");
        assert_eq!(out["max_tokens"], 128);
    }
}
