use relayhub_common::InterfaceType;
use relayhub_transform::{SPEC_OPENAI_CHAT, resolve};
use serde_json::{Value as JsonValue, json};

fn sse_payloads(frames: &[String]) -> Vec<JsonValue> {
    frames
        .iter()
        .filter_map(|frame| {
            frame
                .lines()
                .find_map(|line| line.strip_prefix("data: "))
                .and_then(|data| serde_json::from_str(data).ok())
        })
        .collect()
}

/// Claude request → chat request → chat stream → Claude events: message text
/// and tool-call names/arguments survive the full trip.
#[test]
fn claude_chat_round_trip_preserves_content() {
    let mut translator = resolve(InterfaceType::Claude, SPEC_OPENAI_CHAT).unwrap();

    let claude_request = json!({
        "model": "claude-3",
        "max_tokens": 128,
        "stream": true,
        "messages": [
            {"role": "user", "content": "what's the weather in SF?"}
        ],
        "tools": [{"name": "get_weather", "description": "d", "input_schema": {"type": "object"}}]
    });
    let chat_request = translator
        .transform_request("gpt-x", &serde_json::to_vec(&claude_request).unwrap(), true)
        .unwrap();
    let chat_request: JsonValue = serde_json::from_slice(&chat_request).unwrap();
    assert_eq!(chat_request["messages"][0]["content"], "what's the weather in SF?");
    assert_eq!(chat_request["tools"][0]["function"]["name"], "get_weather");

    // Upstream answers with text and one tool call, split over fragments.
    let upstream_lines = [
        r#"data: {"id":"c1","model":"gpt-x","choices":[{"delta":{"content":"Checking"}}]}"#,
        r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_weather","arguments":"{\"city\":"}}]}}]}"#,
        r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"SF\"}"}}]}}]}"#,
        r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        "data: [DONE]",
    ];
    let mut frames = Vec::new();
    for line in upstream_lines {
        frames.extend(translator.transform_stream_line(line).unwrap());
    }

    let payloads = sse_payloads(&frames);
    let text: String = payloads
        .iter()
        .filter(|p| p["delta"]["type"] == "text_delta")
        .filter_map(|p| p["delta"]["text"].as_str())
        .collect();
    assert_eq!(text, "Checking");

    let tool_start = payloads
        .iter()
        .find(|p| p["content_block"]["type"] == "tool_use")
        .unwrap();
    assert_eq!(tool_start["content_block"]["name"], "get_weather");
    assert_eq!(tool_start["content_block"]["id"], "call_1");

    let args: String = payloads
        .iter()
        .filter(|p| p["delta"]["type"] == "input_json_delta")
        .filter_map(|p| p["delta"]["partial_json"].as_str())
        .collect();
    assert_eq!(
        serde_json::from_str::<JsonValue>(&args).unwrap(),
        json!({"city": "SF"})
    );

    let delta = payloads
        .iter()
        .find(|p| p["type"] == "message_delta")
        .unwrap();
    assert_eq!(delta["delta"]["stop_reason"], "tool_use");
    assert_eq!(
        payloads.last().map(|p| p["type"].clone()),
        Some(json!("message_stop"))
    );
}

/// Responses request → chat request: instructions, texts and call_id
/// pairings survive.
#[test]
fn responses_chat_request_preserves_pairings() {
    let mut translator = resolve(InterfaceType::Codex, SPEC_OPENAI_CHAT).unwrap();

    let responses_request = json!({
        "model": "o-x",
        "instructions": "answer briefly",
        "input": [
            {"type": "message", "role": "user", "content": [{"type": "input_text", "text": "run it"}]},
            {"type": "function_call", "call_id": "call_9", "name": "run", "arguments": "{\"id\":4}"},
            {"type": "function_call_output", "call_id": "call_9", "output": "done"}
        ]
    });
    let chat_request = translator
        .transform_request("gpt-x", &serde_json::to_vec(&responses_request).unwrap(), false)
        .unwrap();
    let chat_request: JsonValue = serde_json::from_slice(&chat_request).unwrap();

    assert_eq!(chat_request["messages"][0]["role"], "system");
    assert_eq!(chat_request["messages"][0]["content"], "answer briefly");
    assert_eq!(chat_request["messages"][1]["content"], "run it");

    let call = &chat_request["messages"][2]["tool_calls"][0];
    assert_eq!(call["id"], "call_9");
    assert_eq!(call["function"]["name"], "run");
    assert_eq!(call["function"]["arguments"], "{\"id\":4}");

    let output = &chat_request["messages"][3];
    assert_eq!(output["role"], "tool");
    assert_eq!(output["tool_call_id"], "call_9");
    assert_eq!(output["content"], "done");
}

/// The streamed-transformation scenario: chat deltas come back as the exact
/// Claude event order.
#[test]
fn streamed_chat_to_claude_event_order() {
    let mut translator = resolve(InterfaceType::Claude, SPEC_OPENAI_CHAT).unwrap();
    let lines = [
        r#"data: {"id":"c1","model":"alias-m","choices":[{"delta":{"content":"hello"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":" world"}}]}"#,
        r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        "data: [DONE]",
    ];
    let mut frames = Vec::new();
    for line in lines {
        frames.extend(translator.transform_stream_line(line).unwrap());
    }
    let types: Vec<String> = sse_payloads(&frames)
        .iter()
        .map(|p| p["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        types,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop"
        ]
    );
    assert!(frames.iter().all(|frame| frame.ends_with("\n\n")));
}
