use serde_json::Value as JsonValue;

/// Extract the payload of a `data:` line, if this line is one.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// `[DONE]` terminates OpenAI-style streams.
pub fn is_done_payload(payload: &str) -> bool {
    payload.trim() == "[DONE]"
}

/// Encode one SSE event, `\n\n`-terminated.
///
/// Anthropic streams carry a named `event:` line; OpenAI streams are
/// data-only, signalled by `event = None`.
pub fn encode_event(event: Option<&str>, data: &JsonValue) -> String {
    let payload = data.to_string();
    let mut out = String::with_capacity(payload.len() + 32);
    if let Some(event) = event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    out.push_str("data: ");
    out.push_str(&payload);
    out.push_str("\n\n");
    out
}
