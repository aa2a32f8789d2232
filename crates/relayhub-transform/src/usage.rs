use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Normalised token accounting across providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cached_create: u64,
    pub cached_read: u64,
    pub reasoning: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output + self.cached_create + self.cached_read + self.reasoning
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Field-wise maximum. Streams re-send running totals, so taking the max
    /// keeps the accumulator idempotent under repeated payloads.
    pub fn merge_max(&mut self, other: &TokenUsage) {
        self.input = self.input.max(other.input);
        self.output = self.output.max(other.output);
        self.cached_create = self.cached_create.max(other.cached_create);
        self.cached_read = self.cached_read.max(other.cached_read);
        self.reasoning = self.reasoning.max(other.reasoning);
    }
}

/// Extract token usage from one JSON document: a full response body or a
/// single SSE payload with its `data:` prefix already stripped.
///
/// Returns `None` when the document carries no usage at all.
pub fn extract_usage(value: &JsonValue) -> Option<TokenUsage> {
    let mut usage = TokenUsage::default();
    let mut seen = false;

    for container in [value, &value["response"], &value["message"]] {
        if let Some(obj) = container.get("usage")
            && let Some(found) = usage_from_object(obj)
        {
            usage.merge_max(&found);
            seen = true;
        }
    }

    if let Some(meta) = value.get("usageMetadata")
        && let Some(found) = usage_from_gemini_metadata(meta)
    {
        usage.merge_max(&found);
        seen = true;
    }

    seen.then_some(usage)
}

fn usage_from_object(obj: &JsonValue) -> Option<TokenUsage> {
    if !obj.is_object() {
        return None;
    }

    let mut usage = TokenUsage::default();
    let mut seen = false;
    let mut take = |field: &mut u64, value: Option<u64>| {
        if let Some(value) = value {
            *field = (*field).max(value);
            seen = true;
        }
    };

    // Claude shape.
    take(&mut usage.input, as_count(&obj["input_tokens"]));
    take(&mut usage.output, as_count(&obj["output_tokens"]));
    take(
        &mut usage.cached_create,
        as_count(&obj["cache_creation_input_tokens"]),
    );
    take(
        &mut usage.cached_read,
        as_count(&obj["cache_read_input_tokens"]),
    );
    take(&mut usage.reasoning, as_count(&obj["reasoning_tokens"]));
    take(&mut usage.reasoning, as_count(&obj["thinking_tokens"]));

    // OpenAI shape.
    take(&mut usage.input, as_count(&obj["prompt_tokens"]));
    take(&mut usage.output, as_count(&obj["completion_tokens"]));
    take(
        &mut usage.cached_read,
        as_count(&obj["prompt_tokens_details"]["cached_tokens"]),
    );
    take(
        &mut usage.cached_read,
        as_count(&obj["input_tokens_details"]["cached_tokens"]),
    );
    take(
        &mut usage.reasoning,
        as_count(&obj["completion_tokens_details"]["reasoning_tokens"]),
    );
    take(
        &mut usage.reasoning,
        as_count(&obj["output_tokens_details"]["reasoning_tokens"]),
    );

    seen.then_some(usage)
}

fn usage_from_gemini_metadata(meta: &JsonValue) -> Option<TokenUsage> {
    if !meta.is_object() {
        return None;
    }

    let prompt = as_count(&meta["promptTokenCount"]);
    let candidates = as_count(&meta["candidatesTokenCount"]);
    let total = as_count(&meta["totalTokenCount"]);

    match (prompt, candidates, total) {
        (None, None, Some(total)) => Some(TokenUsage {
            // Only the total is reported; attribute it to input as a
            // best-effort fallback.
            input: total,
            ..TokenUsage::default()
        }),
        (None, None, None) => None,
        (prompt, candidates, _) => Some(TokenUsage {
            input: prompt.unwrap_or(0),
            output: candidates.unwrap_or(0),
            ..TokenUsage::default()
        }),
    }
}

fn as_count(value: &JsonValue) -> Option<u64> {
    value.as_u64().or_else(|| {
        // Some providers send counts as floats.
        value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claude_shape() {
        let value = json!({
            "usage": {
                "input_tokens": 3,
                "output_tokens": 1,
                "cache_creation_input_tokens": 5,
                "cache_read_input_tokens": 7
            }
        });
        let usage = extract_usage(&value).unwrap();
        assert_eq!(usage.input, 3);
        assert_eq!(usage.output, 1);
        assert_eq!(usage.cached_create, 5);
        assert_eq!(usage.cached_read, 7);
        assert_eq!(usage.total(), 16);
    }

    #[test]
    fn openai_shape_with_details() {
        let value = json!({
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 4,
                "prompt_tokens_details": {"cached_tokens": 6},
                "completion_tokens_details": {"reasoning_tokens": 2}
            }
        });
        let usage = extract_usage(&value).unwrap();
        assert_eq!(usage.input, 10);
        assert_eq!(usage.output, 4);
        assert_eq!(usage.cached_read, 6);
        assert_eq!(usage.reasoning, 2);
    }

    #[test]
    fn nested_response_and_message_usage() {
        let value = json!({"response": {"usage": {"input_tokens": 8, "output_tokens": 2}}});
        assert_eq!(extract_usage(&value).unwrap().input, 8);

        let value = json!({"message": {"usage": {"input_tokens": 9}}});
        assert_eq!(extract_usage(&value).unwrap().input, 9);
    }

    #[test]
    fn gemini_metadata() {
        let value = json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4}
        });
        let usage = extract_usage(&value).unwrap();
        assert_eq!(usage.input, 12);
        assert_eq!(usage.output, 4);
        assert_eq!(usage.cached_create, 0);
        assert_eq!(usage.cached_read, 0);
        assert_eq!(usage.reasoning, 0);
    }

    #[test]
    fn gemini_total_only_falls_back_to_input() {
        let value = json!({"usageMetadata": {"totalTokenCount": 20}});
        let usage = extract_usage(&value).unwrap();
        assert_eq!(usage.input, 20);
        assert_eq!(usage.output, 0);
    }

    #[test]
    fn merge_is_idempotent_under_duplication() {
        let value = json!({"usage": {"input_tokens": 5, "output_tokens": 3}});
        let mut acc = TokenUsage::default();
        acc.merge_max(&extract_usage(&value).unwrap());
        let once = acc;
        acc.merge_max(&extract_usage(&value).unwrap());
        assert_eq!(acc, once);
    }

    #[test]
    fn no_usage_returns_none() {
        assert!(extract_usage(&json!({"content": []})).is_none());
        assert!(extract_usage(&json!({"usage": "oops"})).is_none());
    }
}
