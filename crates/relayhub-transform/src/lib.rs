//! Wire-protocol translators.
//!
//! A transformer converts one client-side protocol into one upstream-side
//! protocol for the lifetime of a single request. The registry hands out a
//! fresh boxed instance per request; streaming translators keep their block
//! bookkeeping inside the box.

pub mod usage;

mod claude_to_chat;
mod claude_to_gemini;
mod claude_to_responses;
mod responses_to_chat;
mod support;

use relayhub_common::InterfaceType;
use serde::Serialize;

pub use usage::{TokenUsage, extract_usage};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("invalid request body: {0}")]
    InvalidRequest(String),
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl TransformError {
    pub fn request(err: impl std::fmt::Display) -> Self {
        TransformError::InvalidRequest(err.to_string())
    }

    pub fn response(err: impl std::fmt::Display) -> Self {
        TransformError::InvalidResponse(err.to_string())
    }
}

/// Per-request protocol translator.
///
/// `transform_request` runs once before dialling; exactly one of
/// `transform_response` / `transform_stream_line` runs afterwards, depending
/// on whether the upstream answered with a stream. Implementations carry
/// whatever per-request state they need between those calls.
pub trait Transformer: Send {
    /// Target protocol tag; selects the auth rule for the outbound request.
    fn target_interface_type(&self) -> InterfaceType;

    /// Path relative to the endpoint base URL.
    fn target_path(&self, is_streaming: bool, model: &str) -> String;

    /// Content type the client sees.
    fn output_content_type(&self, is_streaming: bool) -> &'static str {
        if is_streaming {
            "text/event-stream"
        } else {
            "application/json"
        }
    }

    fn transform_request(
        &mut self,
        model: &str,
        body: &[u8],
        is_streaming: bool,
    ) -> Result<Vec<u8>, TransformError>;

    fn transform_response(&mut self, body: &[u8]) -> Result<Vec<u8>, TransformError>;

    /// Feed one upstream line (SSE frame line or JSON line); returns zero or
    /// more complete client-side SSE events, each `\n\n`-terminated.
    fn transform_stream_line(&mut self, line: &str) -> Result<Vec<String>, TransformError>;
}

pub const SPEC_OPENAI_CHAT: &str = "openai/chat-completions";
pub const SPEC_OPENAI_RESPONSES: &str = "openai/responses";
pub const SPEC_GEMINI: &str = "gemini";

/// Resolve a translator for `(source protocol, spec string)`.
///
/// The supported set is closed; unknown combinations return `None` and the
/// executor treats the endpoint as misconfigured.
pub fn resolve(source: InterfaceType, spec: &str) -> Option<Box<dyn Transformer>> {
    match (source, spec) {
        (InterfaceType::Claude, SPEC_OPENAI_CHAT) => {
            Some(Box::new(claude_to_chat::ClaudeToChat::new()))
        }
        (InterfaceType::Claude, SPEC_OPENAI_RESPONSES) => {
            Some(Box::new(claude_to_responses::ClaudeToResponses::new()))
        }
        (InterfaceType::Claude, SPEC_GEMINI) => {
            Some(Box::new(claude_to_gemini::ClaudeToGemini::new()))
        }
        (InterfaceType::Codex, SPEC_OPENAI_CHAT) => {
            Some(Box::new(responses_to_chat::ResponsesToChat::new()))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformerInfo {
    pub from: InterfaceType,
    pub spec: &'static str,
    pub target: InterfaceType,
}

/// Enumerate the available specs, optionally filtered by source protocol.
pub fn available(from: Option<InterfaceType>) -> Vec<TransformerInfo> {
    let all = [
        TransformerInfo {
            from: InterfaceType::Claude,
            spec: SPEC_OPENAI_CHAT,
            target: InterfaceType::Chat,
        },
        TransformerInfo {
            from: InterfaceType::Claude,
            spec: SPEC_OPENAI_RESPONSES,
            target: InterfaceType::Codex,
        },
        TransformerInfo {
            from: InterfaceType::Claude,
            spec: SPEC_GEMINI,
            target: InterfaceType::Gemini,
        },
        TransformerInfo {
            from: InterfaceType::Codex,
            spec: SPEC_OPENAI_CHAT,
            target: InterfaceType::Chat,
        },
    ];
    all.into_iter()
        .filter(|info| from.is_none_or(|f| info.from == f))
        .collect()
}
