mod request;
mod response;
mod stream;

use relayhub_common::InterfaceType;

use crate::{TransformError, Transformer};

/// Anthropic Messages client speaking to an OpenAI Responses upstream.
pub struct ClaudeToResponses {
    stream: stream::ResponsesToClaudeStream,
}

impl ClaudeToResponses {
    pub fn new() -> Self {
        Self {
            stream: stream::ResponsesToClaudeStream::new(),
        }
    }
}

impl Default for ClaudeToResponses {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for ClaudeToResponses {
    fn target_interface_type(&self) -> InterfaceType {
        InterfaceType::Codex
    }

    fn target_path(&self, _is_streaming: bool, _model: &str) -> String {
        "/v1/responses".to_string()
    }

    fn transform_request(
        &mut self,
        model: &str,
        body: &[u8],
        is_streaming: bool,
    ) -> Result<Vec<u8>, TransformError> {
        request::transform_request(model, body, is_streaming)
    }

    fn transform_response(&mut self, body: &[u8]) -> Result<Vec<u8>, TransformError> {
        response::transform_response(body)
    }

    fn transform_stream_line(&mut self, line: &str) -> Result<Vec<String>, TransformError> {
        Ok(self.stream.push_line(line))
    }
}
