mod request;
mod response;
mod stream;

use relayhub_common::InterfaceType;

use crate::{TransformError, Transformer};

/// Anthropic Messages client speaking to a Gemini generateContent upstream.
pub struct ClaudeToGemini {
    stream: stream::GeminiToClaudeStream,
}

impl ClaudeToGemini {
    pub fn new() -> Self {
        Self {
            stream: stream::GeminiToClaudeStream::new(),
        }
    }
}

impl Default for ClaudeToGemini {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for ClaudeToGemini {
    fn target_interface_type(&self) -> InterfaceType {
        InterfaceType::Gemini
    }

    fn target_path(&self, is_streaming: bool, model: &str) -> String {
        if is_streaming {
            format!("/v1beta/models/{model}:streamGenerateContent")
        } else {
            format!("/v1beta/models/{model}:generateContent")
        }
    }

    fn transform_request(
        &mut self,
        _model: &str,
        body: &[u8],
        _is_streaming: bool,
    ) -> Result<Vec<u8>, TransformError> {
        request::transform_request(body)
    }

    fn transform_response(&mut self, body: &[u8]) -> Result<Vec<u8>, TransformError> {
        response::transform_response(body)
    }

    fn transform_stream_line(&mut self, line: &str) -> Result<Vec<String>, TransformError> {
        Ok(self.stream.push_line(line))
    }
}
