mod request;
mod response;
mod stream;

use relayhub_common::InterfaceType;

use crate::{TransformError, Transformer};

/// OpenAI Responses client speaking to a Chat Completions upstream.
pub struct ResponsesToChat {
    stream: stream::ChatToResponsesStream,
}

impl ResponsesToChat {
    pub fn new() -> Self {
        Self {
            stream: stream::ChatToResponsesStream::new(),
        }
    }
}

impl Default for ResponsesToChat {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for ResponsesToChat {
    fn target_interface_type(&self) -> InterfaceType {
        InterfaceType::Chat
    }

    fn target_path(&self, _is_streaming: bool, _model: &str) -> String {
        "/v1/chat/completions".to_string()
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
