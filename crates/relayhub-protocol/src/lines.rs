use bytes::Bytes;

/// Incremental splitter turning arbitrary byte chunks into text lines.
///
/// Upstream SSE and Gemini JSON-line streams are both line-oriented; chunk
/// boundaries fall anywhere, so completed lines are only released once their
/// terminating `\n` arrives. A trailing `\r` is stripped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line completed by it.
    ///
    /// Non-UTF-8 chunks are decoded lossily; provider streams are text.
    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<String> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => {
                let text = String::from_utf8_lossy(chunk).into_owned();
                self.push_str(&text)
            }
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut lines = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }

        lines
    }

    /// Flush whatever is left after the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_across_chunk_boundaries() {
        let mut buf = LineBuffer::new();
        assert!(buf.push_str("data: {\"a\":").is_empty());
        let lines = buf.push_str("1}\n\ndata: x\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: x"]);
    }

    #[test]
    fn strips_carriage_returns() {
        let mut buf = LineBuffer::new();
        let lines = buf.push_str("one\r\ntwo\r\n");
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn finish_releases_trailing_line() {
        let mut buf = LineBuffer::new();
        buf.push_str("tail without newline");
        assert_eq!(buf.finish(), Some("tail without newline".to_string()));
        assert_eq!(buf.finish(), None);
    }
}
