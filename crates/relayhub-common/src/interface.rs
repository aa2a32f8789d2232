use serde::{Deserialize, Serialize};

/// Wire-protocol family a request or endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Claude,
    Codex,
    Gemini,
    Chat,
}

impl InterfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceType::Claude => "claude",
            InterfaceType::Codex => "codex",
            InterfaceType::Gemini => "gemini",
            InterfaceType::Chat => "chat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" => Some(InterfaceType::Claude),
            "codex" => Some(InterfaceType::Codex),
            "gemini" => Some(InterfaceType::Gemini),
            "chat" => Some(InterfaceType::Chat),
            _ => None,
        }
    }
}

impl std::fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a request path into an interface family.
///
/// Rules are applied in order; unmatched paths default to `claude` so that
/// Anthropic-style clients hitting auxiliary endpoints still reach their
/// configured upstream.
pub fn detect_interface_type(path: &str) -> InterfaceType {
    let lower = path.to_ascii_lowercase();

    if lower.starts_with("/v1/messages") {
        return InterfaceType::Claude;
    }
    if lower.starts_with("/v1/chat/completions") || lower.ends_with("/chat/completions") {
        return InterfaceType::Chat;
    }
    if lower.starts_with("/v1/responses") || lower.ends_with("/responses") {
        return InterfaceType::Codex;
    }
    if lower.contains("/gemini") {
        return InterfaceType::Gemini;
    }
    if lower.starts_with("/chat") {
        return InterfaceType::Chat;
    }
    InterfaceType::Claude
}
