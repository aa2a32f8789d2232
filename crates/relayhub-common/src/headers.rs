/// Mask a secret for log output, keeping the first 8 and last 4 characters.
///
/// Short secrets are fully masked.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Sanitise request headers for the log-detail view.
///
/// `Authorization` keeps its `Bearer ` prefix with the secret masked,
/// `x-api-key` is masked the same way, and `Cookie` is dropped entirely.
pub fn sanitize_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked = match name.to_ascii_lowercase().as_str() {
                "authorization" => match value.strip_prefix("Bearer ") {
                    Some(token) => format!("Bearer {}", mask_secret(token)),
                    None => mask_secret(value),
                },
                "x-api-key" => mask_secret(value),
                "cookie" => "[redacted]".to_string(),
                _ => value.clone(),
            };
            (name.clone(), masked)
        })
        .collect()
}
