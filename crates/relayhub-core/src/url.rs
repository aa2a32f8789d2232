/// Join an endpoint base URL with an incoming request path.
///
/// The base is normalised (scheme defaulted to https, trailing `/` stripped).
/// Overlapping segments are collapsed: the longest run of trailing base
/// segments equal to leading path segments is dropped from the path, so a
/// base of `https://u.test/v1` joined with `/v1/messages` yields
/// `https://u.test/v1/messages`, and re-joining an already-joined URL is a
/// no-op.
pub fn join_target_url(api_url: &str, path: &str) -> String {
    let base = normalize_base(api_url);
    let (root, base_path) = split_base(&base);

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    if !base_path.is_empty() && base_path.ends_with(&path) {
        return base;
    }

    let base_segments: Vec<&str> = base_path.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut dropped = 0;
    let max_overlap = base_segments.len().min(path_segments.len());
    for k in (1..=max_overlap).rev() {
        if base_segments[base_segments.len() - k..] == path_segments[..k] {
            dropped = k;
            break;
        }
    }

    let mut out = String::with_capacity(base.len() + path.len());
    out.push_str(root);
    out.push_str(&base_path);
    for segment in &path_segments[dropped..] {
        out.push('/');
        out.push_str(segment);
    }
    out
}

fn normalize_base(api_url: &str) -> String {
    let trimmed = api_url.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

fn split_base(base: &str) -> (&str, String) {
    let after_scheme = match base.find("://") {
        Some(position) => position + 3,
        None => 0,
    };
    match base[after_scheme..].find('/') {
        Some(position) => {
            let split = after_scheme + position;
            (&base[..split], base[split..].to_string())
        }
        None => (base, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_join() {
        assert_eq!(
            join_target_url("https://u.test", "/v1/messages"),
            "https://u.test/v1/messages"
        );
    }

    #[test]
    fn scheme_defaults_to_https_and_trailing_slash_dropped() {
        assert_eq!(
            join_target_url("u.test/", "/v1/messages"),
            "https://u.test/v1/messages"
        );
        assert_eq!(
            join_target_url("http://local:8080", "/chat"),
            "http://local:8080/chat"
        );
    }

    #[test]
    fn overlapping_v1_collapses() {
        assert_eq!(
            join_target_url("https://u.test/v1", "/v1/messages"),
            "https://u.test/v1/messages"
        );
        assert_eq!(
            join_target_url("https://u.test/api/v1", "/v1/chat/completions"),
            "https://u.test/api/v1/chat/completions"
        );
    }

    #[test]
    fn multi_segment_overlap_collapses() {
        assert_eq!(
            join_target_url("https://u.test/v1/chat", "/v1/chat/completions"),
            "https://u.test/v1/chat/completions"
        );
    }

    #[test]
    fn base_ending_with_path_is_reused() {
        assert_eq!(
            join_target_url("https://u.test/custom/v1/messages", "/v1/messages"),
            "https://u.test/custom/v1/messages"
        );
    }

    #[test]
    fn join_is_left_identity_on_itself() {
        for (base, path) in [
            ("https://u.test", "/v1/messages"),
            ("https://u.test/v1", "/v1/responses"),
            ("u.test/api", "/v1beta/models/m:generateContent"),
        ] {
            let once = join_target_url(base, path);
            assert_eq!(join_target_url(&once, path), once);
        }
    }

    #[test]
    fn gemini_action_path_is_one_segment() {
        assert_eq!(
            join_target_url("https://g.test/v1beta", "/v1beta/models/m:streamGenerateContent"),
            "https://g.test/v1beta/models/m:streamGenerateContent"
        );
    }
}
