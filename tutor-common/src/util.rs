//! Utility functions shared by relay services.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Operates on character boundaries, so multi-byte UTF-8 input is safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Replace every occurrence of `secret` in `s` before it reaches a log or a client.
pub fn redact_secret(s: &str, secret: &str) -> String {
    if secret.is_empty() {
        return s.to_string();
    }
    s.replace(secret, "***REDACTED***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
        assert_eq!(truncate_with_ellipsis("😀😀😀😀", 2), "😀😀...");
        assert_eq!(truncate_with_ellipsis("", 10), "");
    }

    #[test]
    fn test_redact_secret() {
        let out = redact_secret("Incorrect API key provided: sk-abc123", "sk-abc123");
        assert!(!out.contains("sk-abc123"));
        assert!(out.contains("REDACTED"));
        assert_eq!(redact_secret("nothing here", ""), "nothing here");
    }
}
