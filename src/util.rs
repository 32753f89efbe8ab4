/// Maximum length for oracle content echoed into error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Truncate a string slice without allocating (Unicode-safe)
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Sanitize server response content before it ends up in an error message.
///
/// Bodies are cut to a short preview, and anything that looks like it carries
/// a credential is redacted entirely.
pub fn sanitize_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
    ];

    let truncated = truncate_str(content.trim(), MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

/// Format a monetary amount for display
pub fn format_money(amount: f64) -> String {
    format!("$ {:.2}", amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_adds_ellipsis() {
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn test_truncate_str_is_char_safe() {
        assert_eq!(truncate_str("añoñoño", 3), "año");
        assert_eq!(truncate_str("ab", 5), "ab");
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        assert_eq!(
            sanitize_response("invalid api_key supplied"),
            "(response details redacted - may contain sensitive data)"
        );
        assert_eq!(sanitize_response("  upstream busy  "), "upstream busy");
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        assert_eq!(sanitize_response(&body).chars().count(), MAX_ERROR_CONTENT_LEN);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(500.0), "$ 500.00");
        assert_eq!(format_money(12.345), "$ 12.35");
    }
}
