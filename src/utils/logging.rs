//! Logging utilities with credential protection
//!
//! Helpers to log request details without exposing API keys or bearer
//! tokens.

use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:sk-[A-Za-z0-9_\-]{8,}|AIza[0-9A-Za-z_\-]{20,}|Bearer\s+[A-Za-z0-9._\-]{8,})")
        .expect("secret pattern is a valid literal regex")
});

/// Obscures a credential string by showing only the first few characters
///
/// # Examples
///
/// ```rust
/// use braid::utils::logging::obscure_credential;
///
/// let credential = "sk-ant-api03-abcdef";
/// let obscured = obscure_credential(credential);
/// assert_eq!(obscured, "sk-an***");
/// ```
pub fn obscure_credential(credential: &str) -> String {
    let char_count = credential.chars().count();
    if char_count <= 5 {
        "*".repeat(char_count)
    } else {
        format!("{}***", truncate_string(credential, 5))
    }
}

/// Safely truncates a string to a maximum number of characters, respecting UTF-8 boundaries
///
/// # Examples
///
/// ```rust
/// use braid::utils::logging::truncate_string;
///
/// assert_eq!(truncate_string("Short", 100), "Short");
/// assert_eq!(truncate_string("héllo wörld", 7), "héllo w");
/// ```
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Masks anything that looks like an API key or bearer token.
///
/// Used on vendor error bodies before they reach logs, since some vendors
/// echo the offending key back.
pub fn sanitize_for_logging(input: &str) -> String {
    SECRET_PATTERN
        .replace_all(input, |caps: &regex::Captures| obscure_credential(&caps[0]))
        .into_owned()
}
