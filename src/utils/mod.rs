//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod locks;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

pub use locks::KeyedLocks;
pub use retry::{with_retry, RetryConfig};

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Loose email shape check: `local@domain.tld` without whitespace
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

    let re = EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid regex pattern")
    });

    re.is_match(email.trim())
}

/// Keep only digits and a leading `+` so `010-1234 5678` and `01012345678` match
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (i == 0 && c == '+') {
            out.push(c);
        }
    }
    out
}

/// Reject a blank required field
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("hello\n\nworld"), "hello world");
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email(" Ada.L@uni.ac.uk "));
        assert!(!is_valid_email("ada@"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("two@@example.com"));
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("010-1234 5678"), "01012345678");
        assert_eq!(normalize_phone(" +82 10 1234 "), "+82101234");
        assert_eq!(normalize_phone("ext+1"), "1");
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("title", "Intro").is_ok());
        let err = require_non_empty("title", "   ").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: title cannot be empty");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("very long text here", 10), "very lo...");
    }
}
