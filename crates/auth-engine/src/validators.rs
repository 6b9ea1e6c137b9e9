//! Credential shape checks run before any request leaves the client.

use client_config_and_utils::DEFAULT_MIN_PASSWORD_LENGTH;
use regex::Regex;
use std::sync::OnceLock;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|_| unreachable!())
    })
}

/// Returns true if `email` looks like an email address.
pub fn is_valid_email(email: Option<&str>) -> bool {
    email.is_some_and(|email| email_regex().is_match(email))
}

/// Minimum-strength rule for passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    min_length: usize,
}

impl PasswordPolicy {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Length is counted in characters, not bytes.
    pub fn is_valid(&self, password: Option<&str>) -> bool {
        password.is_some_and(|password| password.chars().count() >= self.min_length)
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PASSWORD_LENGTH)
    }
}

/// Checks `password` against the default policy.
pub fn is_valid_password(password: Option<&str>) -> bool {
    PasswordPolicy::default().is_valid(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email(Some("ada@example.com")));
        assert!(is_valid_email(Some("first.last+tag@sub.example.org")));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(None));
        assert!(!is_valid_email(Some("")));
        assert!(!is_valid_email(Some("no-at-sign.com")));
        assert!(!is_valid_email(Some("two@@example.com")));
        assert!(!is_valid_email(Some("spaces in@example.com")));
        assert!(!is_valid_email(Some("missing@tld")));
    }

    #[test]
    fn test_default_policy_requires_eight_chars() {
        assert!(!is_valid_password(None));
        assert!(!is_valid_password(Some("ab")));
        assert!(!is_valid_password(Some("1234567")));
        assert!(is_valid_password(Some("12345678")));
        assert!(is_valid_password(Some("Str0ngPass!")));
    }

    #[test]
    fn test_policy_counts_characters() {
        let policy = PasswordPolicy::new(4);
        // Four characters, more than four bytes
        assert!(policy.is_valid(Some("ééé€")));
        assert!(!policy.is_valid(Some("ééé")));
    }

    #[test]
    fn test_custom_policy() {
        let policy = PasswordPolicy::new(12);
        assert_eq!(policy.min_length(), 12);
        assert!(!policy.is_valid(Some("Str0ngPass!")));
        assert!(policy.is_valid(Some("Str0ngPass!!")));
    }
}
