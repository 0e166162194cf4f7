//! Form payloads and field validation.

use regex::Regex;
use serde::Deserialize;

/// Per-field validation messages plus form-wide (non-field) ones.
/// The first message recorded for a field wins.
#[derive(Debug, Clone, Default)]
pub struct FieldErrors {
    fields: Vec<(String, String)>,
    non_field: Vec<String>,
}

impl FieldErrors {
    /// Record `message` against `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok && self.get(field).is_none() {
            self.fields.push((field.to_string(), message.to_string()));
        }
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.check(false, field, message);
    }

    pub fn add_non_field(&mut self, message: &str) {
        self.non_field.push(message.to_string());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, message)| message.as_str())
    }

    #[must_use]
    pub fn non_field(&self) -> &[String] {
        &self.non_field
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }
}

#[must_use]
pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

#[must_use]
pub fn max_chars(value: &str, limit: usize) -> bool {
    value.chars().count() <= limit
}

#[must_use]
pub fn min_chars(value: &str, minimum: usize) -> bool {
    value.chars().count() >= minimum
}

#[must_use]
pub fn permitted(value: i64, allowed: &[i64]) -> bool {
    allowed.contains(&value)
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SnippetForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub expires: String,
    #[serde(default)]
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub csrf_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_field_message_wins() {
        let mut errors = FieldErrors::default();
        errors.check(false, "title", "first");
        errors.check(false, "title", "second");
        assert_eq!(errors.get("title"), Some("first"));
    }

    #[test]
    fn passing_checks_record_nothing() {
        let mut errors = FieldErrors::default();
        errors.check(true, "title", "unused");
        assert!(errors.is_empty());
    }

    #[test]
    fn blank_and_length_checks() {
        assert!(!not_blank("   "));
        assert!(not_blank("x"));
        assert!(max_chars("abc", 3));
        assert!(!max_chars("abcd", 3));
        assert!(min_chars("pw123456", 8));
        assert!(!min_chars("short", 8));
    }

    #[test]
    fn permitted_values() {
        assert!(permitted(7, &[1, 7, 365]));
        assert!(!permitted(2, &[1, 7, 365]));
    }

    #[test]
    fn email_format() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("a b@example.com"));
    }

    #[test]
    fn forms_tolerate_missing_fields() {
        let form: SignupForm = serde_urlencoded::from_str("name=Alice").unwrap();
        assert_eq!(form.name, "Alice");
        assert_eq!(form.email, "");
        assert_eq!(form.csrf_token, "");
    }
}
