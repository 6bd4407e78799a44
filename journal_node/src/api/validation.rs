//! Request validation utilities for the journal API

use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::errors::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MAX_JOURNAL_LEN: usize = 10_000;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Invalid email regex")
});

/// Validate email format
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::new("email", "Email cannot be empty"));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::new("email", "Invalid email format"));
    }

    Ok(())
}

/// Validate password length; every failing bound is reported
pub fn validate_password(password: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let len = password.chars().count();

    if len < MIN_PASSWORD_LEN {
        errors.push(ValidationError::new(
            "password",
            "Password must be at least 6 characters long",
        ));
    }

    if len > MAX_PASSWORD_LEN {
        errors.push(ValidationError::new(
            "password",
            "Password must be less than 128 characters",
        ));
    }

    errors
}

/// Validate journal entry text after trimming
pub fn validate_journal_content(content: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let content = content.trim();

    if content.is_empty() {
        errors.push(ValidationError::new(
            "content",
            "Journal content cannot be empty",
        ));
    }

    if content.chars().count() > MAX_JOURNAL_LEN {
        errors.push(ValidationError::new(
            "content",
            "Journal content must be less than 10,000 characters",
        ));
    }

    errors
}

pub fn sanitize_input(input: &str) -> String {
    input.trim().to_string()
}

/// Emails compare case-insensitively
pub fn normalize_email(email: &str) -> String {
    sanitize_input(email).to_lowercase()
}

/// Clamp a list limit into `1..=max`, falling back to `default`
pub fn validate_limit(limit: Option<u32>, default: u32, max: u32) -> Result<u32, ValidationError> {
    match limit {
        None => Ok(default),
        Some(0) => Err(ValidationError::new("limit", "Limit must be greater than 0")),
        Some(limit) if limit > max => Err(ValidationError::new(
            "limit",
            &format!("Limit cannot exceed {}", max),
        )),
        Some(limit) => Ok(limit),
    }
}
