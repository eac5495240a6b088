//! Input checks run before any remote call.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Minimum characters in a person's name.
pub const MIN_NAME_CHARS: usize = 2;

static PHONE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn phone_pattern() -> &'static Regex {
    PHONE_PATTERN.get_or_init(|| Regex::new(r"^[0-9]{10,}$").expect("this regex should always be valid"))
}

/// Trimmed value, or a validation error when blank.
pub fn required(field: &'static str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(field, "is required"));
    }
    Ok(value.to_string())
}

pub fn name(field: &'static str, value: &str) -> Result<String> {
    let value = required(field, value)?;
    if value.chars().count() < MIN_NAME_CHARS {
        return Err(Error::validation(
            field,
            format!("must be at least {} characters", MIN_NAME_CHARS),
        ));
    }
    Ok(value)
}

/// Ten or more digits, nothing else.
pub fn phone(field: &'static str, value: &str) -> Result<String> {
    let value = value.trim();
    if !phone_pattern().is_match(value) {
        return Err(Error::validation(field, "must be at least 10 digits"));
    }
    Ok(value.to_string())
}

pub fn email(field: &'static str, value: &str) -> Result<String> {
    let value = required(field, value)?;
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(value),
        _ => Err(Error::validation(field, "is not an email address")),
    }
}

pub fn fuel_level(value: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&value) {
        return Err(Error::validation("fuelLevel", "must be between 0 and 100"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_length_counts_chars() {
        assert!(name("name", "A").is_err());
        assert_eq!(name("name", "  Ali ").unwrap(), "Ali");
        assert!(name("name", "عل").is_ok());
    }

    #[test]
    fn test_phone_pattern() {
        assert!(phone("parentPhone", "0501234567").is_ok());
        assert!(phone("parentPhone", "966501234567").is_ok());
        assert!(phone("parentPhone", "050123456").is_err());
        assert!(phone("parentPhone", "050-123-4567").is_err());
        assert!(phone("parentPhone", "").is_err());
    }

    #[test]
    fn test_email() {
        assert!(email("email", "huda@example.com").is_ok());
        assert!(email("email", "huda").is_err());
        assert!(email("email", "@example.com").is_err());
    }

    #[test]
    fn test_fuel_level_range() {
        assert!(fuel_level(0.0).is_ok());
        assert!(fuel_level(100.0).is_ok());
        assert!(fuel_level(100.5).is_err());
    }
}
