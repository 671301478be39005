//! Input validation utilities

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Largest amount a NUMERIC(12, 2) column holds
pub const MAX_AMOUNT: f64 = 9_999_999_999.99;

/// Validate a required free-text field and return it trimmed
pub fn require_text(field: &str, value: Option<&str>, max_len: usize) -> Result<String, String> {
    let value = value.map(str::trim).unwrap_or_default();

    if value.is_empty() {
        return Err(format!("{} is required", field));
    }

    if value.chars().count() > max_len {
        return Err(format!("{} must be at most {} characters long", field, max_len));
    }

    Ok(value.to_string())
}

/// Validate a monetary amount and return it snapped to whole cents
///
/// Amounts are stored as NUMERIC(12, 2), so anything finer than a cent would
/// be rounded by the database.
pub fn validate_amount(field: &str, value: Option<f64>) -> Result<f64, String> {
    let value = value.ok_or_else(|| format!("{} is required", field))?;

    if !value.is_finite() || value <= 0.0 {
        return Err(format!("{} must be greater than zero", field));
    }

    if value > MAX_AMOUNT {
        return Err(format!("{} must be at most {}", field, MAX_AMOUNT));
    }

    let scaled = value * 100.0;
    let cents = scaled.round();
    if (scaled - cents).abs() > 1e-3 {
        return Err(format!("{} must have at most two decimal places", field));
    }

    Ok(cents / 100.0)
}

/// Validate a proposed work window
pub fn validate_date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate), String> {
    let start = start.ok_or_else(|| "start_date is required".to_string())?;
    let end = end.ok_or_else(|| "end_date is required".to_string())?;

    if start > end {
        return Err("start_date must not be after end_date".to_string());
    }

    Ok((start, end))
}

/// Validate a display name
pub fn validate_display_name(display_name: &str) -> Result<(), String> {
    let length = display_name.trim().chars().count();

    if length == 0 {
        return Err("Display name is required".to_string());
    }

    if length > 100 {
        return Err("Display name must be at most 100 characters long".to_string());
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}
