//! Input validation for registration, session and comment input.
//!
//! Validators return `Err(message)` so callers can either collect them with
//! `ValidationErrorBuilder` or turn the first failure into a `CoreError`.

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Letters, digits, dot, dash and underscore
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9._-]+$").unwrap();

    /// Pragmatic email check: local@domain.tld, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$"
    ).unwrap();
}

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 80;
pub const EMAIL_MAX: usize = 120;
pub const PASSWORD_MIN: usize = 6;
pub const TITLE_MAX: usize = 200;
pub const TIME_MAX: usize = 20;
pub const LOCATION_MAX: usize = 200;
pub const TOPIC_MAX: usize = 100;

/// Accepted input formats for a session date. Only the date part is kept.
const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

fn required(value: &str, label: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }

    if value.chars().count() > max {
        return Err(format!("{} is too long (max {} characters)", label, max));
    }

    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if len == 0 {
        return Err("Username is required".to_string());
    }

    if len < USERNAME_MIN || len > USERNAME_MAX {
        return Err(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN, USERNAME_MAX
        ));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username may only contain letters, digits, dots, dashes and underscores".to_string(),
        );
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.chars().count() > EMAIL_MAX {
        return Err(format!("Email is too long (max {} characters)", EMAIL_MAX));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < PASSWORD_MIN {
        return Err(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN
        ));
    }

    Ok(())
}

pub fn validate_password_confirmation(password: &str, confirm: &str) -> Result<(), String> {
    if password != confirm {
        return Err("Passwords do not match".to_string());
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), String> {
    required(title, "Session title", TITLE_MAX)
}

pub fn validate_time(time: &str) -> Result<(), String> {
    required(time, "Time", TIME_MAX)
}

pub fn validate_location(location: &str) -> Result<(), String> {
    required(location, "Location", LOCATION_MAX)
}

/// Topic is optional; an empty string is treated as no topic
pub fn validate_topic(topic: &Option<String>) -> Result<(), String> {
    if let Some(t) = topic {
        if t.chars().count() > TOPIC_MAX {
            return Err(format!("Topic is too long (max {} characters)", TOPIC_MAX));
        }
    }
    Ok(())
}

pub fn validate_comment(content: &str, max: usize) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Comment cannot be empty".to_string());
    }

    if content.trim().chars().count() > max {
        return Err(format!("Comment is too long (max {} characters)", max));
    }

    Ok(())
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}

/// Parse a session date from `YYYY-MM-DD` or `YYYY-MM-DD HH:MM`.
pub fn parse_session_date(input: &str) -> Result<NaiveDate, String> {
    let input = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(input, DATE_FORMAT) {
        return Ok(date);
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(dt.date());
        }
    }

    Err(format!(
        "'{}' is not a valid date. Use YYYY-MM-DD",
        input
    ))
}

/// Empty or whitespace-only topics are stored as absent
pub fn normalize_topic(topic: Option<String>) -> Option<String> {
    topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
