//! Input checks shared by the request DTOs.

use chrono::NaiveTime;
use regex::Regex;

use crate::errors::AppError;

lazy_static::lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9]{6,20}$").unwrap();
    static ref PLATE_RE: Regex = Regex::new(r"^[A-Z0-9][A-Z0-9 -]{0,14}$").unwrap();
    static ref HHMM_RE: Regex = Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap();
}

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Strips formatting characters, keeping digits and a leading `+`.
pub fn sanitize_phone(phone: &str) -> Option<String> {
    let digits: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    if PHONE_RE.is_match(&digits) {
        Some(digits)
    } else {
        None
    }
}

/// Upper-cases and collapses whitespace; `None` when the plate is unusable.
pub fn normalize_plate(plate: &str) -> Option<String> {
    let normalized = plate
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    if PLATE_RE.is_match(&normalized) {
        Some(normalized)
    } else {
        None
    }
}

pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    if !HHMM_RE.is_match(value) {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

pub fn ensure_max_len(value: &str, max: usize) -> bool {
    value.chars().count() <= max
}

pub fn require_text(field: &str, value: &str, max: usize) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", field)));
    }
    if !ensure_max_len(trimmed, max) {
        return Err(AppError::InvalidInput(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

/// Trims optional free text, mapping blanks to `None`.
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) if !ensure_max_len(v, max) => Err(AppError::InvalidInput(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        Some(v) => Ok(Some(v.to_string())),
        None => Ok(None),
    }
}

pub fn optional_phone(value: Option<&str>) -> Result<Option<String>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => sanitize_phone(raw)
            .map(Some)
            .ok_or_else(|| AppError::InvalidInput("Invalid phone number".to_string())),
        None => Ok(None),
    }
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if !ensure_max_len(password, 72) {
        return Err(AppError::InvalidInput(
            "password must be at most 72 characters".to_string(),
        ));
    }
    Ok(())
}
