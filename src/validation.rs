//! Input validation helpers shared by configuration loading and the HTTP forms.

use std::ops::RangeInclusive;

/// Validates that a port number is usable (non-zero).
///
/// # Returns
///
/// * `Ok(())` if the port is valid.
/// * `Err(&'static str)` if the port is invalid.
pub fn is_valid_port(port: u16) -> Result<(), &'static str> {
    if port > 0 {
        Ok(())
    } else {
        Err("Port number must be greater than 0")
    }
}

/// Validates if a given string is a valid file path.
///
/// # Returns
///
/// * `Ok(())` if the file path is valid.
/// * `Err(&'static str)` if the file path is invalid.
pub fn is_valid_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("File path cannot be empty");
    }
    if path.contains('\0') {
        return Err("File path cannot contain null bytes");
    }
    Ok(())
}

/// Validates if a given value is within a specified numeric range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Parse a form field as a finite number no smaller than `min`.
pub fn parse_number_at_least(raw: &str, min: f64) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| "Must be a number".to_string())?;
    if !value.is_finite() {
        return Err("Must be a number".to_string());
    }
    if value < min {
        return Err(format!("Must be >= {:?}", min));
    }
    Ok(value)
}

/// Parse a form field as a finite number inside `range`.
pub fn parse_number_between(raw: &str, range: RangeInclusive<f64>) -> Result<f64, String> {
    let value = parse_number_at_least(raw, *range.start())?;
    if value > *range.end() {
        return Err(format!("Must be <= {:?}", range.end()));
    }
    Ok(value)
}

/// Parse a form field as an integer greater than zero.
pub fn parse_positive_int(raw: &str) -> Result<u32, String> {
    match raw.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err("Must be an integer > 0".to_string()),
        Ok(value) => Ok(value),
    }
}

/// Parse a form field as an integer inside `range`.
pub fn parse_int_in_range(raw: &str, range: RangeInclusive<i64>) -> Result<i64, String> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| "Must be an integer".to_string())?;
    is_in_range(value, range.clone())
        .map_err(|_| format!("Must be between {} and {}", range.start(), range.end()))?;
    Ok(value)
}
