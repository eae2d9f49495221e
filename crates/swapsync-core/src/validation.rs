//! # Validation Module
//!
//! Input validation run by the engines before any row is touched.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Transport (deserialisation, types)                            │
//! │  Layer 2: THIS MODULE (business rules: lengths, formats, ranges)        │
//! │  Layer 3: SQLite (NOT NULL, UNIQUE, CHECK, foreign keys)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use swapsync_core::validation::{validate_imei, validate_required};
//!
//! assert_eq!(validate_required("full_name", "  Ama  ", 120).unwrap(), "Ama");
//! assert!(validate_imei("35209900176148").is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Length of an IMEI.
pub const IMEI_LEN: usize = 15;

// =============================================================================
// String Validators
// =============================================================================

/// Trims `value` and checks it is non-empty and at most `max` characters.
pub fn validate_required(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(value.to_string())
}

/// Trims an optional value; blank becomes `None`.
pub fn validate_optional(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> ValidationResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => validate_required(field, v, max).map(Some),
    }
}

/// Validates a phone number as typed by staff.
///
/// ## Rules
/// - Digits plus separators (`space - . ( )`) and an optional leading `+`
/// - 9 to 15 digits
pub fn validate_phone_number(field: &str, value: &str) -> ValidationResult<String> {
    let value = validate_required(field, value, 32)?;
    let body = value.strip_prefix('+').unwrap_or(&value);

    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '.' | '(' | ')'))
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only digits and separators".to_string(),
        });
    }

    let digits = body.chars().filter(char::is_ascii_digit).count();
    if !(9..=15).contains(&digits) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must have between 9 and 15 digits".to_string(),
        });
    }
    Ok(value)
}

/// Minimal shape check: `local@domain.tld`.
pub fn validate_email(value: &str) -> ValidationResult<String> {
    let value = validate_required("email", value, 254)?;
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "email".to_string(),
            reason: "not a valid email address".to_string(),
        });
    }
    Ok(value)
}

/// Exactly 15 digits.
pub fn validate_imei(value: &str) -> ValidationResult<String> {
    let value = value.trim();
    if value.len() != IMEI_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "imei".to_string(),
            reason: format!("must be exactly {} digits", IMEI_LEN),
        });
    }
    Ok(value.to_string())
}

/// 3 to 50 characters of letters, digits, `_`, `.` or `-`.
pub fn validate_username(value: &str) -> ValidationResult<String> {
    let value = validate_required("username", value, 50)?;
    if value.len() < 3 {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must be at least 3 characters".to_string(),
        });
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must contain only letters, numbers, '_', '.' and '-'".to_string(),
        });
    }
    Ok(value)
}

pub fn validate_password(value: &str) -> ValidationResult<()> {
    if value.chars().count() < 6 {
        return Err(ValidationError::InvalidFormat {
            field: "password".to_string(),
            reason: "must be at least 6 characters".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Positive and at most [`MAX_ITEM_QUANTITY`].
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Money that must be `>= 0`.
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::negative(field));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims_and_limits() {
        assert_eq!(validate_required("name", " Kofi ", 10).unwrap(), "Kofi");
        assert!(validate_required("name", "   ", 10).is_err());
        assert!(validate_required("name", "abcdefghijk", 10).is_err());
    }

    #[test]
    fn test_optional_blank_is_none() {
        assert_eq!(validate_optional("email", Some("  "), 10).unwrap(), None);
        assert_eq!(validate_optional("email", None, 10).unwrap(), None);
    }

    #[test]
    fn test_phone_number() {
        assert!(validate_phone_number("phone_number", "024 123 4567").is_ok());
        assert!(validate_phone_number("phone_number", "+233241234567").is_ok());
        assert!(validate_phone_number("phone_number", "0241").is_err());
        assert!(validate_phone_number("phone_number", "024-abc-4567").is_err());
    }

    #[test]
    fn test_email() {
        assert!(validate_email("ama@shop.com.gh").is_ok());
        assert!(validate_email("ama@shop").is_err());
        assert!(validate_email("@shop.com").is_err());
    }

    #[test]
    fn test_imei() {
        assert!(validate_imei("352099001761481").is_ok());
        assert!(validate_imei("35209900176148X").is_err());
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_username_and_password() {
        assert!(validate_username("ama.mensah").is_ok());
        assert!(validate_username("am").is_err());
        assert!(validate_username("ama mensah").is_err());
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("abc").is_err());
    }
}
