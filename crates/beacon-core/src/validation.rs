//! # Validation Module
//!
//! Input validation for values that end up in the device record.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Platform glue (app code)                                     │
//! │  └── Hands over raw OS values (zone name, push token)                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: SyncEngine                                                   │
//! │  └── THIS MODULE: rejects values the registry would refuse             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Registry backend                                             │
//! │  └── Authoritative schema checks                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::TokenUpdate;
use crate::{MAX_OFFSET_MINUTES, MAX_TOKEN_LEN, MIN_OFFSET_MINUTES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a device identifier.
///
/// ## Rules
/// - Must not be empty
/// - At most 128 characters
/// - No whitespace
///
/// ## Example
/// ```rust
/// use beacon_core::validation::validate_device_id;
///
/// assert!(validate_device_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_device_id("").is_err());
/// assert!(validate_device_id("has space").is_err());
/// ```
pub fn validate_device_id(device_id: &str) -> ValidationResult<()> {
    if device_id.trim().is_empty() {
        return Err(ValidationError::required("device_id"));
    }

    if device_id.len() > 128 {
        return Err(ValidationError::TooLong {
            field: "device_id".to_string(),
            max: 128,
        });
    }

    if device_id.chars().any(char::is_whitespace) {
        return Err(ValidationError::invalid("device_id", "must not contain whitespace"));
    }

    Ok(())
}

/// Validates an IANA timezone name.
///
/// Only the shape is checked (letters, digits, `/`, `_`, `-`, `+`); the
/// zone database itself is not consulted.
pub fn validate_timezone(timezone: &str) -> ValidationResult<()> {
    if timezone.is_empty() {
        return Err(ValidationError::required("timezone"));
    }

    if timezone.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "timezone".to_string(),
            max: 64,
        });
    }

    if !timezone
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '+'))
    {
        return Err(ValidationError::invalid(
            "timezone",
            "must look like an IANA zone name (e.g. Europe/Paris)",
        ));
    }

    Ok(())
}

/// Validates a UTC offset in minutes.
pub fn validate_offset_minutes(offset: i32) -> ValidationResult<()> {
    if !(MIN_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&offset) {
        return Err(ValidationError::OutOfRange {
            field: "timezone_offset_minutes".to_string(),
            min: MIN_OFFSET_MINUTES as i64,
            max: MAX_OFFSET_MINUTES as i64,
        });
    }
    Ok(())
}

/// Normalizes a token handed over by the platform.
///
/// Missing or blank tokens become [`TokenUpdate::Clear`]; permission denial
/// is not an error.
pub fn normalize_token(token: Option<&str>) -> ValidationResult<TokenUpdate> {
    let update = TokenUpdate::from_token(token);

    if let TokenUpdate::Set(ref value) = update {
        if value.len() > MAX_TOKEN_LEN {
            return Err(ValidationError::TooLong {
                field: "fcm_token".to_string(),
                max: MAX_TOKEN_LEN,
            });
        }
        if value.chars().any(char::is_whitespace) {
            return Err(ValidationError::invalid("fcm_token", "must not contain whitespace"));
        }
    }

    Ok(update)
}
