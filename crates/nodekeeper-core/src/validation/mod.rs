//! Input validation and sanitization.
//!
//! Every value that ends up in a file name, a signal, or the identity
//! record passes through here first.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Validation error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Required value missing or empty.
    #[error("Must define variable: {0}")]
    Missing(&'static str),

    /// Input exceeds maximum allowed length.
    #[error("Input exceeds maximum length ({max} characters, got {actual})")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Input is shorter than required.
    #[error("Must be {min} or more characters.")]
    TooShort {
        /// Minimum required length.
        min: usize,
    },

    /// Disallowed characters in input.
    #[error("Disallowed characters in input: {0}")]
    DisallowedChars(&'static str),
}

/// Size limits per input type.
pub mod limits {
    /// Maximum app identifier length.
    pub const MAX_APP_ID_LENGTH: usize = 64;

    /// Maximum display name length.
    pub const MAX_NAME_LENGTH: usize = 64;

    /// Maximum password length (bounds hashing cost).
    pub const MAX_PASSWORD_LENGTH: usize = 1024;

    /// Maximum release version length.
    pub const MAX_VERSION_LENGTH: usize = 32;
}

/// Check a password against the minimum length policy.
///
/// Length is counted in characters, not bytes.
///
/// # Errors
///
/// Returns `TooShort` or `TooLong` when outside the accepted range.
pub fn validate_password(password: &str, min_len: usize) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < min_len {
        return Err(ValidationError::TooShort { min: min_len });
    }
    if len > limits::MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_PASSWORD_LENGTH,
            actual: len,
        });
    }
    Ok(())
}

/// Validate an app identifier before it is embedded in a signal file name.
///
/// # Errors
///
/// Returns error if the id is empty, too long, or not `[A-Za-z0-9-]`.
pub fn validate_app_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::Missing("app id"));
    }
    if id.len() > limits::MAX_APP_ID_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_APP_ID_LENGTH,
            actual: id.len(),
        });
    }
    if id.starts_with('-') || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::DisallowedChars(
            "must include only alpha numeric characters and dashes",
        ));
    }
    Ok(())
}

/// Validate and normalize a display name.
///
/// Strips control characters, applies NFKC, then requires alphanumerics
/// and spaces only.
///
/// # Errors
///
/// Returns error if the result is empty, too long, or has other characters.
pub fn validate_display_name(input: &str) -> Result<String, ValidationError> {
    let sanitized: String = input.chars().filter(|c| !c.is_control()).collect();
    let normalized: String = sanitized.nfkc().collect();
    let trimmed = normalized.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Missing("name"));
    }

    let len = trimmed.chars().count();
    if len > limits::MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_NAME_LENGTH,
            actual: len,
        });
    }

    if !trimmed.chars().all(|c| c.is_alphanumeric() || c == ' ') {
        return Err(ValidationError::DisallowedChars(
            "must include only alpha numeric characters and spaces",
        ));
    }

    Ok(trimmed.to_string())
}

/// Validate a release version and return it without a leading `v`.
///
/// # Errors
///
/// Returns error unless the input looks like `1.2.3` or `v1.2.3-rc.1`.
pub fn validate_release_version(input: &str) -> Result<String, ValidationError> {
    let version = input.trim();
    let version = version.strip_prefix('v').unwrap_or(version);

    if version.is_empty() {
        return Err(ValidationError::Missing("version"));
    }
    if version.len() > limits::MAX_VERSION_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_VERSION_LENGTH,
            actual: version.len(),
        });
    }
    let valid = version.starts_with(|c: char| c.is_ascii_digit())
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'));
    if !valid {
        return Err(ValidationError::DisallowedChars(
            "must be a release version such as 1.2.3",
        ));
    }
    Ok(version.to_string())
}
