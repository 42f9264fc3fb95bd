// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identifier validation.
//!
//! Student, workout and completion ids are opaque strings owned by other
//! services. They end up inside document keys, so we reject anything the
//! document store cannot address.

use crate::error::AppError;

/// Maximum identifier length in characters.
pub const MAX_ID_LEN: usize = 128;

/// Reason an identifier was rejected, or `None` if it is acceptable.
fn identifier_problem(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        return Some("must not be empty");
    }
    if value.chars().count() > MAX_ID_LEN {
        return Some("is too long");
    }
    // Firestore reserves `__.*__` document ids. Completion keys join two ids,
    // so a leading or trailing `__` on either one can produce such a key.
    if value == "." || value == ".." || value.starts_with("__") || value.ends_with("__") {
        return Some("is reserved");
    }
    if value.contains('/') || value.chars().any(char::is_control) {
        return Some("contains invalid characters");
    }
    None
}

/// Validate an identifier, naming the offending field in the error.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), AppError> {
    match identifier_problem(value) {
        Some(problem) => Err(AppError::Validation(format!("{field} {problem}"))),
        None => Ok(()),
    }
}

/// `validator` adapter for request DTOs.
pub fn check_identifier(value: &str) -> Result<(), validator::ValidationError> {
    match identifier_problem(value) {
        Some(problem) => {
            let mut err = validator::ValidationError::new("identifier");
            err.message = Some(problem.into());
            Err(err)
        }
        None => Ok(()),
    }
}
