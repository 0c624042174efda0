//! Input validation utilities.

use regex::Regex;

use crate::types::{LedgerError, LedgerResult};

const MAX_EMAIL_LENGTH: usize = 255;

/// Trim, validate and lowercase an invitee address.
///
/// Stored addresses are always in this form, so uniqueness checks compare
/// them directly.
pub fn normalize_email(email: &str) -> LedgerResult<String> {
    let email = email.trim();

    let email_regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .map_err(|_| LedgerError::InvalidEmail("invalid email regex".to_string()))?;

    if email.len() > MAX_EMAIL_LENGTH || !email_regex.is_match(email) {
        return Err(LedgerError::InvalidEmail(email.to_string()));
    }

    Ok(email.to_lowercase())
}
