//! Email normalization.

use validator::ValidateEmail;

use crate::error::{AccessError, AccessResult};

/// Trims and lower-cases `raw`, rejecting anything that is not an address.
pub fn normalize_email(raw: &str) -> AccessResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || !email.validate_email() {
        return Err(AccessError::InvalidEmail {
            email: raw.to_string(),
        });
    }
    Ok(email)
}
