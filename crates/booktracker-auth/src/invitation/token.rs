//! Invitation token generation.

use rand::RngCore;

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 32;

/// Generates a cryptographically secure, hex-encoded invitation token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// The first eight characters of a token, safe to log.
pub fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
