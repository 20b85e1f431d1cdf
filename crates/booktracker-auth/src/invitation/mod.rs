//! Deferred, token-addressed grants for emails without an account.

pub mod email;
pub mod ledger;
pub mod token;

pub use email::normalize_email;
pub use ledger::{INVITATION_TTL_DAYS, InvitationLedger, Registration};
pub use token::{generate_token, token_prefix};
