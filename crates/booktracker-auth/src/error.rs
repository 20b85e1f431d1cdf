//! Error taxonomy for access-control decisions and the invitation ledger.
//!
//! Decision errors (`ResourceNotFound`, `Forbidden`) are kept distinct from
//! storage failures so that callers can tell "denied" from "could not
//! determine". Every variant maps to `booktracker_core::error::AppError`.

use booktracker_core::error::{AppError, ErrorKind};
use booktracker_core::types::ChildId;
use thiserror::Error;

/// Result alias for access-control operations.
pub type AccessResult<T> = Result<T, AccessError>;

/// Errors raised by the resolver, the cache, and the invitation ledger.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The child does not exist.
    #[error("Child {child_id} not found")]
    ResourceNotFound {
        /// The child that was looked up.
        child_id: ChildId,
    },

    /// The principal lacks the required level. Deliberately carries no rule detail.
    #[error("You do not have permission to perform this action")]
    Forbidden,

    /// The token is unknown or every row under it has expired.
    #[error("Invitation not found or expired")]
    InvitationNotFoundOrExpired,

    /// A pending row's email differs from the redeeming email.
    #[error("Invitation email does not match the redeeming account")]
    EmailMismatch,

    /// The email already belongs to a registered account.
    #[error("An account already exists for {email}")]
    PrincipalAlreadyExists {
        /// The normalized email.
        email: String,
    },

    /// No account is registered for the redeeming email.
    #[error("No account is registered for {email}")]
    PrincipalNotFound {
        /// The normalized email.
        email: String,
    },

    /// A bulk invitation named no children.
    #[error("A bulk invitation must name at least one child")]
    EmptyBulkInvitation,

    /// The email is not a syntactically valid address.
    #[error("Invalid email address: '{email}'")]
    InvalidEmail {
        /// The email as supplied.
        email: String,
    },

    /// A grant was requested for the child's own owner.
    #[error("The owner of a child already holds every permission on it")]
    OwnerGrant,

    /// The underlying store failed.
    #[error(transparent)]
    Storage(#[from] AppError),
}

impl AccessError {
    /// The application error category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceNotFound { .. }
            | Self::InvitationNotFoundOrExpired
            | Self::PrincipalNotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::PrincipalAlreadyExists { .. } => ErrorKind::Conflict,
            Self::EmptyBulkInvitation | Self::InvalidEmail { .. } | Self::OwnerGrant => {
                ErrorKind::Validation
            }
            // A data-integrity bug, not a user error.
            Self::EmailMismatch => ErrorKind::Internal,
            Self::Storage(err) => err.kind,
        }
    }

    /// Whether the error means the decision could not be made.
    pub fn is_infrastructure(&self) -> bool {
        self.kind().is_infrastructure()
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Storage(inner) => inner,
            other => AppError::new(other.kind(), other.to_string()),
        }
    }
}
