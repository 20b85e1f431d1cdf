//! Result of an invite request.

use serde::Serialize;

use booktracker_entity::invitation::PendingInvitation;
use booktracker_entity::permission::Permission;

/// What an invite did.
///
/// Registered emails receive grants immediately; unregistered ones receive
/// pending invitations under a token.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InviteOutcome {
    /// The email belongs to an account; grants were applied directly.
    Granted {
        /// The applied grants, one per child.
        grants: Vec<Permission>,
    },
    /// The email has no account; pending invitations were recorded.
    Invited {
        /// Token to deliver to the invitee.
        token: String,
        /// The pending rows under `token`.
        invitations: Vec<PendingInvitation>,
    },
}

impl InviteOutcome {
    /// The invitation token, if pending rows were created.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Granted { .. } => None,
            Self::Invited { token, .. } => Some(token),
        }
    }

    /// Number of children covered.
    pub fn len(&self) -> usize {
        match self {
            Self::Granted { grants } => grants.len(),
            Self::Invited { invitations, .. } => invitations.len(),
        }
    }

    /// Whether no child is covered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
