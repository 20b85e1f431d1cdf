//! Invitation domain entities.

pub mod model;

pub use model::{ChildPermission, NewPendingInvitation, PendingInvitation};
