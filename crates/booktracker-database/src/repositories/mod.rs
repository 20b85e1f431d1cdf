//! PostgreSQL implementations of the storage traits.

pub mod child;
pub mod invitation;
pub mod permission;
pub mod user;

pub use child::ChildRepository;
pub use invitation::{InvitationRepository, PgLedgerTransaction};
pub use permission::PermissionRepository;
pub use user::UserRepository;
