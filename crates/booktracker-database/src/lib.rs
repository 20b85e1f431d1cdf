//! # booktracker-database
//!
//! Storage traits for grants, children, users, and pending invitations,
//! with a PostgreSQL implementation and an in-memory one.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use store::{ChildStore, GrantStore, InvitationStore, LedgerTransaction, UserDirectory};
