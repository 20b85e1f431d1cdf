//! Authorization, sharing, and invitation use cases.

pub mod outcome;
pub mod service;
pub mod stores;

pub use outcome::InviteOutcome;
pub use service::AccessService;
pub use stores::AccessStores;
