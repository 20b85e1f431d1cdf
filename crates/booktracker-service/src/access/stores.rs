//! Store handles consumed by the access service.

use std::sync::Arc;

use booktracker_database::store::{ChildStore, GrantStore, InvitationStore, UserDirectory};
use booktracker_database::{DatabasePool, MemoryStore};

/// The four stores the access service reads and writes.
#[derive(Debug, Clone)]
pub struct AccessStores {
    /// Grants and ownership.
    pub grants: Arc<dyn GrantStore>,
    /// Children.
    pub children: Arc<dyn ChildStore>,
    /// Registered accounts.
    pub users: Arc<dyn UserDirectory>,
    /// Pending invitations and the unit of work.
    pub invitations: Arc<dyn InvitationStore>,
}

impl AccessStores {
    /// PostgreSQL-backed stores sharing one pool.
    pub fn from_pool(pool: &DatabasePool) -> Self {
        Self {
            grants: Arc::new(pool.permissions()),
            children: Arc::new(pool.children()),
            users: Arc::new(pool.users()),
            invitations: Arc::new(pool.invitations()),
        }
    }

    /// Stores backed by one shared [`MemoryStore`].
    pub fn from_memory(store: &MemoryStore) -> Self {
        Self {
            grants: Arc::new(store.clone()),
            children: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            invitations: Arc::new(store.clone()),
        }
    }
}
