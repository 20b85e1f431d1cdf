//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use booktracker_core::config::AccessConfig;
use booktracker_core::traits::ManualClock;
use booktracker_database::MemoryStore;
use booktracker_database::store::{ChildStore, UserDirectory};
use booktracker_entity::child::{Child, NewChild};
use booktracker_entity::user::{NewUser, User};
use booktracker_service::{AccessService, AccessStores};

/// Test application context over an in-memory store.
pub struct TestApp {
    /// The service under test.
    pub service: AccessService,
    /// Direct handle on the store for setup and inspection.
    pub store: MemoryStore,
    /// Clock shared by the store and the service.
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    /// Create a new test application with default access settings.
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let store = MemoryStore::with_clock(clock.clone());
        let service = AccessService::new(
            AccessStores::from_memory(&store),
            &AccessConfig::default(),
            clock.clone(),
        );
        Self {
            service,
            store,
            clock,
        }
    }

    /// Register a user directly, bypassing invitations.
    pub async fn create_test_user(&self, email: &str) -> User {
        self.store
            .create_user(&new_user(email))
            .await
            .expect("Failed to create test user")
    }

    /// Create a child owned by `owner`.
    pub async fn create_child(&self, owner: &User, name: &str) -> Child {
        self.store
            .create_child(&NewChild {
                owner_id: owner.id,
                name: name.to_string(),
                grade: "3".to_string(),
            })
            .await
            .expect("Failed to create test child")
    }
}

/// Registration payload for `email`.
pub fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        first_name: "Test".to_string(),
        last_name: "Reader".to_string(),
        password_hash: "$argon2id$test".to_string(),
    }
}
