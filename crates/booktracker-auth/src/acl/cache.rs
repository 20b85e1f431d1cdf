//! Per-request permission decision cache.
//!
//! One [`ScopedPermissionCache`] is built for each inbound operation and
//! dropped when it ends. Entries are keyed by the full
//! `(principal, child, level)` triple and expire after a TTL. Only successful
//! decisions are stored; resolver errors pass straight through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use booktracker_core::traits::Clock;
use booktracker_core::types::{ChildId, UserId};
use booktracker_entity::permission::PermissionLevel;

use crate::error::{AccessError, AccessResult};

use super::resolver::PermissionResolver;

/// Cache key. Always principal-qualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The principal being checked.
    pub user_id: UserId,
    /// The child being accessed.
    pub child_id: ChildId,
    /// The requested level.
    pub level: PermissionLevel,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    allowed: bool,
    expires_at: DateTime<Utc>,
}

/// Memoizes resolver decisions for the lifetime of one request.
#[derive(Debug)]
pub struct ScopedPermissionCache {
    /// Resolver consulted on a miss.
    resolver: PermissionResolver,
    /// Decisions keyed by `(principal, child, level)`.
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    /// Maximum age of an entry.
    ttl: chrono::Duration,
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
}

impl ScopedPermissionCache {
    /// Default entry lifetime.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    /// Creates an empty cache in front of `resolver`.
    pub fn new(resolver: PermissionResolver, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| {
            chrono::Duration::seconds(Self::DEFAULT_TTL.as_secs() as i64)
        });
        Self {
            resolver,
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Returns the cached decision, resolving and storing it on a miss.
    pub async fn get_or_check(
        &self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AccessResult<bool> {
        let key = CacheKey {
            user_id,
            child_id,
            level,
        };

        let cached = self.entries.read().await.get(&key).copied();
        if let Some(entry) = cached {
            if entry.expires_at > self.clock.now() {
                debug!(user_id = %user_id, child_id = %child_id, level = %level, "Permission cache hit");
                return Ok(entry.allowed);
            }
        }

        debug!(user_id = %user_id, child_id = %child_id, level = %level, "Permission cache miss");
        let allowed = self.resolver.check(user_id, child_id, level).await?;

        let expires_at = self.clock.now() + self.ttl;
        self.entries
            .write()
            .await
            .insert(key, CacheEntry { allowed, expires_at });

        Ok(allowed)
    }

    /// Like [`get_or_check`](Self::get_or_check) but turns a deny into `Forbidden`.
    pub async fn require(
        &self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AccessResult<()> {
        if self.get_or_check(user_id, child_id, level).await? {
            Ok(())
        } else {
            Err(AccessError::Forbidden)
        }
    }

    /// Drops every entry for `child_id`, for any principal or level.
    pub async fn invalidate_child(&self, child_id: ChildId) {
        self.entries
            .write()
            .await
            .retain(|key, _| key.child_id != child_id);
    }

    /// Empties the cache.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Whether a live entry exists for `key`.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| entry.expires_at > now)
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
