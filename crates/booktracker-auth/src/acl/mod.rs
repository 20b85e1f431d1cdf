//! Permission resolution with a per-request decision cache.

pub mod cache;
pub mod resolver;

pub use cache::{CacheKey, ScopedPermissionCache};
pub use resolver::{DecisionSource, PermissionResolver, Resolution};
