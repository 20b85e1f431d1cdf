//! # booktracker-entity
//!
//! Domain entity models for the Booktracker access-control backend. Every
//! struct in this crate represents a database row or a domain value object.
//! Row types derive `sqlx::FromRow` in addition to serde.

pub mod child;
pub mod invitation;
pub mod permission;
pub mod user;
