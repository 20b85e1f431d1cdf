//! # booktracker-core
//!
//! Core crate for the Booktracker access-control backend. Contains the
//! unified error system, configuration schemas, typed identifiers, and the
//! clock seam used for every expiry decision.
//!
//! This crate has **no** internal dependencies on other workspace crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
