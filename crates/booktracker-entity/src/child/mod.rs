//! Child (protected resource) entities.

pub mod model;

pub use model::{Child, NewChild};
