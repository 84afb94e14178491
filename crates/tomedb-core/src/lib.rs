//! Core domain types shared across TomeDB crates.

pub mod error;
pub mod ids;

pub use error::{CoreError, CoreResult};
pub use ids::DocumentId;
