//! Shared types for the fitness client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
