//! Shared types for the back-office workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
