//! Shared types for the background context and UI surfaces.

pub mod errors;
pub mod messages;

pub use errors::{ExtensionError, ExtensionResult};
pub use messages::ExtensionMessage;
