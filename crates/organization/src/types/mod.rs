//! Shared types for the organization crate.

pub mod errors;

pub use errors::{
    is_duplicate_invite, InvitationError, InvitationResult, LedgerError, LedgerResult, MailerError,
};
