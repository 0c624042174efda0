//! # Breakwise Organization
//!
//! Companies, their employees, and the invitation lifecycle that takes an
//! employee from `invited` to `active`. An invite also provisions an account
//! with a generated temporary password and emails it to the invitee.
//!
//! Stored status is one of `invited`, `active` or `disabled`. Disabled rows
//! keep the reason they were closed, and [`InvitationStatus`] is derived from
//! both.

pub mod database;
pub mod entities;
pub mod repositories;
pub mod services;
pub mod types;
pub mod utils;

pub use entities::{
    Company, CompanyId, DisableReason, Employee, EmployeeId, EmployeeStatus, InvitationStatus,
    Invitee,
};
pub use repositories::{
    CompanyRepository, EmployeeRepository, InMemoryEmployeeRepository, SqliteEmployeeRepository,
};
pub use services::{
    InvitationEmail, InvitationLedger, InvitationMailer, InvitationService, InvitationSweeper,
    LogMailer, MemoryMailer, ProvisionedInvite,
};
pub use types::{InvitationError, InvitationResult, LedgerError, LedgerResult, MailerError};
