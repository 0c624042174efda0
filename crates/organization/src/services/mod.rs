pub mod invitation_service;
pub mod ledger;
pub mod mailer;
pub mod sweeper;

pub use invitation_service::{InvitationService, ProvisionedInvite};
pub use ledger::InvitationLedger;
pub use mailer::{InvitationEmail, InvitationMailer, LogMailer, MemoryMailer};
pub use sweeper::InvitationSweeper;
