//! Error types for the invitation lifecycle.

use breakwise_auth::{AuthError, PasswordError};
use thiserror::Error;

use crate::entities::EmployeeStatus;

/// Failures of ledger operations and the stores behind them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{email} already has an open invitation or membership in this company")]
    DuplicateInvite { email: String },

    #[error("cannot {action} an employee that is {from}")]
    InvalidTransition {
        from: EmployeeStatus,
        action: &'static str,
    },

    #[error("Employee {0} not found")]
    NotFound(String),

    #[error("Company {0} not found")]
    CompanyNotFound(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Failures delivering the invitation email.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailerError {
    #[error("Email provider rejected the message: {0}")]
    Rejected(String),

    #[error("Email provider unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the composed invite-and-provision flow.
#[derive(Debug, Error)]
pub enum InvitationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Password generation failed: {0}")]
    Password(#[from] PasswordError),

    #[error("Account creation failed: {0}")]
    Account(#[from] AuthError),

    #[error("Invitation email failed: {0}")]
    Mailer(#[from] MailerError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
pub type InvitationResult<T> = Result<T, InvitationError>;

const LIVE_EMAIL_INDEX: &str = "idx_employees_live_email";

/// True when `err` is the live-email uniqueness index rejecting a row.
pub fn is_duplicate_invite(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            message.contains("UNIQUE constraint failed") && message.contains(LIVE_EMAIL_INDEX)
        }
        _ => false,
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => LedgerError::NotFound("row".to_string()),
            sqlx::Error::Database(db_err) => LedgerError::Storage(db_err.message().to_string()),
            _ => LedgerError::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let duplicate = LedgerError::DuplicateInvite {
            email: "a@x.com".into(),
        };
        assert_eq!(
            duplicate.to_string(),
            "a@x.com already has an open invitation or membership in this company"
        );

        let transition = LedgerError::InvalidTransition {
            from: EmployeeStatus::Active,
            action: "accept",
        };
        assert_eq!(transition.to_string(), "cannot accept an employee that is active");

        let wrapped = InvitationError::from(LedgerError::NotFound("emp-1".into()));
        assert_eq!(wrapped.to_string(), "Employee emp-1 not found");
    }

    #[test]
    fn test_non_database_errors_become_storage() {
        let err = LedgerError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, LedgerError::Storage(_)));
        assert!(!is_duplicate_invite(&sqlx::Error::PoolTimedOut));
    }
}
