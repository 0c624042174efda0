//! Seams to the managed authentication backend.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::session::{AuthChange, Session, UserId};

/// Transport-level failure talking to the backend. Callers treat it as transient.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    UserExists,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no active session")]
    SessionNotFound,
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Session source for the background context.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Current session as known by the backend, `None` when signed out.
    async fn fetch_session(&self) -> Result<Option<Session>, BackendError>;

    /// Push channel for login, logout, refresh and profile events, in emission order.
    fn auth_events(&self) -> broadcast::Receiver<AuthChange>;
}

/// Account calls used when an invitation provisions a login.
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    /// Replace the password of the account registered for `email`.
    /// Fails with [`AuthError::UserNotFound`] when there is none.
    async fn reset_password(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    async fn delete_account(&self, user_id: &str) -> Result<(), AuthError>;
}
