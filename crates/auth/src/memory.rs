//! In-process stand-in for the managed authentication backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::backend::{AccountProvisioner, AuthBackend, AuthError, BackendError};
use crate::password::{hash_password, verify_password};
use crate::session::{AuthChange, AuthEvent, Session, SessionUser, SharedSession, UserId};

const EVENT_BUFFER: usize = 64;
const TOKEN_LENGTH: usize = 40;

struct Account {
    user_id: UserId,
    email: String,
    password_hash: String,
}

struct Inner {
    accounts: RwLock<HashMap<String, Account>>,
    current: RwLock<Option<SharedSession>>,
    events: broadcast::Sender<AuthChange>,
    reachable: AtomicBool,
    fetches: AtomicUsize,
    session_ttl: Duration,
}

/// Accounts, the signed-in session and the event push channel, all in memory.
#[derive(Clone)]
pub struct InMemoryAuthBackend {
    inner: Arc<Inner>,
}

impl Default for InMemoryAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self::with_session_ttl(Duration::hours(1))
    }

    pub fn with_session_ttl(session_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                accounts: RwLock::new(HashMap::new()),
                current: RwLock::new(None),
                events,
                reachable: AtomicBool::new(true),
                fetches: AtomicUsize::new(0),
                session_ttl,
            }),
        }
    }

    /// Simulate the backend going offline or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of `fetch_session` round trips served so far.
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SharedSession, AuthError> {
        let key = normalize(email);
        let user = {
            let accounts = self.inner.accounts.read().await;
            let account = accounts.get(&key).ok_or(AuthError::InvalidCredentials)?;
            if !verify_password(password, &account.password_hash)? {
                return Err(AuthError::InvalidCredentials);
            }
            SessionUser {
                id: account.user_id.clone(),
                email: Some(account.email.clone()),
            }
        };

        let session = Arc::new(self.issue_session(user));
        self.replace(AuthEvent::SignedIn, Some(session.clone())).await;
        info!(user_id = %session.user.id, "user signed in");
        Ok(session)
    }

    pub async fn sign_out(&self) {
        self.replace(AuthEvent::SignedOut, None).await;
        info!("user signed out");
    }

    /// Rotate the tokens of the current session.
    pub async fn refresh(&self) -> Result<SharedSession, AuthError> {
        let user = self
            .current_session()
            .await
            .map(|session| session.user.clone())
            .ok_or(AuthError::SessionNotFound)?;
        let session = Arc::new(self.issue_session(user));
        self.replace(AuthEvent::TokenRefreshed, Some(session.clone())).await;
        debug!(user_id = %session.user.id, "session refreshed");
        Ok(session)
    }

    /// Change the signed-in user's email, pushing `USER_UPDATED`.
    pub async fn update_email(&self, email: &str) -> Result<SharedSession, AuthError> {
        let current = self
            .current_session()
            .await
            .ok_or(AuthError::SessionNotFound)?;
        let mut next = (*current).clone();
        next.user.email = Some(email.to_string());
        let session = Arc::new(next);
        self.replace(AuthEvent::UserUpdated, Some(session.clone())).await;
        Ok(session)
    }

    /// Push an arbitrary change as if the backend emitted it.
    pub async fn push(&self, change: AuthChange) {
        self.replace(change.event, change.session).await;
    }

    pub async fn current_session(&self) -> Option<SharedSession> {
        self.inner.current.read().await.clone()
    }

    async fn replace(&self, event: AuthEvent, session: Option<SharedSession>) {
        *self.inner.current.write().await = session.clone();
        // No receivers is fine: nobody is listening yet.
        let _ = self.inner.events.send(AuthChange::new(event, session));
    }

    fn ensure_reachable(&self) -> Result<(), BackendError> {
        if self.inner.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unreachable("auth backend offline".into()))
        }
    }

    fn issue_session(&self, user: SessionUser) -> Session {
        Session {
            access_token: random_token(),
            refresh_token: random_token(),
            expires_at: Utc::now() + self.inner.session_ttl,
            user,
        }
    }
}

#[async_trait]
impl AuthBackend for InMemoryAuthBackend {
    async fn fetch_session(&self) -> Result<Option<Session>, BackendError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable("auth backend offline".into()));
        }
        Ok(self
            .current_session()
            .await
            .map(|session| (*session).clone()))
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthChange> {
        self.inner.events.subscribe()
    }
}

#[async_trait]
impl AccountProvisioner for InMemoryAuthBackend {
    async fn create_account(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        self.ensure_reachable()?;

        let key = normalize(email);
        let mut accounts = self.inner.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(AuthError::UserExists);
        }

        let user_id = cuid2::create_id();
        accounts.insert(
            key,
            Account {
                user_id: user_id.clone(),
                email: email.trim().to_string(),
                password_hash: hash_password(password)?,
            },
        );
        info!(%user_id, "account created");
        Ok(user_id)
    }

    async fn reset_password(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        self.ensure_reachable()?;

        let mut accounts = self.inner.accounts.write().await;
        let account = accounts
            .get_mut(&normalize(email))
            .ok_or(AuthError::UserNotFound)?;
        account.password_hash = hash_password(password)?;
        info!(user_id = %account.user_id, "account password reset");
        Ok(account.user_id.clone())
    }

    async fn delete_account(&self, user_id: &str) -> Result<(), AuthError> {
        self.ensure_reachable()?;

        let mut accounts = self.inner.accounts.write().await;
        let before = accounts.len();
        accounts.retain(|_, account| account.user_id != user_id);
        if accounts.len() == before {
            return Err(AuthError::UserNotFound);
        }
        info!(%user_id, "account deleted");
        Ok(())
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
