//! Canonical session for the background context.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use breakwise_auth::{AuthBackend, AuthChange, AuthEvent, SharedSession};
use chrono::Utc;
use tracing::{debug, info, warn};

/// Invoked with every backend push. Runs on the background context's turn and must not block.
pub type SessionCallback = Arc<dyn Fn(AuthEvent, Option<SharedSession>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

enum CachedSession {
    Unknown,
    Known(Option<SharedSession>),
}

/// Result of reading or replacing the cached session.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub session: Option<SharedSession>,
    /// The store moved from no session (or a different user) to a session.
    pub entered: bool,
}

/// Holds the current session and fans backend pushes out to subscribers.
///
/// Owned by the background actor; every method runs on its sequential turn,
/// so the cached value is always replaced as a whole.
pub struct SessionStore {
    backend: Arc<dyn AuthBackend>,
    cached: CachedSession,
    subscribers: BTreeMap<SubscriptionId, SessionCallback>,
    next_id: u64,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            backend,
            cached: CachedSession::Unknown,
            subscribers: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Cached session without touching the backend.
    pub fn current(&self) -> Option<SharedSession> {
        match &self.cached {
            CachedSession::Known(session) => session.clone(),
            CachedSession::Unknown => None,
        }
    }

    /// Return the cached session, fetching it once from the backend when unknown or expired.
    ///
    /// A backend failure reads as "no session" and is not cached, so the next
    /// call tries again.
    pub async fn get_session(&mut self) -> SessionUpdate {
        if let CachedSession::Known(session) = &self.cached {
            let fresh = session
                .as_ref()
                .map_or(true, |session| !session.is_expired_at(Utc::now()));
            if fresh {
                return SessionUpdate {
                    session: session.clone(),
                    entered: false,
                };
            }
            debug!("cached session expired, refetching");
        }

        match self.backend.fetch_session().await {
            Ok(session) => {
                let session = session.map(Arc::new);
                let entered = self.replace(session.clone());
                SessionUpdate { session, entered }
            }
            Err(error) => {
                warn!(%error, "session fetch failed, treating as signed out");
                SessionUpdate {
                    session: None,
                    entered: false,
                }
            }
        }
    }

    /// Apply a backend push and notify every subscriber.
    pub fn apply(&mut self, change: AuthChange) -> SessionUpdate {
        let entered = self.replace(change.session.clone());
        info!(
            event = %change.event,
            signed_in = change.session.is_some(),
            subscribers = self.subscribers.len(),
            "auth state changed"
        );

        for callback in self.subscribers.values() {
            callback(change.event, change.session.clone());
        }

        SessionUpdate {
            session: change.session,
            entered,
        }
    }

    /// Forget the cached value so the next read goes to the backend.
    pub fn invalidate(&mut self) {
        self.cached = CachedSession::Unknown;
    }

    pub fn subscribe(&mut self, callback: SessionCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.insert(id, callback);
        debug!(subscription = %id, "session subscriber added");
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(subscription = %id, "session subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn replace(&mut self, next: Option<SharedSession>) -> bool {
        let previous_user = self
            .current()
            .map(|session| session.user_id().to_string());
        let entered = match (&previous_user, &next) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(previous), Some(session)) => previous != session.user_id(),
        };
        self.cached = CachedSession::Known(next);
        entered
    }
}
