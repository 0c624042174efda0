//! Session values pushed by the authentication backend.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = String;

/// Sessions are shared immutably; a refresh produces a new value.
pub type SharedSession = Arc<Session>;

/// Token bundle plus the identity it authenticates.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub email: Option<String>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Kinds of change the backend pushes to the background context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated => "USER_UPDATED",
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One backend push: the event and the session that replaces the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<SharedSession>,
}

impl AuthChange {
    pub fn new(event: AuthEvent, session: Option<SharedSession>) -> Self {
        Self { event, session }
    }

    pub fn signed_in(session: SharedSession) -> Self {
        Self::new(AuthEvent::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(AuthEvent::SignedOut, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> Session {
        Session {
            access_token: "access-secret".into(),
            refresh_token: "refresh-secret".into(),
            expires_at: Utc::now() + Duration::hours(1),
            user: SessionUser {
                id: "user-1".into(),
                email: Some("a@x.com".into()),
            },
        }
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", session());
        assert!(!rendered.contains("access-secret"));
        assert!(!rendered.contains("refresh-secret"));
        assert!(rendered.contains("user-1"));
    }

    #[test]
    fn auth_events_serialize_as_backend_names() {
        let json = serde_json::to_string(&AuthEvent::TokenRefreshed).unwrap();
        assert_eq!(json, "\"TOKEN_REFRESHED\"");
        assert_eq!(AuthEvent::SignedOut.to_string(), "SIGNED_OUT");
    }

    #[test]
    fn expiry_is_inclusive() {
        let session = session();
        assert!(!session.is_expired_at(session.expires_at - Duration::seconds(1)));
        assert!(session.is_expired_at(session.expires_at));
    }
}
