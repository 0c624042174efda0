//! Coalescing settings synchronization.

use std::sync::Arc;

use breakwise_auth::{SharedSession, UserId};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::repositories::{SettingsSource, SettingsStorage};

/// What a call to [`SyncDispatcher::request_sync`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// A new fetch-and-apply cycle began.
    Started,
    /// A cycle for the same user was already running; its result covers this request.
    Coalesced,
    /// A cycle for another user is running; a new one starts when it finishes.
    Queued,
    /// Nobody is signed in, so there is nothing to pull.
    NoSession,
}

/// How a finished cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied { updated_at: DateTime<Utc> },
    /// Local storage already held a newer snapshot for the same user.
    Stale,
    Failed(String),
}

/// Counters published by the background context after every sync transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub in_flight: bool,
    pub started: u64,
    pub coalesced: u64,
    pub queued: u64,
    pub skipped_no_session: u64,
    pub applied: u64,
    pub stale: u64,
    pub failed: u64,
}

impl SyncStats {
    pub fn completed(&self) -> u64 {
        self.applied + self.stale + self.failed
    }
}

/// Runs at most one settings sync at a time.
///
/// The in-flight flag is plain state: the owning background actor is the only
/// caller, and the spawned cycle reports back through `completions` rather
/// than touching the flag itself. A request for a different user than the
/// running cycle's is remembered and served by one follow-up cycle.
pub struct SyncDispatcher {
    source: Arc<dyn SettingsSource>,
    storage: Arc<dyn SettingsStorage>,
    completions: mpsc::UnboundedSender<SyncOutcome>,
    running_user: Option<UserId>,
    follow_up: bool,
    stats: SyncStats,
}

impl SyncDispatcher {
    pub fn new(
        source: Arc<dyn SettingsSource>,
        storage: Arc<dyn SettingsStorage>,
        completions: mpsc::UnboundedSender<SyncOutcome>,
    ) -> Self {
        Self {
            source,
            storage,
            completions,
            running_user: None,
            follow_up: false,
            stats: SyncStats::default(),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.stats.in_flight
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Start a cycle for `session` unless one is already running. Never waits for the cycle.
    pub fn request_sync(&mut self, session: Option<SharedSession>) -> SyncTrigger {
        if self.stats.in_flight {
            let other_user = match (&session, &self.running_user) {
                (Some(session), Some(running)) => session.user_id() != running.as_str(),
                _ => false,
            };
            if other_user {
                self.follow_up = true;
                self.stats.queued += 1;
                debug!("sync in flight for another user, follow-up queued");
                return SyncTrigger::Queued;
            }

            self.stats.coalesced += 1;
            debug!("sync already in flight, request coalesced");
            return SyncTrigger::Coalesced;
        }

        let Some(session) = session else {
            self.stats.skipped_no_session += 1;
            debug!("sync requested without a session, ignoring");
            return SyncTrigger::NoSession;
        };

        self.stats.in_flight = true;
        self.stats.started += 1;
        self.running_user = Some(session.user_id().to_string());
        info!(user_id = %session.user_id(), "settings sync started");

        let source = self.source.clone();
        let storage = self.storage.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let cycle =
                tokio::spawn(async move { run_cycle(source.as_ref(), storage.as_ref(), &session).await });
            let outcome = match cycle.await {
                Ok(outcome) => outcome,
                Err(join_error) => SyncOutcome::Failed(format!("sync cycle aborted: {join_error}")),
            };
            // The background context may already be gone; the cycle still ran to completion.
            let _ = completions.send(outcome);
        });

        SyncTrigger::Started
    }

    /// Record the end of the running cycle and clear the in-flight marker.
    ///
    /// When another user's request arrived meanwhile, a follow-up cycle starts
    /// for `current`, the session as it stands now.
    pub fn complete(&mut self, outcome: SyncOutcome, current: Option<SharedSession>) -> Option<SyncTrigger> {
        self.stats.in_flight = false;
        self.running_user = None;
        match outcome {
            SyncOutcome::Applied { updated_at } => {
                self.stats.applied += 1;
                info!(%updated_at, "settings sync applied");
            }
            SyncOutcome::Stale => {
                self.stats.stale += 1;
                debug!("remote settings older than local copy, kept local");
            }
            SyncOutcome::Failed(reason) => {
                self.stats.failed += 1;
                error!(%reason, "settings sync failed");
            }
        }

        if std::mem::take(&mut self.follow_up) {
            Some(self.request_sync(current))
        } else {
            None
        }
    }
}

async fn run_cycle(
    source: &dyn SettingsSource,
    storage: &dyn SettingsStorage,
    session: &SharedSession,
) -> SyncOutcome {
    let fetched = match source.fetch_settings(session).await {
        Ok(settings) => settings,
        Err(error) => return SyncOutcome::Failed(error.to_string()),
    };

    match storage.read().await {
        Ok(Some(stored)) if stored.is_newer_than(&fetched) => return SyncOutcome::Stale,
        Ok(_) => {}
        Err(error) => return SyncOutcome::Failed(error.to_string()),
    }

    match storage.write(&fetched).await {
        Ok(()) => SyncOutcome::Applied {
            updated_at: fetched.updated_at,
        },
        Err(error) => SyncOutcome::Failed(error.to_string()),
    }
}
