//! The long-lived background context and the handle UI surfaces talk to it through.
//!
//! The context is a single task that owns the [`SessionStore`] and the
//! [`SyncDispatcher`]. Surfaces never share memory with it: every read is a
//! round trip over the command mailbox and every notification is a callback
//! run on the context's own turn. Work is handled one item at a time:
//! sync completions first, then backend pushes, then surface commands.

use std::sync::Arc;

use breakwise_auth::{AuthBackend, AuthChange, AuthEvent, SharedSession};
use breakwise_config::BackgroundConfig;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entities::UserSettings;
use crate::repositories::{SettingsSource, SettingsStorage};
use crate::services::session_store::{SessionCallback, SessionStore, SessionUpdate, SubscriptionId};
use crate::services::sync_dispatcher::{SyncDispatcher, SyncOutcome, SyncStats};
use crate::types::{ExtensionError, ExtensionMessage, ExtensionResult};

enum Command {
    GetSession(oneshot::Sender<Option<SharedSession>>),
    Subscribe(SessionCallback, oneshot::Sender<SubscriptionId>),
    Unsubscribe(SubscriptionId),
    SubscriberCount(oneshot::Sender<usize>),
    Message(ExtensionMessage),
    Shutdown,
}

/// Collaborators the background context is started with.
pub struct BackgroundDeps {
    pub auth: Arc<dyn AuthBackend>,
    pub settings_source: Arc<dyn SettingsSource>,
    pub settings_storage: Arc<dyn SettingsStorage>,
}

/// A running background context.
pub struct BackgroundContext {
    handle: BackgroundHandle,
    task: JoinHandle<()>,
}

impl BackgroundContext {
    /// Spawn the context on the current runtime. Call once at startup.
    pub fn start(config: &BackgroundConfig, deps: BackgroundDeps) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(SyncStats::default());

        // Subscribe before spawning so no push emitted after `start` returns is missed.
        let events = deps.auth.auth_events();
        let actor = BackgroundActor {
            store: SessionStore::new(deps.auth),
            dispatcher: SyncDispatcher::new(
                deps.settings_source,
                deps.settings_storage.clone(),
                completions_tx,
            ),
            stats: stats_tx,
        };

        let task = tokio::spawn(actor.run(events, commands_rx, completions_rx));
        info!(mailbox_capacity = config.mailbox_capacity, "background context started");

        Self {
            handle: BackgroundHandle {
                commands: commands_tx,
                stats: stats_rx,
                storage: deps.settings_storage,
            },
            task,
        }
    }

    pub fn handle(&self) -> BackgroundHandle {
        self.handle.clone()
    }

    /// Stop the context and wait for it to exit. Only tests and process exit do this.
    pub async fn shutdown(self) {
        let _ = self.handle.commands.send(Command::Shutdown).await;
        if let Err(error) = self.task.await {
            warn!(%error, "background context ended abnormally");
        }
    }
}

/// Cloneable mailbox address of the background context.
#[derive(Clone)]
pub struct BackgroundHandle {
    commands: mpsc::Sender<Command>,
    stats: watch::Receiver<SyncStats>,
    storage: Arc<dyn SettingsStorage>,
}

impl BackgroundHandle {
    /// Current session, or `None` when signed out, offline, or the context has stopped.
    pub async fn get_session(&self) -> Option<SharedSession> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::GetSession(reply)).await.is_err() {
            warn!("background context unavailable, reporting no session");
            return None;
        }
        response.await.unwrap_or(None)
    }

    /// Register `callback` for every auth change until the returned guard is released.
    pub async fn subscribe<F>(&self, callback: F) -> ExtensionResult<Subscription>
    where
        F: Fn(AuthEvent, Option<SharedSession>) + Send + Sync + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Subscribe(Arc::new(callback), reply))
            .await
            .map_err(|_| ExtensionError::BackgroundStopped)?;
        let id = response
            .await
            .map_err(|_| ExtensionError::BackgroundStopped)?;

        Ok(Subscription {
            id,
            commands: self.commands.clone(),
            released: false,
        })
    }

    /// Post a message without waiting for it to be handled.
    pub async fn post(&self, message: ExtensionMessage) {
        if self.commands.send(Command::Message(message)).await.is_err() {
            debug!(?message, "background context gone, message dropped");
        }
    }

    /// Ask for a settings sync. Duplicates are coalesced by the context.
    pub async fn request_sync(&self) {
        self.post(ExtensionMessage::SyncSettings).await;
    }

    pub async fn subscriber_count(&self) -> ExtensionResult<usize> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SubscriberCount(reply))
            .await
            .map_err(|_| ExtensionError::BackgroundStopped)?;
        response.await.map_err(|_| ExtensionError::BackgroundStopped)
    }

    /// Read-only view of local settings.
    pub async fn local_settings(&self) -> ExtensionResult<Option<UserSettings>> {
        self.storage.read().await
    }

    pub fn sync_stats(&self) -> SyncStats {
        *self.stats.borrow()
    }

    /// Watch channel updated after every sync transition.
    pub fn watch_sync(&self) -> watch::Receiver<SyncStats> {
        self.stats.clone()
    }
}

/// Live session subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    commands: mpsc::Sender<Command>,
    released: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn unsubscribe(mut self) {
        self.released = true;
        let _ = self.commands.send(Command::Unsubscribe(self.id)).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match self.commands.try_send(Command::Unsubscribe(self.id)) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                // Mailbox is busy; hand the release to the runtime instead of losing it.
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let commands = self.commands.clone();
                    runtime.spawn(async move {
                        let _ = commands.send(command).await;
                    });
                } else {
                    warn!(subscription = %self.id, "could not release subscription");
                }
            }
        }
    }
}

struct BackgroundActor {
    store: SessionStore,
    dispatcher: SyncDispatcher,
    stats: watch::Sender<SyncStats>,
}

impl BackgroundActor {
    async fn run(
        mut self,
        mut events: broadcast::Receiver<AuthChange>,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<SyncOutcome>,
    ) {
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                Some(outcome) = completions.recv() => {
                    let current = self.store.current();
                    if let Some(trigger) = self.dispatcher.complete(outcome, current) {
                        debug!(?trigger, "follow-up settings sync requested");
                    }
                    self.publish_stats();
                }

                change = events.recv(), if events_open => match change {
                    Ok(change) => self.on_auth_change(change),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "auth events lagged, refetching session");
                        self.store.invalidate();
                        let update = self.store.get_session().await;
                        self.on_session_update(update);
                    }
                    Err(RecvError::Closed) => {
                        warn!("auth event stream closed, continuing with cached session");
                        events_open = false;
                    }
                },

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
            }
        }

        info!("background context stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::GetSession(reply) => {
                let update = self.store.get_session().await;
                let session = update.session.clone();
                self.on_session_update(update);
                let _ = reply.send(session);
            }
            Command::Subscribe(callback, reply) => {
                let id = self.store.subscribe(callback);
                if reply.send(id).is_err() {
                    // Caller went away before receiving its id.
                    self.store.unsubscribe(id);
                }
            }
            Command::Unsubscribe(id) => {
                self.store.unsubscribe(id);
            }
            Command::SubscriberCount(reply) => {
                let _ = reply.send(self.store.subscriber_count());
            }
            Command::Message(ExtensionMessage::SyncSettings) => {
                self.dispatcher.request_sync(self.store.current());
                self.publish_stats();
            }
            Command::Shutdown => {}
        }
    }

    fn on_auth_change(&mut self, change: AuthChange) {
        let update = self.store.apply(change);
        self.on_session_update(update);
    }

    fn on_session_update(&mut self, update: SessionUpdate) {
        if update.entered {
            self.dispatcher.request_sync(update.session);
            self.publish_stats();
        }
    }

    fn publish_stats(&self) {
        self.stats.send_replace(self.dispatcher.stats());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{InMemorySettingsSource, MemorySettingsStorage};
    use breakwise_auth::{AccountProvisioner, InMemoryAuthBackend};
    use std::time::Duration;
    use tokio::time::timeout;

    struct Fixture {
        auth: InMemoryAuthBackend,
        source: InMemorySettingsSource,
        context: BackgroundContext,
    }

    async fn fixture() -> Fixture {
        let auth = InMemoryAuthBackend::new();
        auth.create_account("a@x.com", "Secret1!").await.unwrap();
        let source = InMemorySettingsSource::new();
        let context = BackgroundContext::start(
            &BackgroundConfig::default(),
            BackgroundDeps {
                auth: Arc::new(auth.clone()),
                settings_source: Arc::new(source.clone()),
                settings_storage: Arc::new(MemorySettingsStorage::new()),
            },
        );
        Fixture {
            auth,
            source,
            context,
        }
    }

    async fn wait_for_completed(handle: &BackgroundHandle, count: u64) -> SyncStats {
        let mut stats = handle.watch_sync();
        let reached = timeout(Duration::from_secs(5), stats.wait_for(|s| s.completed() >= count))
            .await
            .expect("sync did not complete in time")
            .expect("background context stopped");
        *reached
    }

    #[tokio::test]
    async fn sign_in_push_triggers_one_sync() {
        let fx = fixture().await;
        let handle = fx.context.handle();
        let _sub = handle.subscribe(|_, _| {}).await.unwrap();
        let _other = handle.subscribe(|_, _| {}).await.unwrap();

        fx.auth.sign_in("a@x.com", "Secret1!").await.unwrap();
        let stats = wait_for_completed(&handle, 1).await;

        assert_eq!(stats.started, 1);
        assert_eq!(stats.applied, 1);
        assert_eq!(fx.source.fetch_count(), 1);
        assert!(handle.local_settings().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dropped_subscription_is_released() {
        let fx = fixture().await;
        let handle = fx.context.handle();

        let sub = handle.subscribe(|_, _| {}).await.unwrap();
        assert_eq!(handle.subscriber_count().await.unwrap(), 1);
        drop(sub);

        assert_eq!(handle.subscriber_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stopped_context_reports_no_session() {
        let fx = fixture().await;
        let handle = fx.context.handle();
        fx.context.shutdown().await;

        assert!(handle.get_session().await.is_none());
        assert!(matches!(
            handle.subscribe(|_, _| {}).await,
            Err(ExtensionError::BackgroundStopped)
        ));
    }
}
