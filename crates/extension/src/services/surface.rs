//! Bootstrap logic for popup and dashboard windows.

use std::fmt;

use breakwise_auth::{AuthEvent, SharedSession, UserId};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::background::{BackgroundHandle, Subscription};
use crate::types::{ExtensionError, ExtensionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Popup,
    Dashboard,
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceKind::Popup => f.write_str("popup"),
            SurfaceKind::Dashboard => f.write_str("dashboard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceView {
    Dashboard,
    Exercise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Loading,
    /// Show the login affordance.
    Unauthenticated,
    Authenticated(SurfaceView),
}

impl SurfaceState {
    /// State after learning whether a session exists. A session always lands on the dashboard.
    pub fn with_session(has_session: bool) -> Self {
        if has_session {
            SurfaceState::Authenticated(SurfaceView::Dashboard)
        } else {
            SurfaceState::Unauthenticated
        }
    }

    /// Local navigation between dashboard and exercise. Only valid while authenticated.
    pub fn navigate(self, view: SurfaceView) -> ExtensionResult<Self> {
        match self {
            SurfaceState::Authenticated(_) => Ok(SurfaceState::Authenticated(view)),
            SurfaceState::Loading | SurfaceState::Unauthenticated => {
                Err(ExtensionError::NotAuthenticated)
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SurfaceState::Authenticated(_))
    }
}

/// What a surface currently renders and for whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    pub state: SurfaceState,
    pub user_id: Option<UserId>,
}

enum SurfaceInput {
    Auth {
        event: AuthEvent,
        session: Option<SharedSession>,
    },
    Navigate(SurfaceView, oneshot::Sender<ExtensionResult<SurfaceState>>),
    Close,
}

/// Drives one UI surface from open to close.
///
/// Each surface is its own task. Session callbacks only enqueue into the
/// surface's inbox, so the background context never waits on a surface.
pub struct SurfaceController {
    kind: SurfaceKind,
    background: BackgroundHandle,
    snapshot: watch::Sender<SurfaceSnapshot>,
}

impl SurfaceController {
    /// Open a surface: subscribe, read the session, and start reacting to changes.
    ///
    /// The subscription is taken before the first read so a change racing the
    /// mount is still delivered afterwards.
    pub async fn open(background: BackgroundHandle, kind: SurfaceKind) -> ExtensionResult<SurfaceHandle> {
        let (inputs, inbox) = mpsc::unbounded_channel();
        let (snapshot, snapshots) = watch::channel(SurfaceSnapshot {
            state: SurfaceState::Loading,
            user_id: None,
        });
        let (close_guard, closed) = oneshot::channel::<()>();

        let forward = inputs.clone();
        let subscription = background
            .subscribe(move |event, session| {
                let _ = forward.send(SurfaceInput::Auth { event, session });
            })
            .await?;

        let controller = SurfaceController {
            kind,
            background,
            snapshot,
        };
        let task = tokio::spawn(controller.run(subscription, inbox, closed));
        info!(surface = %kind, "surface opened");

        Ok(SurfaceHandle {
            kind,
            inputs,
            snapshots,
            _close_guard: close_guard,
            task: Some(task),
        })
    }

    async fn run(
        self,
        subscription: Subscription,
        mut inbox: mpsc::UnboundedReceiver<SurfaceInput>,
        mut closed: oneshot::Receiver<()>,
    ) {
        self.mount().await;

        loop {
            tokio::select! {
                _ = &mut closed => break,
                input = inbox.recv() => match input {
                    Some(SurfaceInput::Auth { event, session }) => self.on_auth_change(event, session).await,
                    Some(SurfaceInput::Navigate(view, reply)) => {
                        let _ = reply.send(self.navigate(view));
                    }
                    Some(SurfaceInput::Close) | None => break,
                },
            }
        }

        subscription.unsubscribe().await;
        info!(surface = %self.kind, "surface closed");
    }

    async fn mount(&self) {
        let session = self.background.get_session().await;
        self.apply_session(session.as_ref());
        if session.is_some() {
            self.background.request_sync().await;
        }
    }

    async fn on_auth_change(&self, event: AuthEvent, session: Option<SharedSession>) {
        debug!(surface = %self.kind, %event, "surface observed auth change");
        self.apply_session(session.as_ref());
        if session.is_some() {
            self.background.request_sync().await;
        }
    }

    fn apply_session(&self, session: Option<&SharedSession>) {
        self.snapshot.send_replace(SurfaceSnapshot {
            state: SurfaceState::with_session(session.is_some()),
            user_id: session.map(|session| session.user_id().to_string()),
        });
    }

    fn navigate(&self, view: SurfaceView) -> ExtensionResult<SurfaceState> {
        let current = self.snapshot.borrow().state;
        let next = current.navigate(view)?;
        self.snapshot.send_modify(|snapshot| snapshot.state = next);
        Ok(next)
    }
}

/// Owner side of an open surface. Dropping it closes the surface.
pub struct SurfaceHandle {
    kind: SurfaceKind,
    inputs: mpsc::UnboundedSender<SurfaceInput>,
    snapshots: watch::Receiver<SurfaceSnapshot>,
    _close_guard: oneshot::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl SurfaceHandle {
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn state(&self) -> SurfaceState {
        self.snapshots.borrow().state
    }

    pub fn watch(&self) -> watch::Receiver<SurfaceSnapshot> {
        self.snapshots.clone()
    }

    pub async fn show_exercise(&self) -> ExtensionResult<SurfaceState> {
        self.navigate(SurfaceView::Exercise).await
    }

    pub async fn show_dashboard(&self) -> ExtensionResult<SurfaceState> {
        self.navigate(SurfaceView::Dashboard).await
    }

    async fn navigate(&self, view: SurfaceView) -> ExtensionResult<SurfaceState> {
        let (reply, response) = oneshot::channel();
        self.inputs
            .send(SurfaceInput::Navigate(view, reply))
            .map_err(|_| ExtensionError::SurfaceClosed)?;
        response.await.map_err(|_| ExtensionError::SurfaceClosed)?
    }

    /// Close the surface and wait until its subscription is released.
    pub async fn close(mut self) {
        let _ = self.inputs.send(SurfaceInput::Close);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
