//! Services running inside the background context and the UI surfaces.

pub mod session_store;
pub mod surface;
pub mod sync_dispatcher;

pub use session_store::{SessionCallback, SessionStore, SessionUpdate, SubscriptionId};
pub use surface::{SurfaceController, SurfaceHandle, SurfaceKind, SurfaceSnapshot, SurfaceState, SurfaceView};
pub use sync_dispatcher::{SyncDispatcher, SyncOutcome, SyncStats, SyncTrigger};
