//! # Breakwise Extension
//!
//! The extension side of Breakwise: a single long-lived background context
//! holding the canonical session, a dispatcher that keeps local settings in
//! step with the backend, and the bootstrap every popup or dashboard window
//! runs when it opens.
//!
//! ## Architecture
//!
//! - **Background**: actor owning [`SessionStore`] and [`SyncDispatcher`]
//! - **Services**: session store, sync dispatcher, surface controller
//! - **Repositories**: remote settings source and local settings storage
//! - **Entities / Types**: settings, messages, errors
//!
//! ## Usage
//!
//! ```rust,ignore
//! let context = BackgroundContext::start(&config.background, deps);
//! let popup = SurfaceController::open(context.handle(), SurfaceKind::Popup).await?;
//! ```

pub mod background;
pub mod entities;
pub mod repositories;
pub mod services;
pub mod types;

pub use background::{BackgroundContext, BackgroundDeps, BackgroundHandle, Subscription};
pub use entities::UserSettings;
pub use repositories::{
    FileSettingsStorage, InMemorySettingsSource, MemorySettingsStorage, SettingsSource,
    SettingsStorage,
};
pub use services::{
    SessionStore, SurfaceController, SurfaceHandle, SurfaceKind, SurfaceSnapshot, SurfaceState,
    SurfaceView, SyncDispatcher, SyncStats, SyncTrigger,
};
pub use types::{ExtensionError, ExtensionMessage, ExtensionResult};
