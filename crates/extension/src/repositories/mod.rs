//! Data access for settings, remote and local.

pub mod settings_repository;

pub use settings_repository::{
    FileSettingsStorage, InMemorySettingsSource, MemorySettingsStorage, SettingsSource,
    SettingsStorage,
};
