//! Domain entities held by the extension.

pub mod settings;

pub use settings::UserSettings;
