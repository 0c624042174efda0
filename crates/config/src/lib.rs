use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "breakwise.toml",
    "config/breakwise.toml",
    "crates/config/breakwise.toml",
    "../breakwise.toml",
    "../config/breakwise.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub invitation: InvitationConfig,
    #[serde(default)]
    pub password: PasswordConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Settings for the long-lived background context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Capacity of the command mailbox shared by every UI surface.
    #[serde(default = "BackgroundConfig::default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl BackgroundConfig {
    const fn default_mailbox_capacity() -> usize {
        64
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: Self::default_mailbox_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    /// JSON file backing local settings. Settings stay in memory when unset.
    #[serde(default)]
    pub settings_path: Option<String>,
}

/// Invitation lifecycle tuning.
///
/// ```
/// use breakwise_config::InvitationConfig;
///
/// let invitation = InvitationConfig::default();
/// assert_eq!(invitation.expiry_days, 7);
/// assert_eq!(invitation.sweep_interval_seconds, 3_600);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationConfig {
    #[serde(default = "InvitationConfig::default_expiry_days")]
    pub expiry_days: u32,
    #[serde(default = "InvitationConfig::default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl InvitationConfig {
    const fn default_expiry_days() -> u32 {
        7
    }

    const fn default_sweep_interval() -> u64 {
        3_600
    }
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            expiry_days: Self::default_expiry_days(),
            sweep_interval_seconds: Self::default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    #[serde(default = "PasswordConfig::default_length")]
    pub length: usize,
    /// Upper bound on whole-string redraws before generation gives up.
    #[serde(default = "PasswordConfig::default_max_attempts")]
    pub max_attempts: u32,
}

impl PasswordConfig {
    const fn default_length() -> usize {
        12
    }

    const fn default_max_attempts() -> u32 {
        1_000
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            length: Self::default_length(),
            max_attempts: Self::default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://breakwise.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use breakwise_config::load;
///
/// std::env::remove_var("BREAKWISE_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(config.background.mailbox_capacity > 0);
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder();
    builder = builder
        .set_default(
            "background.mailbox_capacity",
            i64::try_from(defaults.background.mailbox_capacity).unwrap_or(i64::MAX),
        )?
        .set_default(
            "invitation.expiry_days",
            i64::from(defaults.invitation.expiry_days),
        )?
        .set_default(
            "invitation.sweep_interval_seconds",
            i64::try_from(defaults.invitation.sweep_interval_seconds).unwrap_or(i64::MAX),
        )?
        .set_default(
            "password.length",
            i64::try_from(defaults.password.length).unwrap_or(i64::MAX),
        )?
        .set_default(
            "password.max_attempts",
            i64::from(defaults.password.max_attempts),
        )?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?;

    let environment_overrides = config::Environment::with_prefix("BREAKWISE").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("BREAKWISE_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via BREAKWISE_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.background.mailbox_capacity == 0 {
        config.background.mailbox_capacity = BackgroundConfig::default_mailbox_capacity();
    }

    debug!(?config, "loaded breakwise configuration");
    Ok(config)
}
