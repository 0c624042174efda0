use std::sync::Arc;

use anyhow::{Context, Result};
use breakwise_auth::{AccountProvisioner, AuthBackend, PasswordProvisioner};
use breakwise_config::AppConfig;
use breakwise_extension::{
    BackgroundContext, BackgroundDeps, FileSettingsStorage, MemorySettingsStorage, SettingsSource,
    SettingsStorage,
};
use breakwise_organization::database::initialize_database;
use breakwise_organization::{
    InvitationLedger, InvitationMailer, InvitationService, InvitationSweeper,
    SqliteEmployeeRepository,
};
use sqlx::SqlitePool;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Install the global subscriber. `RUST_LOG` overrides the `info` default.
    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Organization-side services sharing one database pool.
#[derive(Clone)]
pub struct OrganizationServices {
    pub db_pool: SqlitePool,
    pub repository: SqliteEmployeeRepository,
    pub ledger: InvitationLedger,
}

impl OrganizationServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to prepare organization database")?;

        let repository = SqliteEmployeeRepository::new(db_pool.clone());
        let ledger = InvitationLedger::from_config(Arc::new(repository.clone()), &config.invitation);

        info!(
            expiry_days = config.invitation.expiry_days,
            "invitation ledger ready"
        );

        Ok(Self {
            db_pool,
            repository,
            ledger,
        })
    }

    /// Invitation flow wired to the given account backend and mail provider.
    pub fn invitation_service(
        &self,
        config: &AppConfig,
        accounts: Arc<dyn AccountProvisioner>,
        mailer: Arc<dyn InvitationMailer>,
    ) -> InvitationService {
        InvitationService::new(
            self.ledger.clone(),
            Arc::new(self.repository.clone()),
            PasswordProvisioner::from_config(&config.password),
            accounts,
            mailer,
        )
    }

    pub fn sweeper(&self, config: &AppConfig) -> InvitationSweeper {
        InvitationSweeper::from_config(self.ledger.clone(), &config.invitation)
    }
}

/// Local settings store selected by `sync.settings_path`.
pub fn settings_storage(config: &AppConfig) -> Arc<dyn SettingsStorage> {
    match &config.sync.settings_path {
        Some(path) => {
            info!(path = %path, "local settings stored on disk");
            Arc::new(FileSettingsStorage::new(path))
        }
        None => {
            info!("local settings kept in memory");
            Arc::new(MemorySettingsStorage::new())
        }
    }
}

/// Start the extension's background context against the given backends.
pub fn start_background(
    config: &AppConfig,
    auth: Arc<dyn AuthBackend>,
    settings_source: Arc<dyn SettingsSource>,
) -> BackgroundContext {
    BackgroundContext::start(
        &config.background,
        BackgroundDeps {
            auth,
            settings_source,
            settings_storage: settings_storage(config),
        },
    )
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
