//! Periodic expiry of overdue invitations.

use std::future::Future;
use std::time::Duration;

use breakwise_config::InvitationConfig;
use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::ledger::InvitationLedger;
use crate::types::LedgerResult;

pub struct InvitationSweeper {
    ledger: InvitationLedger,
    period: Duration,
}

impl InvitationSweeper {
    pub fn new(ledger: InvitationLedger, period: Duration) -> Self {
        Self {
            ledger,
            period: period.max(Duration::from_secs(1)),
        }
    }

    pub fn from_config(ledger: InvitationLedger, config: &InvitationConfig) -> Self {
        Self::new(ledger, Duration::from_secs(config.sweep_interval_seconds))
    }

    /// Expire everything overdue right now. Returns how many rows changed.
    pub async fn sweep_once(&self) -> LedgerResult<usize> {
        Ok(self.ledger.expire_overdue(Utc::now()).await?.len())
    }

    /// Sweep on every tick until `shutdown` resolves. Failed sweeps are retried next tick.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(period_seconds = self.period.as_secs(), "invitation sweeper started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(error) = self.sweep_once().await {
                        warn!(%error, "invitation sweep failed");
                    }
                }
            }
        }
        info!("invitation sweeper stopped");
    }
}
