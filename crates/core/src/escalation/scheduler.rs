//! Periodic escalation sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use quorum_shared::types::ApprovalRequestId;

use crate::approval::error::ApprovalError;
use crate::approval::service::ApprovalService;
use crate::clock::Clock;

/// Runs [`ApprovalService::sweep_escalations`] on a fixed interval.
pub struct EscalationScheduler {
    service: Arc<ApprovalService>,
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl EscalationScheduler {
    /// Creates a scheduler sweeping every `period`.
    pub fn new(service: Arc<ApprovalService>, clock: Arc<dyn Clock>, period: Duration) -> Self {
        Self {
            service,
            clock,
            period,
        }
    }

    /// Runs one sweep at the clock's current time.
    ///
    /// # Returns
    /// Ids of the requests escalated by this sweep.
    pub async fn run_once(&self) -> Result<Vec<ApprovalRequestId>, ApprovalError> {
        let now = self.clock.now();
        let escalated = self.service.sweep_escalations(now).await?;
        Ok(escalated.into_iter().map(|r| r.id).collect())
    }

    /// Sweeps on every tick until `shutdown` is cancelled.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = self.period.as_secs(), "escalation scheduler started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(ids) if !ids.is_empty() => {
                            info!(escalated = ids.len(), "escalation sweep applied");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "escalation sweep failed"),
                    }
                }
            }
        }

        info!("escalation scheduler stopped");
    }
}
