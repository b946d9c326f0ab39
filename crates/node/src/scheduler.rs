//! Periodic background jobs: the payout batch and the outbox relay.

use std::sync::Arc;
use std::time::Duration;

use saga::{Choreography, PayoutService};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Result of one payout batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PayoutRun {
    pub collected: usize,
    pub completed: usize,
}

/// Collects ready candidates into payouts and completes payouts that hold
/// money, once per interval.
#[derive(Clone)]
pub struct PayoutScheduler {
    payout: Arc<PayoutService>,
    interval: Duration,
    collect_batch: usize,
    complete_batch: usize,
}

impl PayoutScheduler {
    pub fn new(
        payout: Arc<PayoutService>,
        interval: Duration,
        collect_batch: usize,
        complete_batch: usize,
    ) -> Self {
        Self {
            payout,
            interval,
            collect_batch,
            complete_batch,
        }
    }

    pub fn from_config(payout: Arc<PayoutService>, config: &Config) -> Self {
        Self::new(
            payout,
            config.payout_job_interval,
            config.payout_collect_batch,
            config.payout_complete_batch,
        )
    }

    /// Runs one batch: collection first, so that freshly collected items
    /// are paid out in the same run.
    pub async fn run_once(&self) -> saga::Result<PayoutRun> {
        let collected = self
            .payout
            .collect_payout_items_more(self.collect_batch)
            .await?;
        let completed = self
            .payout
            .complete_payouts_more(self.complete_batch)
            .await?;
        Ok(PayoutRun {
            collected,
            completed,
        })
    }

    /// Runs batches until `shutdown` turns true. A failed batch is logged and
    /// retried on the next tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Payout scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => match self.run_once().await {
                    Ok(run) if run != PayoutRun::default() => {
                        info!(collected = run.collected, completed = run.completed, "Payout batch finished");
                    }
                    Ok(_) => debug!("Payout batch found nothing to do"),
                    Err(error) => {
                        metrics::counter!("payout_batch_failures_total").increment(1);
                        warn!(%error, transient = error.is_transient(), "Payout batch failed");
                    }
                },
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            }
        }
        info!("Payout scheduler stopped");
    }
}

/// Relays every outbox once per interval, then once more on shutdown.
pub async fn run_outbox_relay(
    services: Arc<Choreography>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let relayed = services.relay_outboxes().await;
                if relayed > 0 {
                    metrics::counter!("outbox_events_relayed_total").increment(relayed as u64);
                    info!(relayed, "Outbox events relayed");
                }
            }
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
        }
    }
    let relayed = services.relay_outboxes().await;
    let pending = services.pending_events();
    if pending > 0 {
        warn!(relayed, pending, "Outbox not empty at shutdown");
    } else {
        debug!(relayed, "Outbox relay stopped");
    }
}
