//! Startup gates of the downstream services.
//!
//! Each downstream service waits until its replica of the probe member
//! exists, then runs the startup work that needs replicated members. A gate
//! that times out skips that work; the service keeps consuming events.

use std::sync::Arc;

use replication::{GateOutcome, MemberDirectory, ReadinessGate, UsernameProbe};
use saga::{CashService, Choreography, MarketService, PayoutService, PostService};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::readiness::ReadinessBoard;
use crate::scheduler::PayoutScheduler;

/// Services that replicate members and therefore have a gate.
pub const GATED_SERVICES: &[&str] = &[
    CashService::NAME,
    MarketService::NAME,
    PayoutService::NAME,
    PostService::NAME,
];

#[derive(Clone)]
pub struct Bootstrap {
    gate: ReadinessGate,
    probe_username: Arc<str>,
    board: Arc<ReadinessBoard>,
}

impl Bootstrap {
    pub fn new(gate: ReadinessGate, probe_username: &str, board: Arc<ReadinessBoard>) -> Self {
        Self {
            gate,
            probe_username: Arc::from(probe_username),
            board,
        }
    }

    /// Starts one gate task per downstream service. The payout task goes on
    /// to run `scheduler` until shutdown.
    pub fn spawn(
        &self,
        services: &Choreography,
        scheduler: PayoutScheduler,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let cash = services.cash.clone();
        let payout = services.payout.clone();
        let market: Arc<dyn MemberDirectory> = services.market.clone();
        let post: Arc<dyn MemberDirectory> = services.post.clone();

        vec![
            tokio::spawn(self.clone().start_cash(cash, shutdown.clone())),
            tokio::spawn(self.clone().start_payout(payout, scheduler, shutdown.clone())),
            tokio::spawn(self.clone().start_plain(MarketService::NAME, market, shutdown.clone())),
            tokio::spawn(self.clone().start_plain(PostService::NAME, post, shutdown)),
        ]
    }

    async fn pass(
        &self,
        service: &'static str,
        directory: Arc<dyn MemberDirectory>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> GateOutcome {
        let probe = UsernameProbe::new(directory, self.probe_username.as_ref());
        let outcome = self.gate.wait(service, &probe, shutdown).await;
        self.board.record(service, outcome);
        outcome
    }

    async fn start_cash(self, cash: Arc<CashService>, mut shutdown: watch::Receiver<bool>) {
        let outcome = self.pass(CashService::NAME, cash.clone(), &mut shutdown).await;
        if !outcome.is_ready() {
            return;
        }
        match cash.ensure_wallets().await {
            Ok(created) => info!(service = CashService::NAME, created, "Startup data initialized"),
            Err(error) => warn!(service = CashService::NAME, %error, "Startup data init failed"),
        }
    }

    async fn start_payout(
        self,
        payout: Arc<PayoutService>,
        scheduler: PayoutScheduler,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let outcome = self
            .pass(PayoutService::NAME, payout.clone(), &mut shutdown)
            .await;
        match outcome {
            GateOutcome::Interrupted { .. } => return,
            GateOutcome::Ready { .. } => match payout.ensure_open_payouts().await {
                Ok(opened) => {
                    info!(service = PayoutService::NAME, opened, "Startup data initialized")
                }
                Err(error) => {
                    warn!(service = PayoutService::NAME, %error, "Startup data init failed")
                }
            },
            GateOutcome::TimedOut { .. } => {}
        }
        scheduler.run(shutdown).await;
    }

    async fn start_plain(
        self,
        service: &'static str,
        directory: Arc<dyn MemberDirectory>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.pass(service, directory, &mut shutdown).await;
    }
}
