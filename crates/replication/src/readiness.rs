//! Bootstrap readiness gate.
//!
//! Services start in no particular order, so a downstream service polls for a
//! prerequisite replica before running startup work that depends on it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{info, warn};

/// Attempts between "still waiting" log lines.
const PROGRESS_LOG_EVERY: u32 = 5;

/// A condition the gate polls for.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self) -> bool;

    /// Human readable name of what is being waited for.
    fn describe(&self) -> String;
}

/// How a gate wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GateOutcome {
    /// The probe succeeded.
    Ready { attempts: u32 },
    /// The retries or the timeout ran out; dependent work is skipped.
    TimedOut { attempts: u32 },
    /// Shutdown was signalled while waiting.
    Interrupted { attempts: u32 },
}

impl GateOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, GateOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            GateOutcome::Ready { attempts }
            | GateOutcome::TimedOut { attempts }
            | GateOutcome::Interrupted { attempts } => *attempts,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Ready { .. } => "ready",
            GateOutcome::TimedOut { .. } => "timed_out",
            GateOutcome::Interrupted { .. } => "interrupted",
        }
    }
}

impl std::fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounded retry-poll with a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessGate {
    interval: Duration,
    timeout: Duration,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl ReadinessGate {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of probes before giving up (`timeout / interval`, at least one).
    pub fn max_retries(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let retries = self.timeout.as_millis() / interval;
        u32::try_from(retries).unwrap_or(u32::MAX).max(1)
    }

    /// Polls `probe` until it succeeds, the retries or the timeout run out,
    /// or `shutdown` turns true. The timeout is measured from the first probe
    /// and includes the time spent inside probes. Never fails; the outcome
    /// tells the caller whether to run its dependent startup work.
    #[tracing::instrument(skip(self, probe, shutdown), fields(probe = %probe.describe()))]
    pub async fn wait(
        &self,
        service: &str,
        probe: &dyn ReadinessProbe,
        shutdown: &mut watch::Receiver<bool>,
    ) -> GateOutcome {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let max_retries = self.max_retries();

        let outcome = 'poll: {
            let mut attempts = 0;
            while attempts < max_retries {
                attempts += 1;
                match timeout_at(deadline, probe.is_ready()).await {
                    Ok(true) => {
                        info!(attempts, "Readiness gate passed");
                        break 'poll GateOutcome::Ready { attempts };
                    }
                    Ok(false) => {}
                    Err(_) => break,
                }
                if attempts == max_retries || Instant::now() >= deadline {
                    break;
                }
                if attempts % PROGRESS_LOG_EVERY == 0 {
                    info!(attempts, max_retries, "Still waiting for {}", probe.describe());
                }
                if self.pause(deadline, shutdown).await {
                    info!(attempts, "Readiness gate interrupted");
                    break 'poll GateOutcome::Interrupted { attempts };
                }
            }
            warn!(
                attempts,
                "Gave up waiting for {} after {:?}. Skipping startup work.",
                probe.describe(),
                self.timeout
            );
            GateOutcome::TimedOut { attempts }
        };

        metrics::histogram!(
            "readiness_gate_wait_seconds",
            "service" => service.to_string(),
            "outcome" => outcome.as_str()
        )
        .record(started.elapsed().as_secs_f64());
        outcome
    }

    /// Sleeps one interval, cut short at `deadline`. Returns true if shutdown
    /// was signalled instead.
    async fn pause(&self, deadline: Instant, shutdown: &mut watch::Receiver<bool>) -> bool {
        let wake = (Instant::now() + self.interval).min(deadline);
        let stopped = tokio::select! {
            _ = sleep_until(wake) => return false,
            result = shutdown.wait_for(|stop| *stop) => result.is_ok(),
        };
        if stopped {
            return true;
        }
        // The sender is gone, so shutdown can no longer be signalled.
        sleep_until(wake).await;
        false
    }
}
