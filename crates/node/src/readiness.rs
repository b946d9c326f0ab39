//! Gate outcomes of the downstream services, as reported on `/ready`.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use replication::GateOutcome;
use serde::Serialize;

/// Startup state of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl From<Option<GateOutcome>> for ServiceStatus {
    fn from(outcome: Option<GateOutcome>) -> Self {
        match outcome {
            Some(outcome) => Self {
                status: outcome.as_str(),
                attempts: Some(outcome.attempts()),
            },
            None => Self {
                status: "waiting",
                attempts: None,
            },
        }
    }
}

/// Overall readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Every gate passed.
    Ready,
    /// At least one gate is still polling.
    Starting,
    /// Every gate finished, but at least one skipped its startup work.
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub status: NodeStatus,
    pub services: BTreeMap<&'static str, ServiceStatus>,
}

/// Records how each service's bootstrap gate ended.
#[derive(Debug)]
pub struct ReadinessBoard {
    outcomes: RwLock<BTreeMap<&'static str, Option<GateOutcome>>>,
}

impl ReadinessBoard {
    /// Creates a board on which every listed service is still waiting.
    pub fn new(services: &[&'static str]) -> Self {
        Self {
            outcomes: RwLock::new(services.iter().map(|s| (*s, None)).collect()),
        }
    }

    pub fn record(&self, service: &'static str, outcome: GateOutcome) {
        self.outcomes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service, Some(outcome));
    }

    pub fn outcome(&self, service: &str) -> Option<GateOutcome> {
        self.outcomes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .copied()
            .flatten()
    }

    pub fn report(&self) -> ReadinessReport {
        let outcomes = self.outcomes.read().unwrap_or_else(PoisonError::into_inner);
        let status = if outcomes.values().any(Option::is_none) {
            NodeStatus::Starting
        } else if outcomes.values().flatten().all(GateOutcome::is_ready) {
            NodeStatus::Ready
        } else {
            NodeStatus::Degraded
        };
        ReadinessReport {
            status,
            services: outcomes
                .iter()
                .map(|(service, outcome)| (*service, ServiceStatus::from(*outcome)))
                .collect(),
        }
    }
}
