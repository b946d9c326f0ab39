//! Node configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::PayoutPolicy;
use replication::ReadinessGate;

/// Node configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` `text` or `json` (default: `"text"`)
/// - `BUS_PARTITIONS` partitions per topic (default: `4`)
/// - `CONSUMER_WORKERS` background consumer tasks (default: `2`)
/// - `READINESS_TIMEOUT_SECS` bootstrap gate timeout (default: `30`)
/// - `READINESS_INTERVAL_MS` bootstrap probe interval (default: `1000`)
/// - `READINESS_PROBE_USERNAME` member the gates wait for (default: `"system"`)
/// - `PAYOUT_READY_WAITING_DAYS` days before a sale can be paid out (default: `14`)
/// - `PAYOUT_JOB_INTERVAL_SECS` payout scheduler period (default: `60`)
/// - `PAYOUT_COLLECT_BATCH` candidates collected per run (default: `100`)
/// - `PAYOUT_COMPLETE_BATCH` payouts completed per run (default: `20`)
/// - `OUTBOX_RELAY_INTERVAL_MS` outbox relay period (default: `500`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub bus_partitions: usize,
    pub consumer_workers: usize,
    pub readiness_timeout: Duration,
    pub readiness_interval: Duration,
    pub readiness_probe_username: String,
    pub payout_ready_waiting_days: u32,
    pub payout_job_interval: Duration,
    pub payout_collect_batch: usize,
    pub payout_complete_batch: usize,
    pub outbox_relay_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Unparseable
    /// values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            bus_partitions: positive(parse(&lookup, "BUS_PARTITIONS"), defaults.bus_partitions),
            consumer_workers: positive(
                parse(&lookup, "CONSUMER_WORKERS"),
                defaults.consumer_workers,
            ),
            readiness_timeout: parse(&lookup, "READINESS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.readiness_timeout),
            readiness_interval: parse(&lookup, "READINESS_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.readiness_interval),
            readiness_probe_username: lookup("READINESS_PROBE_USERNAME")
                .unwrap_or(defaults.readiness_probe_username),
            payout_ready_waiting_days: parse(&lookup, "PAYOUT_READY_WAITING_DAYS")
                .unwrap_or(defaults.payout_ready_waiting_days),
            payout_job_interval: parse(&lookup, "PAYOUT_JOB_INTERVAL_SECS")
                .map(Duration::from_secs)
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.payout_job_interval),
            payout_collect_batch: positive(
                parse(&lookup, "PAYOUT_COLLECT_BATCH"),
                defaults.payout_collect_batch,
            ),
            payout_complete_batch: positive(
                parse(&lookup, "PAYOUT_COMPLETE_BATCH"),
                defaults.payout_complete_batch,
            ),
            outbox_relay_interval: parse(&lookup, "OUTBOX_RELAY_INTERVAL_MS")
                .map(Duration::from_millis)
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.outbox_relay_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The gate every downstream service waits on at startup.
    pub fn readiness_gate(&self) -> ReadinessGate {
        ReadinessGate::new(self.readiness_interval, self.readiness_timeout)
    }

    pub fn payout_policy(&self) -> PayoutPolicy {
        PayoutPolicy::new(self.payout_ready_waiting_days)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            bus_partitions: 4,
            consumer_workers: 2,
            readiness_timeout: Duration::from_secs(30),
            readiness_interval: Duration::from_millis(1000),
            readiness_probe_username: common::SYSTEM_USERNAME.to_string(),
            payout_ready_waiting_days: domain::DEFAULT_READY_WAITING_DAYS,
            payout_job_interval: Duration::from_secs(60),
            payout_collect_batch: 100,
            payout_complete_batch: 20,
            outbox_relay_interval: Duration::from_millis(500),
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn positive(value: Option<usize>, default: usize) -> usize {
    value.filter(|v| *v > 0).unwrap_or(default)
}
