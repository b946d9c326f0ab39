use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    BusError, ConsumerGroup, EventBus, EventEnvelope, EventHandler, Record, RecordPosition,
    RedeliveryPolicy, Result, Topic, bus::partition_for,
};

/// How long an idle worker waits before polling again.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// A record that exhausted its deliveries, or could not be decoded.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub group: ConsumerGroup,
    pub position: RecordPosition,
    pub envelope: EventEnvelope,
    pub error: String,
}

/// Outcome of one or more consumption passes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Records handled and committed.
    pub delivered: usize,
    /// Failed deliveries left uncommitted for redelivery.
    pub failed: usize,
    /// Records given up on and committed.
    pub dead_lettered: usize,
}

impl DrainReport {
    /// Returns true if the pass touched no record.
    pub fn is_idle(&self) -> bool {
        self.delivered == 0 && self.failed == 0 && self.dead_lettered == 0
    }

    fn merge(&mut self, other: DrainReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.dead_lettered += other.dead_lettered;
    }
}

/// Consumption state of one (topic, group, partition).
#[derive(Debug, Default)]
struct Cursor {
    /// Offset of the next record to deliver; everything below is committed.
    next_offset: u64,
    /// Consecutive failed deliveries of the record at `next_offset`.
    failures: u32,
    retry_at: Option<Instant>,
}

impl Cursor {
    fn commit(&mut self) {
        self.next_offset += 1;
        self.failures = 0;
        self.retry_at = None;
    }
}

struct Subscription {
    topic: Topic,
    group: ConsumerGroup,
    handler: Arc<dyn EventHandler>,
    cursors: Vec<Mutex<Cursor>>,
}

struct Inner {
    partitions: usize,
    policy: RedeliveryPolicy,
    available: AtomicBool,
    logs: RwLock<HashMap<Topic, Vec<Vec<Record>>>>,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    dead_letters: RwLock<Vec<DeadLetter>>,
    appended: Notify,
}

/// Partitioned in-process bus with consumer groups.
///
/// Every (topic, group, partition) has one committed offset. A worker takes
/// a partition exclusively while consuming it, so several workers of a group
/// compete for partitions while every group sees the full stream.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl InMemoryEventBus {
    /// Creates a bus with `partitions` partitions per topic and the default policy.
    pub fn new(partitions: usize) -> Self {
        Self::with_policy(partitions, RedeliveryPolicy::default())
    }

    /// Creates a bus with an explicit redelivery policy.
    pub fn with_policy(partitions: usize, policy: RedeliveryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                policy,
                available: AtomicBool::new(true),
                logs: RwLock::new(HashMap::new()),
                subscriptions: RwLock::new(Vec::new()),
                dead_letters: RwLock::new(Vec::new()),
                appended: Notify::new(),
            }),
        }
    }

    /// Returns the number of partitions per topic.
    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    /// Switches the transport on or off. While off, `send` fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if the transport accepts records.
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Returns the total number of records ever appended to a topic.
    pub async fn record_count(&self, topic: Topic) -> usize {
        self.inner
            .logs
            .read()
            .await
            .get(&topic)
            .map(|partitions| partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Returns every record on a topic, partition by partition.
    pub async fn records(&self, topic: Topic) -> Vec<Record> {
        self.inner
            .logs
            .read()
            .await
            .get(&topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of records not yet committed by `group`.
    pub async fn lag(&self, group: &ConsumerGroup) -> u64 {
        let subscriptions = self.inner.subscriptions.read().await.clone();
        let mut committed = Vec::new();
        for sub in subscriptions.iter().filter(|s| &s.group == group) {
            for (partition, cursor) in sub.cursors.iter().enumerate() {
                committed.push((sub.topic, partition, cursor.lock().await.next_offset));
            }
        }

        let logs = self.inner.logs.read().await;
        committed
            .into_iter()
            .map(|(topic, partition, offset)| {
                let len = logs.get(&topic).map_or(0, |p| p[partition].len() as u64);
                len.saturating_sub(offset)
            })
            .sum()
    }

    /// Returns the records that were given up on.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead_letters.read().await.clone()
    }

    /// Delivers pending records until no subscription makes progress.
    ///
    /// Redelivery backoff is not awaited; a record that keeps failing is
    /// retried immediately until it is dead-lettered. Intended for callers
    /// that do not run background consumers.
    pub async fn drain(&self) -> DrainReport {
        let mut total = DrainReport::default();
        loop {
            let pass = self.poll_once(false).await;
            if pass.is_idle() {
                return total;
            }
            total.merge(pass);
        }
    }

    /// Starts `workers` background consumers that run until `shutdown` turns true.
    pub fn spawn_consumers(
        &self,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|worker| {
                let bus = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { bus.run_worker(worker, shutdown).await })
            })
            .collect()
    }

    async fn run_worker(self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        info!(worker, "Consumer worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.poll_once(true).await;
            if report.is_idle() {
                tokio::select! {
                    () = self.inner.appended.notified() => {}
                    () = tokio::time::sleep(IDLE_POLL) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        info!(worker, "Consumer worker stopped");
    }

    /// Visits every (subscription, partition) not held by another worker once.
    async fn poll_once(&self, respect_backoff: bool) -> DrainReport {
        let subscriptions = self.inner.subscriptions.read().await.clone();
        let mut report = DrainReport::default();
        for sub in subscriptions {
            for partition in 0..self.inner.partitions {
                let Ok(mut cursor) = sub.cursors[partition].try_lock() else {
                    continue;
                };
                if respect_backoff && cursor.retry_at.is_some_and(|at| Instant::now() < at) {
                    continue;
                }
                report.merge(self.consume_partition(&sub, partition, &mut cursor).await);
            }
        }
        report
    }

    async fn record_at(&self, topic: Topic, partition: usize, offset: u64) -> Option<Record> {
        self.inner
            .logs
            .read()
            .await
            .get(&topic)
            .and_then(|partitions| partitions[partition].get(offset as usize))
            .cloned()
    }

    async fn consume_partition(
        &self,
        sub: &Subscription,
        partition: usize,
        cursor: &mut Cursor,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(record) = self.record_at(sub.topic, partition, cursor.next_offset).await {
            let offset = record.position.offset;
            let outcome = match record.envelope.decode() {
                Ok(event) => sub
                    .handler
                    .handle(event)
                    .await
                    .map_err(|e| (e.to_string(), true)),
                Err(e) => Err((e.to_string(), false)),
            };

            match outcome {
                Ok(()) => {
                    debug!(topic = %sub.topic, group = %sub.group, partition, offset, "Record delivered");
                    metrics::counter!("bus_deliveries_total", "topic" => sub.topic.as_str())
                        .increment(1);
                    cursor.commit();
                    report.delivered += 1;
                }
                Err((error, retryable)) => {
                    cursor.failures += 1;
                    metrics::counter!("bus_delivery_failures_total", "topic" => sub.topic.as_str())
                        .increment(1);

                    if retryable && self.inner.policy.should_redeliver(cursor.failures) {
                        let delay = self.inner.policy.delay_for_attempt(cursor.failures);
                        cursor.retry_at = Some(Instant::now() + delay);
                        warn!(
                            topic = %sub.topic,
                            group = %sub.group,
                            partition,
                            offset,
                            event_id = %record.envelope.event_id,
                            attempt = cursor.failures,
                            delay_ms = delay.as_millis() as u64,
                            %error,
                            "Delivery failed, record will be redelivered"
                        );
                        report.failed += 1;
                        break;
                    }

                    error!(
                        topic = %sub.topic,
                        group = %sub.group,
                        partition,
                        offset,
                        event_id = %record.envelope.event_id,
                        attempts = cursor.failures,
                        %error,
                        "Delivery abandoned, record parked as dead letter"
                    );
                    self.inner.dead_letters.write().await.push(DeadLetter {
                        group: sub.group.clone(),
                        position: record.position,
                        envelope: record.envelope,
                        error,
                    });
                    cursor.commit();
                    report.dead_lettered += 1;
                }
            }
        }
        report
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    #[tracing::instrument(skip(self, envelope), fields(event_type = %envelope.event_type, key = envelope.key))]
    async fn send(&self, topic: Topic, envelope: EventEnvelope) -> Result<RecordPosition> {
        if !self.is_available() {
            return Err(BusError::Unavailable);
        }

        let partition = partition_for(envelope.key, self.inner.partitions);
        let position = {
            let mut logs = self.inner.logs.write().await;
            let partitions = logs
                .entry(topic)
                .or_insert_with(|| vec![Vec::new(); self.inner.partitions]);
            let records = &mut partitions[partition];
            let position = RecordPosition {
                topic,
                partition,
                offset: records.len() as u64,
            };
            records.push(Record { position, envelope });
            position
        };

        metrics::counter!("bus_records_sent_total", "topic" => topic.as_str()).increment(1);
        debug!(%topic, partition, offset = position.offset, "Record appended");
        self.inner.appended.notify_waiters();
        Ok(position)
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group: ConsumerGroup,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        if subscriptions
            .iter()
            .any(|s| s.topic == topic && s.group == group)
        {
            return Err(BusError::DuplicateSubscription { topic, group });
        }

        info!(%topic, %group, "Subscription registered");
        subscriptions.push(Arc::new(Subscription {
            topic,
            group,
            handler,
            cursors: (0..self.inner.partitions)
                .map(|_| Mutex::new(Cursor::default()))
                .collect(),
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use chrono::Utc;
    use common::{MemberDto, MemberId};

    use super::*;
    use crate::{Event, HandlerError};

    #[derive(Default)]
    struct Recorder {
        seen: std::sync::Mutex<Vec<String>>,
        fail_next: AtomicU32,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: Event) -> std::result::Result<(), HandlerError> {
            if self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(HandlerError::Transient("store busy".to_string()));
            }
            let member = event.member().map(|m| m.username.clone()).unwrap_or_default();
            self.seen.lock().unwrap().push(member);
            Ok(())
        }
    }

    fn joined(id: u64, username: &str) -> EventEnvelope {
        let now = Utc::now();
        let event = Event::MemberJoined {
            member: MemberDto {
                id: MemberId::new(id),
                create_date: now,
                modify_date: now,
                username: username.to_string(),
                nickname: username.to_string(),
                activity_score: 0,
            },
        };
        EventEnvelope::from_event(&event, "member-service").unwrap()
    }

    #[tokio::test]
    async fn each_group_receives_every_record() {
        let bus = InMemoryEventBus::new(4);
        let cash = Arc::new(Recorder::default());
        let market = Arc::new(Recorder::default());
        bus.subscribe(Topic::MemberJoined, "cash-service".into(), cash.clone())
            .await
            .unwrap();
        bus.subscribe(Topic::MemberJoined, "market-service".into(), market.clone())
            .await
            .unwrap();

        bus.send(Topic::MemberJoined, joined(1, "user1")).await.unwrap();
        bus.send(Topic::MemberJoined, joined(2, "user2")).await.unwrap();

        let report = bus.drain().await;
        assert_eq!(report.delivered, 4);
        assert_eq!(cash.seen().len(), 2);
        assert_eq!(market.seen().len(), 2);
        assert_eq!(bus.lag(&"cash-service".into()).await, 0);
    }

    #[tokio::test]
    async fn duplicate_subscription_is_rejected() {
        let bus = InMemoryEventBus::new(1);
        let handler = Arc::new(Recorder::default());
        bus.subscribe(Topic::MemberJoined, "cash-service".into(), handler.clone())
            .await
            .unwrap();

        let result = bus
            .subscribe(Topic::MemberJoined, "cash-service".into(), handler)
            .await;
        assert!(matches!(
            result,
            Err(BusError::DuplicateSubscription { topic: Topic::MemberJoined, .. })
        ));
    }

    #[tokio::test]
    async fn same_key_keeps_publish_order() {
        let bus = InMemoryEventBus::new(4);
        let handler = Arc::new(Recorder::default());
        bus.subscribe(Topic::MemberJoined, "post-service".into(), handler.clone())
            .await
            .unwrap();

        for name in ["a", "b", "c"] {
            bus.send(Topic::MemberJoined, joined(3, name)).await.unwrap();
        }
        bus.drain().await;

        assert_eq!(handler.seen(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn late_group_starts_at_earliest_offset() {
        let bus = InMemoryEventBus::new(2);
        bus.send(Topic::MemberJoined, joined(1, "user1")).await.unwrap();

        let handler = Arc::new(Recorder::default());
        bus.subscribe(Topic::MemberJoined, "payout-service".into(), handler.clone())
            .await
            .unwrap();
        bus.drain().await;

        assert_eq!(handler.seen(), vec!["user1"]);
    }

    #[tokio::test]
    async fn failed_delivery_is_redelivered_and_blocks_partition() {
        let bus = InMemoryEventBus::new(1);
        let handler = Arc::new(Recorder::default());
        handler.fail_next.store(2, Ordering::SeqCst);
        bus.subscribe(Topic::MemberJoined, "cash-service".into(), handler.clone())
            .await
            .unwrap();

        bus.send(Topic::MemberJoined, joined(1, "first")).await.unwrap();
        bus.send(Topic::MemberJoined, joined(2, "second")).await.unwrap();

        let report = bus.drain().await;
        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(handler.seen(), vec!["first", "second"]);
        assert!(bus.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_record_is_dead_lettered() {
        let policy = RedeliveryPolicy {
            max_attempts: 3,
            ..RedeliveryPolicy::default()
        };
        let bus = InMemoryEventBus::with_policy(1, policy);
        let handler = Arc::new(Recorder::default());
        handler.fail_next.store(u32::MAX, Ordering::SeqCst);
        bus.subscribe(Topic::MemberJoined, "cash-service".into(), handler.clone())
            .await
            .unwrap();

        bus.send(Topic::MemberJoined, joined(1, "user1")).await.unwrap();
        let report = bus.drain().await;

        assert_eq!(report.failed, 2);
        assert_eq!(report.dead_lettered, 1);
        let dead = bus.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].group.as_str(), "cash-service");
        assert_eq!(bus.lag(&"cash-service".into()).await, 0);
    }

    #[tokio::test]
    async fn undecodable_record_is_dead_lettered_immediately() {
        let bus = InMemoryEventBus::new(1);
        let handler = Arc::new(Recorder::default());
        bus.subscribe(Topic::MemberJoined, "cash-service".into(), handler.clone())
            .await
            .unwrap();

        let garbage = EventEnvelope::new(
            "MemberJoined",
            1,
            "member-service",
            serde_json::json!({"type": "MemberJoined", "data": 1}),
        );
        let event_id = garbage.event_id;
        bus.send(Topic::MemberJoined, garbage).await.unwrap();

        let report = bus.drain().await;
        assert_eq!(report.dead_lettered, 1);
        assert!(handler.seen().is_empty());
        assert_eq!(bus.dead_letters().await[0].envelope.event_id, event_id);
    }

    #[tokio::test]
    async fn unavailable_bus_refuses_records() {
        let bus = InMemoryEventBus::new(1);
        bus.set_available(false);
        let result = bus.send(Topic::MemberJoined, joined(1, "user1")).await;
        assert!(matches!(result, Err(BusError::Unavailable)));
        assert_eq!(bus.record_count(Topic::MemberJoined).await, 0);

        bus.set_available(true);
        bus.send(Topic::MemberJoined, joined(1, "user1")).await.unwrap();
        assert_eq!(bus.record_count(Topic::MemberJoined).await, 1);
    }

    #[tokio::test]
    async fn background_workers_consume_and_stop() {
        let bus = InMemoryEventBus::new(4);
        let handler = Arc::new(Recorder::default());
        bus.subscribe(Topic::MemberJoined, "cash-service".into(), handler.clone())
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = bus.spawn_consumers(3, shutdown_rx);

        for id in 1..=20 {
            bus.send(Topic::MemberJoined, joined(id, &format!("user{id}")))
                .await
                .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while handler.seen().len() < 20 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        for worker in workers {
            worker.await.unwrap();
        }

        let mut seen = handler.seen();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 20);
        assert_eq!(handler.seen().len(), 20, "competing workers must not double-deliver");
    }
}
