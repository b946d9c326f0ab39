//! Integration tests for the node: endpoints, bootstrap gates and the
//! payout batch.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{ManualClock, Money, ProductId};
use domain::OrderLine;
use event_bus::InMemoryEventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use node::bootstrap::{Bootstrap, GATED_SERVICES};
use node::config::Config;
use node::readiness::{NodeStatus, ReadinessBoard};
use node::scheduler::PayoutScheduler;
use node::{AppState, create_app, start_services};
use replication::{GateOutcome, ReadinessGate};
use saga::Choreography;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct Node {
    bus: InMemoryEventBus,
    clock: ManualClock,
    services: Arc<Choreography>,
    readiness: Arc<ReadinessBoard>,
}

impl Node {
    async fn start(config: &Config) -> Self {
        let bus = InMemoryEventBus::new(config.bus_partitions);
        let clock = ManualClock::default();
        let services = start_services(config, &bus, Arc::new(clock.clone()))
            .await
            .unwrap();
        Self {
            bus,
            clock,
            services,
            readiness: Arc::new(ReadinessBoard::new(GATED_SERVICES)),
        }
    }

    fn app(&self) -> axum::Router {
        let state = Arc::new(AppState {
            services: self.services.clone(),
            readiness: self.readiness.clone(),
        });
        create_app(state, get_metrics_handle())
    }

    fn bootstrap(
        &self,
        gate: ReadinessGate,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let scheduler = PayoutScheduler::new(
            self.services.payout.clone(),
            Duration::from_secs(3600),
            100,
            20,
        );
        Bootstrap::new(gate, "system", self.readiness.clone()).spawn(
            &self.services,
            scheduler,
            shutdown,
        )
    }
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn wait_until_settled(readiness: &ReadinessBoard) {
    for _ in 0..200 {
        if readiness.report().status != NodeStatus::Starting {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("bootstrap gates did not finish");
}

#[tokio::test]
async fn test_health_check() {
    let node = Node::start(&Config::default()).await;

    let (status, json) = get_json(node.app(), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_ready_reports_waiting_gates() {
    let node = Node::start(&Config::default()).await;

    let (status, json) = get_json(node.app(), "/ready").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "starting");
    assert_eq!(json["services"]["cash-service"]["status"], "waiting");
    // The system accounts' MemberJoined events were relayed at startup.
    assert_eq!(json["pendingEvents"], 0);
}

#[tokio::test]
async fn test_gates_open_once_members_are_replicated() {
    let node = Node::start(&Config::default()).await;
    node.bus.drain().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = node.bootstrap(
        ReadinessGate::new(Duration::from_millis(10), Duration::from_secs(1)),
        shutdown_rx,
    );
    wait_until_settled(&node.readiness).await;

    let (status, json) = get_json(node.app(), "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ready");
    for service in GATED_SERVICES {
        assert_eq!(json["services"][*service]["status"], "ready");
        assert_eq!(json["services"][*service]["attempts"], 1);
    }

    // system, holding and admin
    assert_eq!(node.services.cash.wallet_count().await, 3);

    shutdown_tx.send_replace(true);
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_gate_times_out_without_replicas() {
    let node = Node::start(&Config::default()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = node.bootstrap(
        ReadinessGate::new(Duration::from_millis(5), Duration::from_millis(20)),
        shutdown_rx,
    );
    wait_until_settled(&node.readiness).await;

    assert!(matches!(
        node.readiness.outcome("cash-service"),
        Some(GateOutcome::TimedOut { attempts }) if (1..=4).contains(&attempts)
    ));
    let (status, json) = get_json(node.app(), "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "degraded");
    assert_eq!(node.services.cash.wallet_count().await, 0);

    shutdown_tx.send_replace(true);
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_shutdown_interrupts_waiting_gates() {
    let node = Node::start(&Config::default()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = node.bootstrap(
        ReadinessGate::new(Duration::from_millis(50), Duration::from_secs(60)),
        shutdown_rx,
    );
    shutdown_tx.send_replace(true);
    for task in tasks {
        task.await.unwrap();
    }

    for service in GATED_SERVICES {
        assert!(matches!(
            node.readiness.outcome(service),
            Some(GateOutcome::Interrupted { .. })
        ));
    }
}

#[tokio::test]
async fn test_payout_batch_pays_sellers_after_waiting_period() {
    let config = Config {
        payout_ready_waiting_days: 7,
        ..Config::default()
    };
    let node = Node::start(&config).await;
    node.bus.drain().await;

    let services = &node.services;
    let buyer = services.member.join("buyer", "Buyer").await.unwrap();
    let seller = services.member.join("seller", "Seller").await.unwrap();
    node.bus.drain().await;
    services
        .cash
        .deposit(buyer.id, Money::new(1000))
        .await
        .unwrap();
    let order = services
        .market
        .create_order(
            buyer.id,
            vec![OrderLine::new(
                seller.id,
                "Seller",
                ProductId::new(7),
                "Keyboard",
                Money::new(1000),
                Money::new(1000),
            )],
        )
        .await
        .unwrap();
    services
        .market
        .request_payment(order.id, Money::zero())
        .await
        .unwrap();
    node.bus.drain().await;

    let scheduler = PayoutScheduler::from_config(services.payout.clone(), &config);
    let early = scheduler.run_once().await.unwrap();
    assert_eq!((early.collected, early.completed), (0, 0));

    node.clock.advance(chrono::Duration::days(8));
    let run = scheduler.run_once().await.unwrap();
    assert_eq!(run.collected, 1);
    assert_eq!(run.completed, 2);
    node.bus.drain().await;

    assert_eq!(services.cash.balance(seller.id).await, Some(Money::new(900)));
    let system = services.cash.wallet_by_username("system").await.unwrap();
    assert_eq!(system.balance(), Money::new(100));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let node = Node::start(&Config::default()).await;
    node.bus.drain().await;

    let response = node
        .app()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
