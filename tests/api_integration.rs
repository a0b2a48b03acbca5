//! Integration tests for the fleet REST + WebSocket surface.
//!
//! Each test serves the real router on an ephemeral port and talks to it the
//! way the dashboard does: reqwest for REST, tokio-tungstenite for the feed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use workfleet::api::fleet_routes;
use workfleet::config::FleetConfig;
use workfleet::error::PayoutError;
use workfleet::fleet::{Fleet, FleetManager};
use workfleet::payout::{PaymentGateway, PaymentReceipt, PayoutPolicy, PayoutService};
use workfleet::store::FleetImport;
use workfleet::worker::{PerformanceMode, WorkerStatus, WorkerType};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for one test, so a stuck socket fails instead of hanging.
const HANG_LIMIT: Duration = Duration::from_secs(10);

async fn within<F: Future<Output = ()>>(test: F) {
    tokio::time::timeout(HANG_LIMIT, test)
        .await
        .expect("test exceeded its time limit");
}

/// A served fleet plus a client pointed at it.
struct TestFleet {
    base: String,
    ws_url: String,
    fleet: Arc<FleetManager>,
    client: reqwest::Client,
}

impl TestFleet {
    async fn serve() -> Self {
        Self::serve_with(|fleet| fleet_routes(fleet, None)).await
    }

    async fn serve_with(router: impl FnOnce(Arc<FleetManager>) -> axum::Router) -> Self {
        let config = FleetConfig {
            creation_batch_pause: Duration::from_millis(1),
            ..FleetConfig::default()
        };
        let fleet = FleetManager::from_fleet(Fleet::with_seed(config, 21));
        let app = router(Arc::clone(&fleet));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/ws"),
            fleet,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get_json(&self, path: &str) -> Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str) -> reqwest::Response {
        self.client.post(self.url(path)).send().await.unwrap()
    }

    async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).send().await.unwrap()
    }

    async fn create(&self, body: Value) -> reqwest::Response {
        self.post_json("/api/workers", &body).await
    }

    /// Connect to the feed and return it with the initial sync frame.
    async fn connect(&self) -> (Ws, Value) {
        let (mut ws, _resp) = connect_async(self.ws_url.as_str())
            .await
            .expect("WS connect failed");
        let sync = next_frame(&mut ws).await;
        (ws, sync)
    }
}

async fn next_frame(ws: &mut Ws) -> Value {
    match ws.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).expect("frame is not JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

// ── REST Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint() {
    within(async {
        let app = TestFleet::serve().await;
        assert_eq!(app.get_json("/health").await["status"], "ok");
    })
    .await;
}

#[tokio::test]
async fn create_and_list_workers() {
    within(async {
        let app = TestFleet::serve().await;

        let resp = app
            .create(json!({"count": 120, "type": "survey", "mode": "speed"}))
            .await;
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["created"], 120);

        let workers = app.get_json("/api/workers").await;
        let workers = workers.as_array().unwrap();
        assert_eq!(workers.len(), 120);
        assert_eq!(workers[0]["type"], "survey");
        assert_eq!(workers[0]["performance_mode"], "speed");
        assert_eq!(workers[0]["status"], "offline");
        assert!(workers[0]["current_task"].is_null());
    })
    .await;
}

#[tokio::test]
async fn create_rejects_bad_requests() {
    within(async {
        let app = TestFleet::serve().await;

        for body in [
            json!({"count": 0, "type": "survey"}),
            json!({"count": 3001, "type": "survey"}),
            json!({"count": -3, "type": "survey"}),
            json!({"count": "many", "type": "survey"}),
            json!({"type": "survey"}),
            json!({"count": 5, "type": "mining"}),
            json!({"count": 5, "type": "survey", "mode": "turbo"}),
        ] {
            let resp = app.create(body.clone()).await;
            assert_eq!(resp.status(), 400, "{body}");
            let err: Value = resp.json().await.unwrap();
            assert!(err["error"].is_string());
        }
        assert_eq!(app.fleet.read(|f| f.len()).await, 0);
    })
    .await;
}

#[tokio::test]
async fn worker_lifecycle_over_rest() {
    within(async {
        let app = TestFleet::serve().await;
        app.create(json!({"count": 1, "type": "research"})).await;

        let workers = app.get_json("/api/workers").await;
        let id = workers[0]["id"].as_str().unwrap().to_string();

        assert_eq!(app.post(&format!("/api/workers/{id}/start")).await.status(), 204);

        // No clock driver runs here; move virtual time by hand.
        app.fleet.write(|f| f.advance(Duration::from_secs(10))).await;
        let worker = app.get_json(&format!("/api/workers/{id}")).await;
        assert_eq!(worker["status"], "working");
        assert!(worker["current_task"]["progress"].as_u64().unwrap() <= 100);

        let resp = app
            .post_json(
                &format!("/api/workers/{id}/fault"),
                &json!({"message": "disk full"}),
            )
            .await;
        assert_eq!(resp.status(), 204);
        let worker = app.get_json(&format!("/api/workers/{id}")).await;
        assert_eq!(worker["status"], "error");
        assert_eq!(worker["error_count"], 1);

        assert_eq!(app.delete(&format!("/api/workers/{id}")).await.status(), 204);
        let resp = app
            .client
            .get(app.url(&format!("/api/workers/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        assert!(app.fleet.read(|f| f.timers().is_empty()).await);
    })
    .await;
}

#[tokio::test]
async fn unknown_ids_are_accepted_silently() {
    within(async {
        let app = TestFleet::serve().await;

        for action in ["start", "pause", "stop", "fault"] {
            let resp = app.post(&format!("/api/workers/ghost/{action}")).await;
            assert_eq!(resp.status(), 204, "{action}");
        }
        assert_eq!(app.delete("/api/workers/ghost").await.status(), 204);
    })
    .await;
}

#[tokio::test]
async fn fleet_start_stop_and_stats() {
    within(async {
        let app = TestFleet::serve().await;
        app.create(json!({"count": 10, "type": "data-entry"})).await;

        let body: Value = app.post("/api/fleet/start").await.json().await.unwrap();
        assert_eq!(body["affected"], 10);

        app.fleet.write(|f| f.advance(Duration::from_secs(10))).await;
        let stats = app.get_json("/api/stats").await;
        assert_eq!(stats["total_workers"], 10);
        assert_eq!(stats["active_workers"], 10);
        assert_eq!(stats["status"]["working"], 10);
        assert_eq!(stats["top_performers"].as_array().unwrap().len(), 5);

        let body: Value = app.post("/api/fleet/stop").await.json().await.unwrap();
        assert_eq!(body["affected"], 10);
    })
    .await;
}

#[tokio::test]
async fn series_reflect_samples() {
    within(async {
        let app = TestFleet::serve().await;
        app.fleet
            .write(|f| {
                for _ in 0..3 {
                    f.sample_time_series();
                }
            })
            .await;

        let series = app.get_json("/api/series").await;
        assert_eq!(series["performance"].as_array().unwrap().len(), 3);
        assert_eq!(series["earnings"].as_array().unwrap().len(), 3);
    })
    .await;
}

#[tokio::test]
async fn export_then_import_into_fresh_fleet() {
    within(async {
        let source = TestFleet::serve().await;
        source
            .create(json!({"count": 4, "type": "content", "mode": "stealth"}))
            .await;

        let export = source.get_json("/api/export").await;
        assert_eq!(export["workers"].as_array().unwrap().len(), 4);
        assert_eq!(export["workers"][0]["performanceMode"], "stealth");
        assert!(export["exportDate"].is_string());

        let target = TestFleet::serve().await;
        let report: Value = target
            .post_json("/api/import", &export)
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(report["imported"], 4);
        assert_eq!(target.fleet.read(|f| f.len()).await, 4);
    })
    .await;
}

#[tokio::test]
async fn activity_can_be_cleared() {
    within(async {
        let app = TestFleet::serve().await;
        app.create(json!({"count": 2, "type": "survey"})).await;

        let entries = app.get_json("/api/activity").await;
        assert!(entries.as_array().unwrap().len() >= 2);

        assert_eq!(app.delete("/api/activity").await.status(), 204);

        let entries = app.get_json("/api/activity").await;
        let entries = entries.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "Log cleared");
    })
    .await;
}

#[tokio::test]
async fn payouts_empty_when_disabled() {
    within(async {
        let app = TestFleet::serve().await;
        assert!(app.get_json("/api/payouts").await.as_array().unwrap().is_empty());
        assert_eq!(app.post("/api/workers/any/payout").await.status(), 503);
    })
    .await;
}

/// Accepts every payment after a short delay.
struct SlowGateway;

#[async_trait]
impl PaymentGateway for SlowGateway {
    fn name(&self) -> &str {
        "slow"
    }

    async fn send_payment(
        &self,
        _recipient: &str,
        amount: Decimal,
    ) -> Result<PaymentReceipt, PayoutError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(PaymentReceipt {
            reference: format!("slow-{amount}"),
            amount,
        })
    }
}

#[tokio::test]
async fn manual_payout_settles_once() {
    within(async {
        let app = TestFleet::serve_with(|fleet| {
            let service = PayoutService::new(
                Arc::clone(&fleet),
                Arc::new(SlowGateway),
                PayoutPolicy::default(),
                "acct-test",
            );
            fleet_routes(fleet, Some(service))
        })
        .await;
        app.fleet
            .write(|f| {
                f.import(&FleetImport {
                    workers: vec![
                        json!({"id": "rich", "type": "content", "tasksCompleted": 5, "earnings": 10.0}),
                        json!({"id": "poor", "type": "content", "tasksCompleted": 1, "earnings": 0.5}),
                    ],
                })
            })
            .await;

        let (first, second) = tokio::join!(
            app.post("/api/workers/rich/payout"),
            app.post("/api/workers/rich/payout")
        );
        let mut statuses = [first.status().as_u16(), second.status().as_u16()];
        statuses.sort_unstable();
        assert_eq!(statuses, [200, 409]);

        assert_eq!(app.post("/api/workers/poor/payout").await.status(), 400);
        assert_eq!(app.post("/api/workers/ghost/payout").await.status(), 404);

        let history = app.get_json("/api/payouts").await;
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["status"], "completed");
        let net: Decimal = history[0]["net"].as_str().unwrap().parse().unwrap();
        assert_eq!(net, dec!(9.80));
    })
    .await;
}

// ── WebSocket Tests ──────────────────────────────────────────────────

#[tokio::test]
async fn ws_connect_receives_sync() {
    within(async {
        let app = TestFleet::serve().await;
        app.fleet
            .create_workers(3, WorkerType::Survey, PerformanceMode::Balanced)
            .await
            .unwrap();

        let (_ws, sync) = app.connect().await;
        assert_eq!(sync["type"], "sync");
        assert_eq!(sync["workers"].as_array().unwrap().len(), 3);
        assert_eq!(sync["stats"]["total_workers"], 3);
    })
    .await;
}

#[tokio::test]
async fn ws_receives_live_activity() {
    within(async {
        let app = TestFleet::serve().await;
        let (mut ws, _sync) = app.connect().await;

        app.create(json!({"count": 1, "type": "survey"})).await;

        let frame = next_frame(&mut ws).await;
        assert_eq!(frame["type"], "activity");
        assert_eq!(frame["entry"]["level"], "info");
    })
    .await;
}

#[tokio::test]
async fn ws_actions_drive_the_fleet() {
    within(async {
        let app = TestFleet::serve().await;
        app.fleet
            .create_workers(2, WorkerType::Content, PerformanceMode::Balanced)
            .await
            .unwrap();

        let (mut ws, _sync) = app.connect().await;
        ws.send(Message::Text(r#"{"action":"start_all"}"#.into()))
            .await
            .unwrap();

        // The bulk-start summary comes back over the feed once applied.
        loop {
            let frame = next_frame(&mut ws).await;
            if frame["type"] == "activity" && frame["entry"]["message"] == "Started 2 workers" {
                break;
            }
        }
        let idle = app
            .fleet
            .read(|f| f.workers().filter(|w| w.status() == WorkerStatus::Idle).count())
            .await;
        assert_eq!(idle, 2);
    })
    .await;
}
