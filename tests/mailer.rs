//! End-to-end tests for the mailer worker.
//!
//! Each test binds the real registry on an in-memory bus, with a recording
//! mail provider in place of Mailgun, and talks to it through bus requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tokio::time::timeout;

use onasty_mailer::bus::{MemoryBus, Transport, TransportError};
use onasty_mailer::context::SharedContext;
use onasty_mailer::dispatch::{self, Registry};
use onasty_mailer::mail::{DeliveryError, MailProvider, OutboundEmail};
use onasty_mailer::template::TemplateRenderer;

/// Maximum time any request may take before we consider the worker hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Records every email instead of sending it. Optionally fails every send.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    fail: bool,
}

impl RecordingMailer {
    fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailProvider for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        self.sent.lock().await.push(email.clone());
        if self.fail {
            return Err(DeliveryError::Rejected {
                status: 400,
                body: "recipient rejected".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct Worker {
    bus: MemoryBus,
    mailer: Arc<RecordingMailer>,
    _loops: JoinSet<String>,
}

async fn start_worker(mailer: RecordingMailer) -> Worker {
    let bus = MemoryBus::new();
    let mailer = Arc::new(mailer);
    let ctx = SharedContext::new(
        Arc::clone(&mailer) as Arc<dyn MailProvider>,
        TemplateRenderer::new("https://onasty.test"),
    );
    let registry = Registry::new(Arc::new(ctx));
    let loops = dispatch::spawn_all(&bus, &registry).await.unwrap();

    Worker {
        bus,
        mailer,
        _loops: loops,
    }
}

async fn request(bus: &MemoryBus, subject: &str, payload: &[u8]) -> Value {
    let reply = bus
        .request(subject, payload.to_vec(), TEST_TIMEOUT)
        .await
        .expect("worker should reply");
    serde_json::from_slice(&reply).expect("reply should be JSON")
}

fn send_payload(receiver: &str, template: &str, options: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "receiver": receiver,
        "templateName": template,
        "options": options,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_ping_replies_pong() {
    let worker = start_worker(RecordingMailer::default()).await;

    let payloads: [&[u8]; 3] = [b"", b"garbage", br#"{"message":"ping"}"#];
    for payload in payloads {
        let reply = request(&worker.bus, "mailer.ping", payload).await;
        assert_eq!(reply, json!({ "message": "pong" }));
    }
    assert!(worker.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_send_email_verification() {
    let worker = start_worker(RecordingMailer::default()).await;

    let reply = request(
        &worker.bus,
        "mailer.send",
        &send_payload("user@example.com", "email_verification", json!({ "token": "abc123" })),
    )
    .await;
    assert_eq!(reply, json!({ "ok": true }));

    let sent = worker.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "user@example.com");
    assert_eq!(sent[0].subject, "Onasty: verify your email");
    assert_eq!(sent[0].html.matches("/api/v1/auth/verify/abc123").count(), 2);
    assert!(sent[0]
        .html
        .contains("href=\"https://onasty.test/api/v1/auth/verify/abc123\""));
}

#[tokio::test]
async fn test_send_accepts_snake_case_template_field() {
    let worker = start_worker(RecordingMailer::default()).await;

    let payload = json!({
        "request_id": "req-42",
        "receiver": "user@example.com",
        "template_name": "email_verification",
        "options": { "token": "xyz" },
    });
    let reply = request(&worker.bus, "mailer.send", payload.to_string().as_bytes()).await;

    assert_eq!(reply, json!({ "ok": true }));
    assert_eq!(worker.mailer.sent().await.len(), 1);
}

#[tokio::test]
async fn test_unknown_template_is_rejected_without_delivery() {
    let worker = start_worker(RecordingMailer::default()).await;

    let reply = request(
        &worker.bus,
        "mailer.send",
        &send_payload("user@example.com", "password_reset", json!({ "token": "t" })),
    )
    .await;

    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["code"], json!("unknown_template"));
    assert!(worker.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_missing_parameter_is_rejected_without_delivery() {
    let worker = start_worker(RecordingMailer::default()).await;

    let reply = request(
        &worker.bus,
        "mailer.send",
        &send_payload("user@example.com", "email_verification", json!({})),
    )
    .await;

    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["code"], json!("missing_parameter"));
    assert!(worker.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_malformed_payload_still_gets_a_reply() {
    let worker = start_worker(RecordingMailer::default()).await;

    let reply = request(&worker.bus, "mailer.send", b"{not json").await;

    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["code"], json!("decode_error"));
    assert!(worker.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_delivery_failure_is_reported() {
    let worker = start_worker(RecordingMailer::failing()).await;

    let reply = request(
        &worker.bus,
        "mailer.send",
        &send_payload("user@example.com", "email_verification", json!({ "token": "t" })),
    )
    .await;

    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["code"], json!("delivery_error"));
    assert_eq!(
        reply["error"],
        json!("Delivery failed: Mail provider rejected message with status 400")
    );
    assert!(!reply["error"].as_str().unwrap().contains("recipient rejected"));
    assert_eq!(worker.mailer.sent().await.len(), 1);

    // The loop keeps serving after a failure.
    let reply = request(&worker.bus, "mailer.ping", b"").await;
    assert_eq!(reply, json!({ "message": "pong" }));
}

#[tokio::test]
async fn test_sends_keep_delivery_order() {
    let worker = start_worker(RecordingMailer::default()).await;

    // Fire-and-forget publishes queue up on the subscription in order.
    for i in 0..20 {
        let payload = send_payload(
            &format!("user{}@example.com", i),
            "email_verification",
            json!({ "token": format!("token-{}", i) }),
        );
        worker.bus.publish("mailer.send", payload).await.unwrap();
    }

    // A request queued behind them is answered only after they are handled.
    let reply = request(
        &worker.bus,
        "mailer.send",
        &send_payload("last@example.com", "email_verification", json!({ "token": "last" })),
    )
    .await;
    assert_eq!(reply, json!({ "ok": true }));

    let receivers: Vec<String> = worker.mailer.sent().await.into_iter().map(|e| e.to).collect();
    let mut expected: Vec<String> = (0..20).map(|i| format!("user{}@example.com", i)).collect();
    expected.push("last@example.com".to_string());
    assert_eq!(receivers, expected);
}

/// Holds every send until released, so a `mailer.send` can be kept in flight.
struct BlockingMailer {
    release: Notify,
    started: Notify,
}

#[async_trait]
impl MailProvider for BlockingMailer {
    async fn send(&self, _email: &OutboundEmail) -> Result<(), DeliveryError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "blocking"
    }
}

#[tokio::test]
async fn test_slow_send_does_not_block_other_subjects() {
    let bus = MemoryBus::new();
    let mailer = Arc::new(BlockingMailer {
        release: Notify::new(),
        started: Notify::new(),
    });
    let ctx = SharedContext::new(
        Arc::clone(&mailer) as Arc<dyn MailProvider>,
        TemplateRenderer::new("https://onasty.test"),
    );
    let registry = Registry::new(Arc::new(ctx));
    let _loops = dispatch::spawn_all(&bus, &registry).await.unwrap();

    let first = {
        let bus = bus.clone();
        tokio::spawn(async move {
            let payload =
                send_payload("first@example.com", "email_verification", json!({ "token": "1" }));
            request(&bus, "mailer.send", &payload).await
        })
    };
    timeout(TEST_TIMEOUT, mailer.started.notified())
        .await
        .expect("first send should reach the provider");

    // Another subject is served while the send is stuck.
    let pong = timeout(Duration::from_millis(500), request(&bus, "mailer.ping", b""))
        .await
        .expect("ping should not wait for the send");
    assert_eq!(pong, json!({ "message": "pong" }));

    // The same subject does not start a second send.
    let second = bus
        .request(
            "mailer.send",
            send_payload("second@example.com", "email_verification", json!({ "token": "2" })),
            Duration::from_millis(200),
        )
        .await;
    assert!(matches!(second, Err(TransportError::Timeout(_))));

    mailer.release.notify_one();
    let reply = timeout(TEST_TIMEOUT, first).await.unwrap().unwrap();
    assert_eq!(reply, json!({ "ok": true }));
}
