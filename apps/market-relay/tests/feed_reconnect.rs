//! Feed client behavior against a scripted transport: retry budget, manual
//! reconnect, decode failures and transport loss.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use market_relay::application::ports::{
    EventSink, FeedConnection, FeedTransport, TransportError,
};
use market_relay::domain::market::MatchPrice;
use market_relay::infrastructure::feed::FrameCodec;
use market_relay::{Channel, ConnectionState, FeedClient, FeedSettings, MarketEvent, Symbol};
use metrics_exporter_prometheus::PrometheusBuilder;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Scripted transport
// =============================================================================

enum Step {
    /// Connect fails.
    Fail,
    /// Connect never completes.
    Hang,
    /// Connect completes once the gate is released, then stays open and quiet.
    Gated(Arc<Notify>),
    /// Connect succeeds; the connection yields `frames`, then stays open or
    /// ends depending on `close_after`.
    Open {
        frames: Vec<Vec<u8>>,
        close_after: bool,
    },
}

#[derive(Default)]
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    connects: AtomicUsize,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front().unwrap_or(Step::Hang);
        match step {
            Step::Fail => Err(TransportError::Connect("connection refused".into())),
            Step::Hang => std::future::pending().await,
            Step::Gated(gate) => {
                gate.notified().await;
                Ok(Box::new(ScriptedConnection {
                    frames: VecDeque::new(),
                    close_after: false,
                    sent: Arc::clone(&self.sent),
                }))
            }
            Step::Open {
                frames,
                close_after,
            } => Ok(Box::new(ScriptedConnection {
                frames: frames.into(),
                close_after,
                sent: Arc::clone(&self.sent),
            })),
        }
    }
}

struct ScriptedConnection {
    frames: VecDeque<Vec<u8>>,
    close_after: bool,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[async_trait]
impl FeedConnection for ScriptedConnection {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        if let Some(frame) = self.frames.pop_front() {
            return Some(Ok(frame));
        }
        if self.close_after {
            return None;
        }
        std::future::pending().await
    }

    async fn close(&mut self) {}
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<MarketEvent>>,
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: MarketEvent) {
        self.events.lock().push(event);
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    client: Arc<FeedClient>,
    transport: Arc<ScriptedTransport>,
    sink: Arc<RecordingSink>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

fn start(steps: Vec<Step>, max_attempts: u32) -> Harness {
    let mut settings = FeedSettings::new("ws://upstream.test/feed");
    settings.reconnect_delay = Duration::from_millis(10);
    settings.max_reconnect_attempts = max_attempts;
    settings.connect_timeout = Duration::from_secs(30);

    let transport = ScriptedTransport::new(steps);
    let sink = Arc::new(RecordingSink::default());
    let universe: Vec<Symbol> = vec!["VIC".into(), "VHM".into()];
    let cancel = CancellationToken::new();

    let client = Arc::new(FeedClient::new(
        settings,
        transport.clone(),
        Arc::new(universe),
        sink.clone(),
        cancel.clone(),
    ));
    let task = tokio::spawn(Arc::clone(&client).run());

    Harness {
        client,
        transport,
        sink,
        cancel,
        task,
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

fn vic_frame() -> Vec<u8> {
    let event: MatchPrice = serde_json::from_value(json!({
        "symbol": "VIC",
        "matchPrice": "45.1",
        "matchVolume": 100,
    }))
    .unwrap();
    FrameCodec::new()
        .encode_event(Channel::MatchPrice, &event)
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn exhausts_after_max_attempts_and_stops_trying() {
    let h = start(vec![Step::Fail, Step::Fail, Step::Fail], 3);
    let state = h.client.state();

    eventually("exhausted", || state.get_state() == ConnectionState::Exhausted).await;
    assert_eq!(state.get_attempts(), 3);
    assert_eq!(h.transport.connects(), 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.transport.connects(), 3);
    assert_eq!(state.get_state(), ConnectionState::Exhausted);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn manual_reconnect_leaves_exhausted_with_fresh_budget() {
    let h = start(vec![Step::Fail, Step::Fail, Step::Fail, Step::Hang], 3);
    let state = h.client.state();

    eventually("exhausted", || state.get_state() == ConnectionState::Exhausted).await;

    h.client.reconnect();

    eventually("fourth connect", || h.transport.connects() == 4).await;
    assert_eq!(state.get_state(), ConnectionState::Connecting);
    assert_eq!(state.get_attempts(), 0);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn successful_connect_subscribes_every_channel() {
    let h = start(
        vec![Step::Open {
            frames: vec![vic_frame()],
            close_after: false,
        }],
        3,
    );
    let state = h.client.state();

    eventually("event delivered", || h.sink.events.lock().len() == 1).await;
    assert_eq!(state.get_state(), ConnectionState::Subscribed);
    assert_eq!(h.transport.sent.lock().len(), Channel::all().len());

    let status = h.client.status();
    assert_eq!(status.subscribed_symbols, 2);
    assert_eq!(status.events_received, 1);
    assert!(status.last_connected_at.is_some());

    h.cancel.cancel();
    h.task.await.unwrap();
    assert_eq!(state.get_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn undecodable_frames_are_dropped_without_closing() {
    let h = start(
        vec![Step::Open {
            frames: vec![b"not msgpack".to_vec(), vic_frame()],
            close_after: false,
        }],
        3,
    );
    let state = h.client.state();

    eventually("valid frame after bad one", || h.sink.events.lock().len() == 1).await;
    assert_eq!(state.get_decode_errors(), 1);
    assert_eq!(state.get_events_received(), 1);
    assert_eq!(h.transport.connects(), 1);
    assert_eq!(state.get_state(), ConnectionState::Subscribed);
    assert_eq!(h.sink.events.lock()[0].symbol(), "VIC");

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn transport_loss_retries_without_spending_budget() {
    let h = start(
        vec![
            Step::Fail,
            Step::Open {
                frames: vec![vic_frame()],
                close_after: true,
            },
            Step::Hang,
        ],
        2,
    );
    let state = h.client.state();

    eventually("reconnect after loss", || h.transport.connects() == 3).await;
    assert_eq!(state.get_attempts(), 0);
    assert_eq!(state.get_state(), ConnectionState::Connecting);
    assert_eq!(h.sink.events.lock().len(), 1);
    assert_eq!(
        h.client.status().last_error.as_deref(),
        Some("connection closed by peer")
    );

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn reconnect_during_connect_keeps_the_new_connection() {
    let gate = Arc::new(Notify::new());
    let h = start(vec![Step::Gated(Arc::clone(&gate)), Step::Hang], 3);
    let state = h.client.state();

    eventually("connect in flight", || h.transport.connects() == 1).await;
    assert_eq!(state.get_state(), ConnectionState::Connecting);

    h.client.reconnect();
    gate.notify_one();

    eventually("subscribed", || state.get_state() == ConnectionState::Subscribed).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.get_state(), ConnectionState::Subscribed);
    assert_eq!(h.transport.connects(), 1);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[test]
fn every_connect_attempt_is_counted() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let h = start(
                    vec![
                        Step::Fail,
                        Step::Open {
                            frames: vec![],
                            close_after: false,
                        },
                    ],
                    3,
                );
                let state = h.client.state();
                eventually("subscribed", || state.get_state() == ConnectionState::Subscribed)
                    .await;
                h.cancel.cancel();
                h.task.await.unwrap();
            });
    });

    let rendered = handle.render();
    assert!(
        rendered.contains("market_relay_connect_attempts_total 2"),
        "{rendered}"
    );
}
