//! Client WebSocket sessions over a real socket.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use market_relay::application::ports::EventSink;
use market_relay::domain::market::MatchPrice;
use market_relay::{ApiServer, ApiState, BroadcastHub, MarketEvent, Orchestrator, Snapshot};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn next_json(socket: &mut Socket) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("message within timeout")
        .expect("socket open")
        .unwrap();
    serde_json::from_str(message.to_text().unwrap()).unwrap()
}

async fn send_json(socket: &mut Socket, value: &Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn subscribe_receive_and_disconnect() {
    let snapshot = Arc::new(Snapshot::new());
    let hub = Arc::new(BroadcastHub::with_defaults());
    let orchestrator = Orchestrator::new(Arc::clone(&snapshot), hub.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let server = ApiServer::new(
        addr.port(),
        ApiState::new(Arc::clone(&snapshot), hub.clone()),
        cancel.clone(),
    );
    let server_task = tokio::spawn(server.serve(listener));

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    send_json(
        &mut socket,
        &json!({"event": "subscribe-matchPrice", "data": {"symbols": ["VIC"]}}),
    )
    .await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["event"], "subscribed");
    assert_eq!(reply["data"]["symbols"], json!(["VIC"]));

    let event: MatchPrice = serde_json::from_value(json!({
        "symbol": "VIC",
        "matchPrice": "45.1",
        "matchVolume": 100,
    }))
    .unwrap();
    orchestrator.on_event(MarketEvent::MatchPrice(event));

    let delivered = next_json(&mut socket).await;
    assert_eq!(delivered["event"], "matchPrice");
    assert_eq!(delivered["data"]["symbol"], "VIC");

    send_json(&mut socket, &json!({"event": "subscribe-quotes"})).await;
    let rejected = next_json(&mut socket).await;
    assert_eq!(rejected["event"], "error");

    socket.close(None).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.stats().clients > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client removed after close");
    assert_eq!(hub.stats().total_subscriptions(), 0);
    assert!(hub.check_invariant());

    cancel.cancel();
    server_task.await.unwrap().unwrap();
}
