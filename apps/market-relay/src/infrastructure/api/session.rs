//! Client WebSocket Sessions
//!
//! One task per connected client. The task registers with the hub, forwards
//! its outbound queue to the socket, and applies subscription commands read
//! from the socket. The client is removed from the hub when either side
//! closes.
//!
//! # Wire Format
//!
//! ```text
//! client -> relay  {"event": "subscribe-matchPrice",   "data": {"symbols": ["VIC", "VHM"]}}
//!                  {"event": "unsubscribe-bidAsk",     "data": {"symbols": ["VIC"]}}
//! relay  -> client {"event": "subscribed",   "data": {"kind": "matchPrice", "symbols": ["VIC", "VHM"]}}
//!                  {"event": "unsubscribed", "data": {"kind": "bidAsk", "symbols": ["VIC"]}}
//!                  {"event": "error",        "data": {"message": "unknown event: hello"}}
//!                  {"event": "matchPrice",   "data": {"symbol": "VIC", ...}}
//! ```
//!
//! Command replies list only the symbols that actually changed.

use std::str::FromStr;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::domain::market::Symbol;
use crate::domain::subscription::{ClientHandle, SubscriptionKind, UnknownKind};
use crate::infrastructure::broadcast::{BroadcastHub, HubError, SharedBroadcastHub};

const SUBSCRIBE_PREFIX: &str = "subscribe-";
const UNSUBSCRIBE_PREFIX: &str = "unsubscribe-";

// =============================================================================
// Commands
// =============================================================================

/// Subscription command sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientCommand {
    /// `subscribe-<kind>` or `unsubscribe-<kind>`.
    pub event: String,
    /// Symbols to add or remove.
    #[serde(default)]
    pub data: SymbolList,
}

/// `{"symbols": [...]}` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolList {
    /// Symbols named by the command.
    #[serde(default)]
    pub symbols: Vec<Symbol>,
}

/// Reply to a client command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum CommandReply {
    /// Symbols newly subscribed.
    Subscribed {
        /// Subscription kind.
        kind: SubscriptionKind,
        /// Symbols added.
        symbols: Vec<Symbol>,
    },
    /// Symbols removed.
    Unsubscribed {
        /// Subscription kind.
        kind: SubscriptionKind,
        /// Symbols removed.
        symbols: Vec<Symbol>,
    },
    /// Rejected command.
    Error {
        /// Why the command was rejected.
        message: String,
    },
}

/// Reasons a client command is rejected.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Message was not a JSON command.
    #[error("invalid command: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Event name is neither a subscribe nor an unsubscribe.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Event names a kind that cannot be subscribed to.
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),

    /// Hub rejected the command.
    #[error(transparent)]
    Hub(#[from] HubError),
}

enum Action {
    Subscribe,
    Unsubscribe,
}

fn parse_event(event: &str) -> Result<(Action, SubscriptionKind), CommandError> {
    let (action, kind) = if let Some(kind) = event.strip_prefix(SUBSCRIBE_PREFIX) {
        (Action::Subscribe, kind)
    } else if let Some(kind) = event.strip_prefix(UNSUBSCRIBE_PREFIX) {
        (Action::Unsubscribe, kind)
    } else {
        return Err(CommandError::UnknownEvent(event.to_string()));
    };
    Ok((action, SubscriptionKind::from_str(kind)?))
}

fn apply_command(
    hub: &BroadcastHub,
    client: ClientHandle,
    text: &str,
) -> Result<CommandReply, CommandError> {
    let command: ClientCommand = serde_json::from_str(text)?;
    let symbols = command.data.symbols;

    match parse_event(&command.event)? {
        (Action::Subscribe, kind) => Ok(CommandReply::Subscribed {
            kind,
            symbols: hub.subscribe(client, kind, &symbols)?,
        }),
        (Action::Unsubscribe, kind) => Ok(CommandReply::Unsubscribed {
            kind,
            symbols: hub.unsubscribe(client, kind, &symbols)?,
        }),
    }
}

/// Apply one text command from `client` to the hub.
///
/// Rejected commands become [`CommandReply::Error`]; they never end the
/// session.
pub fn handle_command(hub: &BroadcastHub, client: ClientHandle, text: &str) -> CommandReply {
    apply_command(hub, client, text).unwrap_or_else(|e| {
        tracing::debug!(client = %client, error = %e, "Rejected client command");
        CommandReply::Error {
            message: e.to_string(),
        }
    })
}

// =============================================================================
// Session Loop
// =============================================================================

pub(super) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state.hub))
}

async fn run_session(socket: WebSocket, hub: SharedBroadcastHub) {
    let (client, mut outbound) = hub.connect();
    let (mut sink, mut stream) = socket.split();
    tracing::info!(client = %client, "Client session opened");

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else { break };
                if sink.send(Message::Text(message.to_string().into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_command(&hub, client, text.as_str());
                    let Ok(reply) = serde_json::to_string(&reply) else { continue };
                    if sink.send(Message::Text(reply.into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(client = %client, error = %e, "Client socket error");
                    break;
                }
            },
        }
    }

    hub.disconnect(client);
    tracing::info!(client = %client, "Client session closed");
}
