//! ShapeSync WebSocket Server
//!
//! Binds each network connection to an identity, feeds identity-attributed
//! mutation requests into the core engine, and streams committed row events
//! back to every subscriber in commit order.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "create_shape", "kind": "circle", "x": 100, "y": 100, "width": 50, "height": 50, "color": "#ff0000" }
//! { "type": "move_shape", "shape_id": 1, "x": 120, "y": 80 }
//! { "type": "update_cursor", "x": 40, "y": 60 }
//! ```
//! Downstream the client first receives `welcome` and `snapshot`, then one
//! `event` per commit.

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use shapesync_core::{
    Commit, Engine, Identity, MutationResult, ShapeId, ShapeKind, ShapePatch, Snapshot,
};
use std::net::SocketAddr;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// A mutation request from a client.
///
/// There is deliberately no identity field anywhere in here: every request
/// is attributed to the identity bound to the connection it arrived on, and
/// the self-referencing operations (`set_user_name`, `update_cursor`)
/// always target that identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientRequest {
    CreateShape {
        kind: ShapeKind,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: String,
    },
    MoveShape {
        shape_id: ShapeId,
        x: f64,
        y: f64,
    },
    UpdateShape {
        shape_id: ShapeId,
        #[serde(flatten)]
        patch: ShapePatch,
    },
    DeleteShape {
        shape_id: ShapeId,
    },
    SetUserName {
        name: String,
    },
    UpdateCursor {
        x: f64,
        y: f64,
    },
}

/// A message pushed to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    /// The identity bound to this connection, sent once on connect. The
    /// client stores it and presents it again when reconnecting.
    Welcome { identity: Identity },
    /// Full table contents; sent on subscribe and again after a lag reset.
    Snapshot {
        #[serde(flatten)]
        snapshot: Snapshot,
    },
    /// One committed row event, delivered in commit order.
    Event {
        #[serde(flatten)]
        commit: Commit,
    },
    /// A rejected or malformed request. The connection stays open.
    Error { message: String },
}

#[derive(Debug, Default, Deserialize)]
struct ConnectParams {
    /// Hex identity token from a previous session, if the client has one.
    identity: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shapesync_server=info,tower_http=info".into()),
        )
        .init();

    let engine = Engine::new();

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(engine);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3030));
    info!("ShapeSync server listening on {}", addr);
    info!("WebSocket endpoint: ws://localhost:3030/ws");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Index page
async fn index() -> &'static str {
    "ShapeSync Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(engine): State<Engine>,
) -> impl IntoResponse {
    // Returning clients present their token again; anything unparseable
    // gets a fresh identity rather than an error.
    let identity = params
        .identity
        .as_deref()
        .and_then(|token| token.parse().ok())
        .unwrap_or_else(Identity::generate);
    ws.on_upgrade(move |socket| handle_socket(socket, engine, identity))
}

/// Handle one WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, engine: Engine, identity: Identity) {
    info!("connection opened for {}", identity);
    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = engine.on_connect(identity) {
        warn!("connect bookkeeping failed for {}: {}", identity, e);
        return;
    }

    let subscription = match engine.subscribe() {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("subscribe failed for {}: {}", identity, e);
            let _ = engine.on_disconnect(identity);
            return;
        }
    };
    let mut events = subscription.events;

    let joined = send_json(&mut sender, &ServerMessage::Welcome { identity }).await.is_ok()
        && send_json(
            &mut sender,
            &ServerMessage::Snapshot {
                snapshot: subscription.snapshot,
            },
        )
        .await
        .is_ok();

    if joined {
        loop {
            tokio::select! {
                // Handle incoming mutation requests from the client
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientRequest>(&text) {
                                Ok(request) => {
                                    if let Err(e) = dispatch(&engine, identity, request) {
                                        warn!("rejected mutation from {}: {}", identity, e);
                                        let err = ServerMessage::Error { message: e.to_string() };
                                        if send_json(&mut sender, &err).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                                Err(e) => {
                                    warn!("invalid request from {}: {}", identity, e);
                                    let err = ServerMessage::Error {
                                        message: format!("invalid request: {}", e),
                                    };
                                    if send_json(&mut sender, &err).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {} // Ignore ping/pong
                        Some(Err(e)) => {
                            warn!("websocket error for {}: {}", identity, e);
                            break;
                        }
                    }
                }

                // Forward committed events in commit order
                event = events.recv() => {
                    match event {
                        Ok(commit) => {
                            if send_json(&mut sender, &ServerMessage::Event { commit }).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            // Fell too far behind the writer: resubscribe and
                            // resend a full snapshot instead of blocking it.
                            warn!("subscriber {} lagged by {} events, resyncing", identity, missed);
                            let fresh = match engine.subscribe() {
                                Ok(fresh) => fresh,
                                Err(e) => {
                                    warn!("resubscribe failed for {}: {}", identity, e);
                                    break;
                                }
                            };
                            events = fresh.events;
                            let snapshot = ServerMessage::Snapshot { snapshot: fresh.snapshot };
                            if send_json(&mut sender, &snapshot).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    // Exactly once per session termination, normal or abnormal.
    if let Err(e) = engine.on_disconnect(identity) {
        warn!("disconnect bookkeeping failed for {}: {}", identity, e);
    }
    info!("connection closed for {}", identity);
}

/// Route one request to the reducer it names, attributed to `identity`.
fn dispatch(engine: &Engine, identity: Identity, request: ClientRequest) -> MutationResult<()> {
    match request {
        ClientRequest::CreateShape {
            kind,
            x,
            y,
            width,
            height,
            color,
        } => engine
            .create_shape(identity, kind, x, y, width, height, color)
            .map(|_| ()),
        ClientRequest::MoveShape { shape_id, x, y } => engine.move_shape(shape_id, x, y),
        ClientRequest::UpdateShape { shape_id, patch } => engine.update_shape(shape_id, patch),
        ClientRequest::DeleteShape { shape_id } => engine.delete_shape(shape_id),
        ClientRequest::SetUserName { name } => engine.set_user_name(identity, name),
        ClientRequest::UpdateCursor { x, y } => engine.update_cursor(identity, x, y),
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap();
    sender.send(Message::Text(json.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_shape_request() {
        let json = r##"{"type":"create_shape","kind":"circle","x":100,"y":100,"width":50,"height":50,"color":"#ff0000"}"##;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        match request {
            ClientRequest::CreateShape { kind, width, .. } => {
                assert_eq!(kind, ShapeKind::Circle);
                assert_eq!(width, 50.0);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_parse_update_shape_with_partial_fields() {
        let json = r##"{"type":"update_shape","shape_id":3,"color":"#00ff00"}"##;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        match request {
            ClientRequest::UpdateShape { shape_id, patch } => {
                assert_eq!(shape_id, 3);
                assert_eq!(patch.color.as_deref(), Some("#00ff00"));
                assert_eq!(patch.width, None);
                assert_eq!(patch.height, None);
                assert_eq!(patch.rotation, None);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected_at_the_boundary() {
        let json = r##"{"type":"create_shape","kind":"triangle","x":0,"y":0,"width":1,"height":1,"color":"#fff"}"##;
        assert!(serde_json::from_str::<ClientRequest>(json).is_err());
    }

    #[test]
    fn test_event_message_wire_format() {
        let engine = Engine::new();
        let identity = Identity::generate();
        engine.on_connect(identity).unwrap();
        let mut subscription = engine.subscribe().unwrap();
        engine.update_cursor(identity, 7.0, 8.0).unwrap();

        let commit = subscription.events.try_recv().unwrap();
        let msg = ServerMessage::Event { commit };
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["op"], "user_updated");
        assert_eq!(value["row"]["cursor_x"], 7.0);
    }

    #[test]
    fn test_snapshot_message_wire_format() {
        let engine = Engine::new();
        let identity = Identity::generate();
        engine.on_connect(identity).unwrap();
        engine
            .create_shape(identity, ShapeKind::Rectangle, 0.0, 0.0, 5.0, 5.0, "#abc".into())
            .unwrap();

        let subscription = engine.subscribe().unwrap();
        let msg = ServerMessage::Snapshot {
            snapshot: subscription.snapshot,
        };
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["users"].as_array().unwrap().len(), 1);
        assert_eq!(value["shapes"].as_array().unwrap().len(), 1);
        assert_eq!(value["seq"], 2);
    }

    #[test]
    fn test_dispatch_attributes_identity_from_connection() {
        let engine = Engine::new();
        let identity = Identity::generate();
        engine.on_connect(identity).unwrap();

        dispatch(
            &engine,
            identity,
            ClientRequest::SetUserName {
                name: "lin".to_string(),
            },
        )
        .unwrap();

        assert_eq!(
            engine.user(identity).unwrap().unwrap().name.as_deref(),
            Some("lin")
        );
    }
}
