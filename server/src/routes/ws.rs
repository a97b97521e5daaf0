//! WebSocket handler: bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client frames: parse and dispatch by syscall prefix
//! - Broadcast frames from board peers: forward to client
//!
//! Handler functions are pure business logic. They validate, mutate state,
//! and return an `Outcome`. The dispatch layer owns all outbound concerns:
//! frame logging, reply to sender, and broadcast to peers.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade: send `session:connected` with `client_id` and identity
//! 2. Client sends frames: dispatch, handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast / both)
//! 4. Close: release locks, clear cursor, broadcast `board:part`
//!
//! Cursor moves and drags are ephemeral. They are neither logged at info
//! level nor written to the frame log.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use canvas::doc::{ObjectId, PartialShape, Shape, ShapeKind};
use canvas::lock::LockHolder;
use canvas::order::ReorderOp;
use rand::seq::IndexedRandom;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame, Status, now_ms};
use crate::services;
use crate::services::object::NewObject;
use crate::state::{Actor, AppState, ConnectedClient};

/// Colors handed to clients that don't pick one.
const PALETTE: &[&str] = &[
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#14b8a6", "#3b82f6", "#8b5cf6", "#ec4899",
];

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send frames directly.
#[derive(Debug)]
enum Outcome {
    /// Send done+data to the sender and a copy to every peer.
    /// Sender's copy carries `parent_id` for correlation.
    Broadcast(Data),
    /// Send data to all board peers EXCLUDING sender. No reply to sender.
    /// Used for cursor moves and drags.
    BroadcastExcludeSender(Data),
    /// Send done+data to sender only.
    Reply(Data),
    /// Send empty done to sender only.
    Done,
    /// Reply to sender with one payload, broadcast different data to peers.
    ReplyAndBroadcast { reply: Data, broadcast: Data },
    /// Nothing to send.
    Silent,
}

// =============================================================================
// SESSION
// =============================================================================

/// Per-connection state.
pub(crate) struct Session {
    pub(crate) client_id: Uuid,
    pub(crate) user: ConnectedClient,
    /// Board this connection has joined, if any.
    pub(crate) board: Option<Uuid>,
    /// Sender half registered with joined boards for broadcasts.
    pub(crate) tx: mpsc::Sender<Frame>,
}

impl Session {
    pub(crate) fn new(user: ConnectedClient, tx: mpsc::Sender<Frame>) -> Self {
        Self { client_id: Uuid::new_v4(), user, board: None, tx }
    }

    fn actor(&self) -> Actor {
        Actor { client_id: self.client_id, user_id: self.user.user_id }
    }

    fn holder(&self) -> LockHolder {
        LockHolder { client_id: self.client_id, user_id: self.user.user_id, user_name: self.user.name.clone() }
    }
}

/// Identity from `?user_id=&name=&color=`. Missing values are generated.
fn identity_from_params(params: &HashMap<String, String>) -> ConnectedClient {
    let user_id = params
        .get("user_id")
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(Uuid::new_v4);
    let name = params
        .get("name")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map_or_else(|| "anonymous".to_string(), str::to_string);
    let color = params
        .get("color")
        .filter(|s| !s.is_empty())
        .cloned()
        .or_else(|| PALETTE.choose(&mut rand::rng()).map(|c| (*c).to_string()))
        .unwrap_or_else(|| "#3b82f6".to_string());
    ConnectedClient { user_id, name, color }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = identity_from_params(&params);
    ws.on_upgrade(move |socket| run_ws(socket, state, user))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user: ConnectedClient) {
    // Per-connection channel for receiving broadcast frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);
    let mut session = Session::new(user, client_tx);

    let welcome = Frame::request("session:connected", Data::new())
        .with_data("client_id", session.client_id.to_string())
        .with_data("user_id", session.user.user_id.to_string())
        .with_data("name", session.user.name.clone())
        .with_data("color", session.user.color.clone());
    if send_frame(&mut socket, &state, &welcome).await.is_err() {
        return;
    }

    info!(client_id = %session.client_id, user_id = %session.user.user_id, name = %session.user.name, "ws: client connected");

    'session: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut session, &text).await;
                        for frame in replies {
                            if send_frame(&mut socket, &state, &frame).await.is_err() {
                                break 'session;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &state, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    leave_board(&state, &mut session, "disconnect").await;
    info!(client_id = %session.client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Keeps websocket transport concerns separate from frame handling so tests
/// can drive dispatch without a socket.
pub(crate) async fn process_inbound_text(state: &AppState, session: &mut Session, text: &str) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(client_id = %session.client_id, error = %e, "ws: invalid inbound frame");
            return vec![Frame::gateway_error("E_INVALID_FRAME", format!("invalid json: {e}"))];
        }
    };

    // The connection's identity is authoritative, not the client's claim.
    req.from = Some(session.user.user_id.to_string());
    if let Some(board_id) = session.board {
        req.board_id.get_or_insert(board_id);
    }

    if !is_ephemeral(&req.syscall) {
        info!(client_id = %session.client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");
        services::persistence::enqueue_frame(state, &req);
    }

    let result = match req.prefix() {
        "board" => handle_board(state, session, &req).await,
        "object" => handle_object(state, session, &req).await,
        "lock" => handle_lock(state, session, &req).await,
        "cursor" => Ok(handle_cursor(state, session, &req).await),
        "history" => handle_history(state, session, &req).await,
        prefix => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    // Apply outcome. The dispatch layer owns all outbound logic.
    let board_id = session.board;
    let client_id = session.client_id;
    match result {
        Ok(Outcome::Broadcast(data)) => {
            let sender_frame = req.done_with(data);
            // Peers get a copy without parent_id (they didn't originate the request).
            let mut peer_frame = sender_frame.clone();
            peer_frame.id = Uuid::new_v4();
            peer_frame.parent_id = None;
            if let Some(bid) = board_id {
                services::board::broadcast(state, bid, &peer_frame, Some(client_id)).await;
            }
            vec![sender_frame]
        }
        Ok(Outcome::BroadcastExcludeSender(data)) => {
            if let Some(bid) = board_id {
                let mut frame = Frame::notice(bid, req.syscall.clone());
                frame.data = data;
                frame.from = req.from.clone();
                services::board::broadcast(state, bid, &frame, Some(client_id)).await;
            }
            vec![]
        }
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Ok(Outcome::ReplyAndBroadcast { reply, broadcast }) => {
            let sender_frame = req.done_with(reply);
            if let Some(bid) = board_id {
                let mut notice = Frame::notice(bid, req.syscall.clone());
                notice.data = broadcast;
                services::board::broadcast(state, bid, &notice, Some(client_id)).await;
            }
            vec![sender_frame]
        }
        Ok(Outcome::Silent) => vec![],
        Err(err_frame) => vec![err_frame],
    }
}

/// Part the current board and tell peers what the connection left behind.
pub(crate) async fn leave_board(state: &AppState, session: &mut Session, reason: &str) {
    let Some(board_id) = session.board.take() else {
        return;
    };
    let cleanup = services::board::part_board(state, board_id, session.client_id).await;
    let client_id = session.client_id.to_string();

    if !cleanup.released_locks.is_empty() {
        let ids: Vec<String> = cleanup.released_locks.iter().map(ToString::to_string).collect();
        let frame = Frame::notice(board_id, "lock:release")
            .with_data("ids", json!(ids))
            .with_data("client_id", client_id.clone())
            .with_data("reason", reason);
        services::board::broadcast(state, board_id, &frame, None).await;
    }
    if cleanup.cursor_cleared {
        let frame = Frame::notice(board_id, "cursor:clear")
            .with_data("client_id", client_id.clone());
        services::board::broadcast(state, board_id, &frame, None).await;
    }

    let frame = Frame::notice(board_id, "board:part")
        .with_data("client_id", client_id)
        .with_data("user_id", session.user.user_id.to_string());
    services::board::broadcast(state, board_id, &frame, None).await;
}

// =============================================================================
// BOARD HANDLERS
// =============================================================================

async fn handle_board(state: &AppState, session: &mut Session, req: &Frame) -> Result<Outcome, Frame> {
    match req.op() {
        "join" => {
            let Some(board_id) = uuid_field(req, "board_id").or(req.board_id) else {
                return Err(req.error("board_id required"));
            };

            // Part current board if already joined.
            leave_board(state, session, "part").await;

            let snapshot = services::board::join_board(
                state,
                board_id,
                session.client_id,
                session.user.clone(),
                session.tx.clone(),
            )
            .await
            .map_err(|e| req.error_from(&e))?;
            session.board = Some(board_id);

            let mut broadcast = Data::new();
            broadcast.insert("client_id".into(), json!(session.client_id));
            broadcast.insert("user_id".into(), json!(session.user.user_id));
            broadcast.insert("name".into(), json!(session.user.name));
            broadcast.insert("color".into(), json!(session.user.color));

            Ok(Outcome::ReplyAndBroadcast { reply: to_data(req, &snapshot)?, broadcast })
        }
        "part" => {
            leave_board(state, session, "part").await;
            Ok(Outcome::Done)
        }
        "users" => {
            let board_id = joined(session, req)?;
            let users = services::board::list_board_users(state, board_id).await;
            let mut data = Data::new();
            data.insert("users".into(), json!(users));
            Ok(Outcome::Reply(data))
        }
        "create" => {
            let name = req
                .data
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("Untitled Board");
            let row = services::board::create_board(&state.pool, name, Some(session.user.user_id))
                .await
                .map_err(|e| req.error_from(&e))?;
            let mut data = Data::new();
            data.insert("id".into(), json!(row.id));
            data.insert("name".into(), json!(row.name));
            Ok(Outcome::Reply(data))
        }
        "list" => {
            let boards = services::board::list_boards(&state.pool)
                .await
                .map_err(|e| req.error_from(&e))?;
            let mut data = Data::new();
            data.insert("boards".into(), json!(boards));
            Ok(Outcome::Reply(data))
        }
        "delete" => {
            let Some(board_id) = uuid_field(req, "board_id") else {
                return Err(req.error("board_id required"));
            };
            services::board::delete_board(state, board_id, session.user.user_id)
                .await
                .map_err(|e| req.error_from(&e))?;
            if session.board == Some(board_id) {
                session.board = None;
            }
            Ok(Outcome::Done)
        }
        op => Err(req.error(format!("unknown board op: {op}"))),
    }
}

// =============================================================================
// OBJECT HANDLERS
// =============================================================================

async fn handle_object(state: &AppState, session: &Session, req: &Frame) -> Result<Outcome, Frame> {
    let board_id = joined(session, req)?;
    let actor = session.actor();

    match req.op() {
        "create" => {
            let kind = match req.data.get("kind").and_then(Value::as_str) {
                Some(kind) => kind.parse::<ShapeKind>().map_err(|e| req.error(e.to_string()))?,
                None => ShapeKind::Rect,
            };
            let mut new = NewObject::new(kind, f64_field(req, "x").unwrap_or(0.0), f64_field(req, "y").unwrap_or(0.0));
            new.id = uuid_field(req, "id");
            if let Some(width) = f64_field(req, "width") {
                new.width = width;
            }
            if let Some(height) = f64_field(req, "height") {
                new.height = height;
            }
            if let Some(rotation) = f64_field(req, "rotation") {
                new.rotation = rotation;
            }
            new.z_index = req.data.get("z_index").and_then(Value::as_i64);
            if let Some(props) = req.data.get("props") {
                new.props = props.clone();
            }

            let shape = services::object::create_object(state, board_id, actor, new)
                .await
                .map_err(|e| req.error_from(&e))?;
            Ok(Outcome::Broadcast(to_data(req, &shape)?))
        }
        "update" => {
            let Some(object_id) = uuid_field(req, "id") else {
                return Err(req.error("id required"));
            };
            let Some(version) = req.data.get("version").and_then(Value::as_i64) else {
                return Err(req.error("version required"));
            };
            let partial: PartialShape = serde_json::to_value(&req.data)
                .and_then(serde_json::from_value)
                .map_err(|e| req.error(format!("invalid update: {e}")))?;

            let shape = services::object::update_object(state, board_id, actor, object_id, &partial, version)
                .await
                .map_err(|e| req.error_from(&e))?;
            Ok(Outcome::Broadcast(to_data(req, &shape)?))
        }
        "delete" => {
            let Some(object_id) = uuid_field(req, "id") else {
                return Err(req.error("id required"));
            };
            services::object::delete_object(state, board_id, actor, object_id)
                .await
                .map_err(|e| req.error_from(&e))?;
            let mut data = Data::new();
            data.insert("id".into(), json!(object_id));
            Ok(Outcome::Broadcast(data))
        }
        "drag" => {
            let Some(object_id) = uuid_field(req, "id") else {
                return Err(req.error("id required"));
            };
            services::object::drag_object(state, board_id, actor, object_id)
                .await
                .map_err(|e| req.error_from(&e))?;

            let mut data = Data::new();
            data.insert("id".into(), json!(object_id));
            data.insert("client_id".into(), json!(session.client_id));
            for key in ["x", "y", "width", "height", "rotation"] {
                if let Some(value) = f64_field(req, key) {
                    data.insert(key.into(), json!(value));
                }
            }
            Ok(Outcome::BroadcastExcludeSender(data))
        }
        "reorder" => {
            let ids = uuid_list(req, "ids").ok_or_else(|| req.error("ids required"))?;
            let op: ReorderOp = req
                .data
                .get("op")
                .cloned()
                .ok_or_else(|| req.error("op required"))
                .and_then(|v| serde_json::from_value(v).map_err(|e| req.error(format!("invalid op: {e}"))))?;
            let objects = services::object::reorder_objects(state, board_id, actor, &ids, op)
                .await
                .map_err(|e| req.error_from(&e))?;
            let mut data = Data::new();
            data.insert("objects".into(), json!(objects));
            Ok(Outcome::Broadcast(data))
        }
        "group" => {
            let ids = uuid_list(req, "ids").ok_or_else(|| req.error("ids required"))?;
            let (group_id, objects) = services::object::group_objects(state, board_id, actor, &ids)
                .await
                .map_err(|e| req.error_from(&e))?;
            Ok(Outcome::Broadcast(group_data(group_id, &objects)))
        }
        "ungroup" => {
            let Some(group_id) = uuid_field(req, "group_id") else {
                return Err(req.error("group_id required"));
            };
            let objects = services::object::ungroup_objects(state, board_id, actor, group_id)
                .await
                .map_err(|e| req.error_from(&e))?;
            Ok(Outcome::Broadcast(group_data(group_id, &objects)))
        }
        op => Err(req.error(format!("unknown object op: {op}"))),
    }
}

fn group_data(group_id: Uuid, objects: &[Shape]) -> Data {
    let mut data = Data::new();
    data.insert("group_id".into(), json!(group_id));
    data.insert("objects".into(), json!(objects));
    data
}

// =============================================================================
// LOCK HANDLERS
// =============================================================================

async fn handle_lock(state: &AppState, session: &Session, req: &Frame) -> Result<Outcome, Frame> {
    let board_id = joined(session, req)?;
    let ids = uuid_list(req, "ids").ok_or_else(|| req.error("ids required"))?;

    match req.op() {
        "acquire" => {
            let locks = services::lock::acquire_locks(state, board_id, &session.holder(), &ids)
                .await
                .map_err(|e| req.error_from(&e))?;
            let mut data = Data::new();
            data.insert("ids".into(), json!(locks.iter().map(|l| l.object_id).collect::<Vec<_>>()));
            data.insert("client_id".into(), json!(session.client_id));
            data.insert("user_id".into(), json!(session.user.user_id));
            data.insert("name".into(), json!(session.user.name));
            data.insert("expires_at".into(), json!(locks.iter().map(|l| l.expires_at_ms).max()));
            Ok(Outcome::Broadcast(data))
        }
        "renew" => {
            let locks = services::lock::renew_locks(state, board_id, session.client_id, &ids)
                .await
                .map_err(|e| req.error_from(&e))?;
            let mut data = Data::new();
            data.insert("ids".into(), json!(locks.iter().map(|l| l.object_id).collect::<Vec<_>>()));
            data.insert("expires_at".into(), json!(locks.iter().map(|l| l.expires_at_ms).max()));
            Ok(Outcome::Reply(data))
        }
        "release" => {
            let released = services::lock::release_locks(state, board_id, session.client_id, &ids)
                .await
                .map_err(|e| req.error_from(&e))?;
            let mut data = Data::new();
            data.insert("ids".into(), json!(released));
            data.insert("client_id".into(), json!(session.client_id));
            data.insert("reason".into(), json!("released"));
            Ok(Outcome::Broadcast(data))
        }
        op => Err(req.error(format!("unknown lock op: {op}"))),
    }
}

// =============================================================================
// CURSOR HANDLER
// =============================================================================

async fn handle_cursor(state: &AppState, session: &Session, req: &Frame) -> Outcome {
    // Silently ignore cursor frames before joining.
    let Some(board_id) = session.board else {
        return Outcome::Silent;
    };

    match req.op() {
        "moved" => {
            let (Some(x), Some(y)) = (f64_field(req, "x"), f64_field(req, "y")) else {
                return Outcome::Silent;
            };
            match services::presence::move_cursor(state, board_id, session.client_id, x, y, now_ms()).await {
                Some(cursor) => match serde_json::to_value(&cursor) {
                    Ok(Value::Object(map)) => Outcome::BroadcastExcludeSender(map.into_iter().collect()),
                    _ => Outcome::Silent,
                },
                None => Outcome::Silent,
            }
        }
        "clear" => {
            if services::presence::clear_cursor(state, board_id, session.client_id).await {
                let mut data = Data::new();
                data.insert("client_id".into(), json!(session.client_id));
                Outcome::BroadcastExcludeSender(data)
            } else {
                Outcome::Silent
            }
        }
        op => {
            debug!(op, "ws: unknown cursor op ignored");
            Outcome::Silent
        }
    }
}

// =============================================================================
// HISTORY HANDLERS
// =============================================================================

async fn handle_history(state: &AppState, session: &Session, req: &Frame) -> Result<Outcome, Frame> {
    let board_id = joined(session, req)?;
    let result = match req.op() {
        "undo" => services::history::undo(state, board_id, session.actor()).await,
        "redo" => services::history::redo(state, board_id, session.actor()).await,
        op => return Err(req.error(format!("unknown history op: {op}"))),
    };
    let result = result.map_err(|e| req.error_from(&e))?;
    Ok(Outcome::Broadcast(to_data(req, &result)?))
}

// =============================================================================
// HELPERS
// =============================================================================

fn joined(session: &Session, req: &Frame) -> Result<Uuid, Frame> {
    session.board.ok_or_else(|| {
        let mut err = req.error("must join a board first");
        err.data.insert("code".into(), json!("E_NOT_JOINED"));
        err
    })
}

fn uuid_field(req: &Frame, key: &str) -> Option<Uuid> {
    req.data.get(key).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

fn uuid_list(req: &Frame, key: &str) -> Option<Vec<ObjectId>> {
    let values = req.data.get(key)?.as_array()?;
    values
        .iter()
        .map(|v| v.as_str().and_then(|s| s.parse().ok()))
        .collect()
}

fn f64_field(req: &Frame, key: &str) -> Option<f64> {
    req.data.get(key).and_then(Value::as_f64)
}

/// Flatten a serializable struct into frame data.
fn to_data(req: &Frame, value: &impl Serialize) -> Result<Data, Frame> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(_) => Err(req.error("reply payload is not an object")),
        Err(e) => Err(req.error(format!("serialize reply: {e}"))),
    }
}

fn is_ephemeral(syscall: &str) -> bool {
    syscall.starts_with("cursor:") || syscall == "object:drag"
}

async fn send_frame(socket: &mut WebSocket, state: &AppState, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    let ephemeral = is_ephemeral(&frame.syscall);
    if !ephemeral {
        if frame.status == Status::Error {
            let code = frame.data.get("code").and_then(Value::as_str).unwrap_or("-");
            let message = frame.data.get("message").and_then(Value::as_str).unwrap_or("-");
            warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
        } else {
            info!(id = %frame.id, syscall = %frame.syscall, status = frame.status.as_str(), "ws: send frame");
        }
    }
    let result = socket.send(Message::Text(json.into())).await.map_err(|_| ());
    if result.is_ok() && !ephemeral {
        services::persistence::enqueue_frame(state, frame);
    }
    result
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
