use super::*;
use crate::state::test_helpers;
use futures::{SinkExt, StreamExt};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;

async fn recv_board_broadcast(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("broadcast receive timed out")
        .expect("broadcast channel closed unexpectedly")
}

async fn assert_no_board_broadcast(rx: &mut mpsc::Receiver<Frame>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no broadcast frame"
    );
}

fn request_text(syscall: &str, data: serde_json::Value) -> String {
    let data: Data = serde_json::from_value(data).expect("test data should be an object");
    serde_json::to_string(&Frame::request(syscall, data)).expect("frame should serialize")
}

fn session_for(name: &str) -> (Session, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(64);
    let user = ConnectedClient { user_id: Uuid::new_v4(), name: name.into(), color: "#3b82f6".into() };
    (Session::new(user, tx), rx)
}

/// Join a seeded board and drain the join notice peers receive.
async fn join(state: &AppState, session: &mut Session, board_id: Uuid) -> Frame {
    let text = request_text("board:join", json!({ "board_id": board_id.to_string() }));
    let mut replies = process_inbound_text(state, session, &text).await;
    assert_eq!(replies.len(), 1);
    replies.remove(0)
}

fn code(frame: &Frame) -> Option<&str> {
    frame.data.get("code").and_then(Value::as_str)
}

// =============================================================================
// DISPATCH
// =============================================================================

#[tokio::test]
async fn invalid_json_returns_gateway_error() {
    let state = test_helpers::test_app_state();
    let (mut session, _rx) = session_for("ada");

    let replies = process_inbound_text(&state, &mut session, "{not json").await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].syscall, "gateway:error");
    assert_eq!(code(&replies[0]), Some("E_INVALID_FRAME"));
}

#[tokio::test]
async fn unknown_prefix_is_an_error() {
    let state = test_helpers::test_app_state();
    let (mut session, _rx) = session_for("ada");

    let replies = process_inbound_text(&state, &mut session, &request_text("chat:send", json!({}))).await;
    assert_eq!(replies[0].status, Status::Error);
    assert!(replies[0].data["message"].as_str().unwrap().contains("unknown prefix"));
}

#[tokio::test]
async fn object_ops_require_joined_board() {
    let state = test_helpers::test_app_state();
    let (mut session, _rx) = session_for("ada");

    for syscall in ["object:create", "lock:acquire", "history:undo", "board:users"] {
        let replies = process_inbound_text(&state, &mut session, &request_text(syscall, json!({ "ids": [] }))).await;
        assert_eq!(replies[0].status, Status::Error, "{syscall}");
        assert_eq!(code(&replies[0]), Some("E_NOT_JOINED"), "{syscall}");
    }
}

#[tokio::test]
async fn cursor_before_join_is_silent() {
    let state = test_helpers::test_app_state();
    let (mut session, _rx) = session_for("ada");

    let replies = process_inbound_text(&state, &mut session, &request_text("cursor:moved", json!({ "x": 1.0, "y": 2.0 }))).await;
    assert!(replies.is_empty());
}

// =============================================================================
// BOARD
// =============================================================================

#[tokio::test]
async fn join_replies_with_snapshot_and_notifies_peers() {
    let state = test_helpers::test_app_state();
    let obj = test_helpers::dummy_object();
    let board_id = test_helpers::seed_board_with_objects(&state, vec![obj.clone()]).await;
    let (mut alice, mut alice_rx) = session_for("alice");
    let (mut bob, _bob_rx) = session_for("bob");
    join(&state, &mut alice, board_id).await;

    let reply = join(&state, &mut bob, board_id).await;
    assert_eq!(reply.status, Status::Done);
    assert_eq!(reply.data["objects"][0]["id"], json!(obj.id));
    assert_eq!(reply.data["users"].as_array().map(Vec::len), Some(2));
    assert!(reply.data["locks"].as_array().is_some_and(Vec::is_empty));
    assert!(reply.data["cursors"].as_array().is_some_and(Vec::is_empty));
    assert_eq!(bob.board, Some(board_id));

    let notice = recv_board_broadcast(&mut alice_rx).await;
    assert_eq!(notice.syscall, "board:join");
    assert_eq!(notice.data["name"], json!("bob"));
    assert_eq!(notice.data["client_id"], json!(bob.client_id));
}

#[tokio::test]
async fn joining_another_board_parts_the_first() {
    let state = test_helpers::test_app_state();
    let first = test_helpers::seed_board(&state).await;
    let second = test_helpers::seed_board(&state).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, mut bob_rx) = session_for("bob");
    join(&state, &mut bob, first).await;
    join(&state, &mut alice, first).await;
    recv_board_broadcast(&mut bob_rx).await;

    join(&state, &mut alice, second).await;

    let part = recv_board_broadcast(&mut bob_rx).await;
    assert_eq!(part.syscall, "board:part");
    assert_eq!(part.data["client_id"], json!(alice.client_id.to_string()));
    let boards = state.boards.read().await;
    assert!(!boards[&first].clients.contains_key(&alice.client_id));
    assert!(boards[&second].clients.contains_key(&alice.client_id));
}

// =============================================================================
// OBJECTS
// =============================================================================

#[tokio::test]
async fn object_create_replies_to_sender_and_broadcasts_to_peers() {
    let state = test_helpers::test_app_state();
    let board_id = test_helpers::seed_board(&state).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, mut bob_rx) = session_for("bob");
    join(&state, &mut alice, board_id).await;
    join(&state, &mut bob, board_id).await;

    let text = request_text("object:create", json!({ "kind": "ellipse", "x": 10.0, "y": 20.0, "props": { "fill": "#fff" } }));
    let replies = process_inbound_text(&state, &mut alice, &text).await;
    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert_eq!(reply.status, Status::Done);
    assert!(reply.parent_id.is_some());
    assert_eq!(reply.data["kind"], json!("ellipse"));
    assert_eq!(reply.data["version"], json!(1));

    let peer = recv_board_broadcast(&mut bob_rx).await;
    assert_eq!(peer.syscall, "object:create");
    assert!(peer.parent_id.is_none());
    assert_eq!(peer.data["id"], reply.data["id"]);
}

#[tokio::test]
async fn object_create_rejects_unknown_kind() {
    let state = test_helpers::test_app_state();
    let board_id = test_helpers::seed_board(&state).await;
    let (mut alice, _rx) = session_for("alice");
    join(&state, &mut alice, board_id).await;

    let replies = process_inbound_text(&state, &mut alice, &request_text("object:create", json!({ "kind": "hexagon" }))).await;
    assert_eq!(replies[0].status, Status::Error);
}

#[tokio::test]
async fn object_update_respects_foreign_lock_and_stale_versions() {
    let state = test_helpers::test_app_state();
    let obj = test_helpers::dummy_object();
    let board_id = test_helpers::seed_board_with_objects(&state, vec![obj.clone()]).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, _bob_rx) = session_for("bob");
    join(&state, &mut alice, board_id).await;
    join(&state, &mut bob, board_id).await;

    let lock = request_text("lock:acquire", json!({ "ids": [obj.id.to_string()] }));
    let replies = process_inbound_text(&state, &mut alice, &lock).await;
    assert_eq!(replies[0].status, Status::Done);

    let update = request_text("object:update", json!({ "id": obj.id.to_string(), "version": 1, "x": 5.0 }));
    let replies = process_inbound_text(&state, &mut bob, &update).await;
    assert_eq!(code(&replies[0]), Some("E_OBJECT_LOCKED"));

    let replies = process_inbound_text(&state, &mut alice, &update).await;
    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].data["version"], json!(2));

    let stale = request_text("object:update", json!({ "id": obj.id.to_string(), "version": 0, "x": 7.0 }));
    let replies = process_inbound_text(&state, &mut alice, &stale).await;
    assert_eq!(code(&replies[0]), Some("E_STALE_UPDATE"));
}

#[tokio::test]
async fn object_update_requires_version() {
    let state = test_helpers::test_app_state();
    let obj = test_helpers::dummy_object();
    let board_id = test_helpers::seed_board_with_objects(&state, vec![obj.clone()]).await;
    let (mut alice, _rx) = session_for("alice");
    join(&state, &mut alice, board_id).await;

    let replies = process_inbound_text(&state, &mut alice, &request_text("object:update", json!({ "id": obj.id.to_string(), "x": 1.0 }))).await;
    assert_eq!(replies[0].status, Status::Error);
}

#[tokio::test]
async fn drag_requires_lock_and_only_reaches_peers() {
    let state = test_helpers::test_app_state();
    let obj = test_helpers::dummy_object();
    let board_id = test_helpers::seed_board_with_objects(&state, vec![obj.clone()]).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, mut bob_rx) = session_for("bob");
    join(&state, &mut bob, board_id).await;
    join(&state, &mut alice, board_id).await;
    recv_board_broadcast(&mut bob_rx).await;

    let drag = request_text("object:drag", json!({ "id": obj.id.to_string(), "x": 300.0, "y": 40.0 }));
    let replies = process_inbound_text(&state, &mut alice, &drag).await;
    assert_eq!(code(&replies[0]), Some("E_LOCK_REQUIRED"));

    process_inbound_text(&state, &mut alice, &request_text("lock:acquire", json!({ "ids": [obj.id.to_string()] }))).await;
    let acquired = recv_board_broadcast(&mut bob_rx).await;
    assert_eq!(acquired.syscall, "lock:acquire");
    assert_eq!(acquired.data["name"], json!("alice"));

    let replies = process_inbound_text(&state, &mut alice, &drag).await;
    assert!(replies.is_empty());
    let moved = recv_board_broadcast(&mut bob_rx).await;
    assert_eq!(moved.syscall, "object:drag");
    assert_eq!(moved.data["x"], json!(300.0));
    assert_eq!(moved.data["client_id"], json!(alice.client_id));

    // Drags never touch the document.
    let boards = state.boards.read().await;
    assert_eq!(boards[&board_id].objects.get(&obj.id).map(|s| s.version), Some(1));
}

#[tokio::test]
async fn reorder_and_group_broadcast_changed_objects() {
    let state = test_helpers::test_app_state();
    let a = test_helpers::dummy_object_at(0);
    let b = test_helpers::dummy_object_at(1);
    let board_id = test_helpers::seed_board_with_objects(&state, vec![a.clone(), b.clone()]).await;
    let (mut alice, _rx) = session_for("alice");
    join(&state, &mut alice, board_id).await;

    let reorder = request_text("object:reorder", json!({ "ids": [a.id.to_string()], "op": "bring_to_front" }));
    let replies = process_inbound_text(&state, &mut alice, &reorder).await;
    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].data["objects"][0]["id"], json!(a.id));

    let group = request_text("object:group", json!({ "ids": [a.id.to_string(), b.id.to_string()] }));
    let replies = process_inbound_text(&state, &mut alice, &group).await;
    assert_eq!(replies[0].status, Status::Done);
    let group_id = replies[0].data["group_id"].as_str().unwrap().to_string();
    assert_eq!(replies[0].data["objects"].as_array().map(Vec::len), Some(2));

    let ungroup = request_text("object:ungroup", json!({ "group_id": group_id }));
    let replies = process_inbound_text(&state, &mut alice, &ungroup).await;
    assert_eq!(replies[0].status, Status::Done);
    let boards = state.boards.read().await;
    assert!(boards[&board_id].objects.get(&a.id).is_some_and(|s| s.group_id.is_none()));
}

#[tokio::test]
async fn board_delete_by_non_owner_is_forbidden_on_live_board() {
    let state = test_helpers::test_app_state();
    let board_id = test_helpers::seed_board(&state).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, _bob_rx) = session_for("bob");
    state.boards.write().await.get_mut(&board_id).unwrap().owner_id = Some(alice.user.user_id);
    join(&state, &mut alice, board_id).await;
    join(&state, &mut bob, board_id).await;

    let delete = request_text("board:delete", json!({ "board_id": board_id.to_string() }));
    let replies = process_inbound_text(&state, &mut bob, &delete).await;
    assert_eq!(code(&replies[0]), Some("E_FORBIDDEN"));
    assert_eq!(bob.board, Some(board_id));
    assert!(state.boards.read().await.contains_key(&board_id));
}

#[tokio::test]
async fn lock_renew_extends_own_locks_and_skips_foreign_ones() {
    let state = test_helpers::test_app_state();
    let a = test_helpers::dummy_object_at(0);
    let b = test_helpers::dummy_object_at(1);
    let board_id = test_helpers::seed_board_with_objects(&state, vec![a.clone(), b.clone()]).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, _bob_rx) = session_for("bob");
    join(&state, &mut alice, board_id).await;
    join(&state, &mut bob, board_id).await;

    let replies = process_inbound_text(&state, &mut alice, &request_text("lock:acquire", json!({ "ids": [a.id.to_string()] }))).await;
    let first_expiry = replies[0].data["expires_at"].as_i64().unwrap();
    process_inbound_text(&state, &mut bob, &request_text("lock:acquire", json!({ "ids": [b.id.to_string()] }))).await;
    let bob_expiry = state.boards.read().await[&board_id].locks.get(&b.id).unwrap().expires_at_ms;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let renew = request_text("lock:renew", json!({ "ids": [a.id.to_string(), b.id.to_string()] }));
    let replies = process_inbound_text(&state, &mut alice, &renew).await;
    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].data["ids"], json!([a.id]));
    assert!(replies[0].data["expires_at"].as_i64().unwrap() > first_expiry);

    let boards = state.boards.read().await;
    let locks = &boards[&board_id].locks;
    assert!(locks.get(&a.id).unwrap().expires_at_ms > first_expiry);
    assert!(locks.get(&b.id).unwrap().held_by(bob.client_id));
    assert_eq!(locks.get(&b.id).unwrap().expires_at_ms, bob_expiry);
}

// =============================================================================
// CURSORS / HISTORY
// =============================================================================

#[tokio::test]
async fn cursor_moves_reach_peers_without_reply() {
    let state = test_helpers::test_app_state();
    let board_id = test_helpers::seed_board(&state).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, mut bob_rx) = session_for("bob");
    join(&state, &mut bob, board_id).await;
    join(&state, &mut alice, board_id).await;
    recv_board_broadcast(&mut bob_rx).await;

    let replies = process_inbound_text(&state, &mut alice, &request_text("cursor:moved", json!({ "x": 12.5, "y": -3.0 }))).await;
    assert!(replies.is_empty());
    let moved = recv_board_broadcast(&mut bob_rx).await;
    assert_eq!(moved.syscall, "cursor:moved");
    assert_eq!(moved.data["name"], json!("alice"));
    assert_eq!(moved.data["x"], json!(12.5));

    let replies = process_inbound_text(&state, &mut alice, &request_text("cursor:clear", json!({}))).await;
    assert!(replies.is_empty());
    let cleared = recv_board_broadcast(&mut bob_rx).await;
    assert_eq!(cleared.syscall, "cursor:clear");

    // A second clear has nothing to announce.
    process_inbound_text(&state, &mut alice, &request_text("cursor:clear", json!({}))).await;
    assert_no_board_broadcast(&mut bob_rx).await;
}

#[tokio::test]
async fn undo_create_broadcasts_deletion() {
    let state = test_helpers::test_app_state();
    let board_id = test_helpers::seed_board(&state).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, mut bob_rx) = session_for("bob");
    join(&state, &mut alice, board_id).await;
    join(&state, &mut bob, board_id).await;

    let created = process_inbound_text(&state, &mut alice, &request_text("object:create", json!({ "x": 0.0, "y": 0.0 }))).await;
    let id = created[0].data["id"].clone();
    recv_board_broadcast(&mut bob_rx).await;

    let replies = process_inbound_text(&state, &mut alice, &request_text("history:undo", json!({}))).await;
    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].data["deleted"], json!([id]));
    let peer = recv_board_broadcast(&mut bob_rx).await;
    assert_eq!(peer.syscall, "history:undo");

    // Bob's history is separate from Alice's.
    let replies = process_inbound_text(&state, &mut bob, &request_text("history:undo", json!({}))).await;
    assert_eq!(code(&replies[0]), Some("E_HISTORY_EMPTY"));
}

#[tokio::test]
async fn redo_after_undo_broadcasts_objects() {
    let state = test_helpers::test_app_state();
    let board_id = test_helpers::seed_board(&state).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, mut bob_rx) = session_for("bob");
    join(&state, &mut alice, board_id).await;
    join(&state, &mut bob, board_id).await;

    let created = process_inbound_text(&state, &mut alice, &request_text("object:create", json!({ "x": 4.0, "y": 2.0 }))).await;
    let id = created[0].data["id"].clone();
    recv_board_broadcast(&mut bob_rx).await;
    process_inbound_text(&state, &mut alice, &request_text("history:undo", json!({}))).await;
    recv_board_broadcast(&mut bob_rx).await;

    let replies = process_inbound_text(&state, &mut alice, &request_text("history:redo", json!({}))).await;
    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].data["objects"][0]["id"], id);
    assert_eq!(replies[0].data["deleted"], json!([]));
    let peer = recv_board_broadcast(&mut bob_rx).await;
    assert_eq!(peer.syscall, "history:redo");
    assert_eq!(peer.data["objects"][0]["x"], json!(4.0));

    let replies = process_inbound_text(&state, &mut alice, &request_text("history:redo", json!({}))).await;
    assert_eq!(code(&replies[0]), Some("E_HISTORY_EMPTY"));
}

#[tokio::test]
async fn repeated_undo_walks_back_edits_on_one_shape() {
    let state = test_helpers::test_app_state();
    let obj = test_helpers::dummy_object();
    let board_id = test_helpers::seed_board_with_objects(&state, vec![obj.clone()]).await;
    let (mut alice, _rx) = session_for("alice");
    join(&state, &mut alice, board_id).await;

    let start_x = obj.x;
    for (version, x) in [(1, 10.0), (2, 20.0), (3, 30.0)] {
        let update = request_text("object:update", json!({ "id": obj.id.to_string(), "version": version, "x": x }));
        let replies = process_inbound_text(&state, &mut alice, &update).await;
        assert_eq!(replies[0].status, Status::Done);
    }

    for x in [20.0, 10.0, start_x] {
        let replies = process_inbound_text(&state, &mut alice, &request_text("history:undo", json!({}))).await;
        assert_eq!(replies[0].status, Status::Done, "undo back to x={x}");
        assert_eq!(replies[0].data["objects"][0]["x"], json!(x));
    }

    let redo = process_inbound_text(&state, &mut alice, &request_text("history:redo", json!({}))).await;
    assert_eq!(redo[0].data["objects"][0]["x"], json!(10.0));
}

// =============================================================================
// DISCONNECT
// =============================================================================

#[tokio::test]
async fn leave_board_releases_locks_and_announces_part() {
    let state = test_helpers::test_app_state();
    let obj = test_helpers::dummy_object();
    let board_id = test_helpers::seed_board_with_objects(&state, vec![obj.clone()]).await;
    let (mut alice, _alice_rx) = session_for("alice");
    let (mut bob, mut bob_rx) = session_for("bob");
    join(&state, &mut bob, board_id).await;
    join(&state, &mut alice, board_id).await;
    recv_board_broadcast(&mut bob_rx).await;
    process_inbound_text(&state, &mut alice, &request_text("lock:acquire", json!({ "ids": [obj.id.to_string()] }))).await;
    process_inbound_text(&state, &mut alice, &request_text("cursor:moved", json!({ "x": 1.0, "y": 1.0 }))).await;
    recv_board_broadcast(&mut bob_rx).await;
    recv_board_broadcast(&mut bob_rx).await;

    leave_board(&state, &mut alice, "disconnect").await;
    assert!(alice.board.is_none());

    let release = recv_board_broadcast(&mut bob_rx).await;
    assert_eq!(release.syscall, "lock:release");
    assert_eq!(release.data["reason"], json!("disconnect"));
    assert_eq!(release.data["ids"], json!([obj.id.to_string()]));
    assert_eq!(recv_board_broadcast(&mut bob_rx).await.syscall, "cursor:clear");
    assert_eq!(recv_board_broadcast(&mut bob_rx).await.syscall, "board:part");

    let boards = state.boards.read().await;
    assert!(boards[&board_id].locks.is_empty());
}

#[test]
fn identity_defaults_fill_missing_params() {
    let identity = identity_from_params(&HashMap::new());
    assert_eq!(identity.name, "anonymous");
    assert!(PALETTE.contains(&identity.color.as_str()));

    let user_id = Uuid::new_v4();
    let params = HashMap::from([
        ("user_id".to_string(), user_id.to_string()),
        ("name".to_string(), "  grace ".to_string()),
        ("color".to_string(), "#000000".to_string()),
    ]);
    let identity = identity_from_params(&params);
    assert_eq!(identity.user_id, user_id);
    assert_eq!(identity.name, "grace");
    assert_eq!(identity.color, "#000000");
}

// =============================================================================
// END TO END
// =============================================================================

async fn next_frame<S>(stream: &mut S) -> Frame
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("websocket receive timed out")
            .expect("websocket closed")
            .expect("websocket error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("server frames are valid json");
        }
    }
}

#[tokio::test]
async fn websocket_clients_see_each_others_edits() {
    let state = test_helpers::test_app_state();
    let board_id = test_helpers::seed_board(&state).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = crate::routes::app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut alice, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws?name=alice")).await.unwrap();
    let (mut bob, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws?name=bob")).await.unwrap();

    let welcome = next_frame(&mut alice).await;
    assert_eq!(welcome.syscall, "session:connected");
    assert_eq!(welcome.data["name"], json!("alice"));
    next_frame(&mut bob).await;

    let join_text = request_text("board:join", json!({ "board_id": board_id.to_string() }));
    alice.send(WsMessage::text(join_text.clone())).await.unwrap();
    assert_eq!(next_frame(&mut alice).await.status, Status::Done);
    bob.send(WsMessage::text(join_text)).await.unwrap();
    assert_eq!(next_frame(&mut bob).await.status, Status::Done);
    assert_eq!(next_frame(&mut alice).await.syscall, "board:join");

    let create = request_text("object:create", json!({ "kind": "star", "x": 5.0, "y": 6.0 }));
    bob.send(WsMessage::text(create)).await.unwrap();
    let ack = next_frame(&mut bob).await;
    assert_eq!(ack.status, Status::Done);

    let seen = next_frame(&mut alice).await;
    assert_eq!(seen.syscall, "object:create");
    assert_eq!(seen.data["id"], ack.data["id"]);
    assert_eq!(seen.data["kind"], json!("star"));

    bob.close(None).await.unwrap();
    let part = next_frame(&mut alice).await;
    assert_eq!(part.syscall, "board:part");
}

#[tokio::test]
async fn abandoned_socket_ends_the_session_and_parts_the_board() {
    let state = test_helpers::test_app_state();
    let board_id = test_helpers::seed_board(&state).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = crate::routes::app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut alice, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws?name=alice")).await.unwrap();
    let (mut bob, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws?name=bob")).await.unwrap();
    next_frame(&mut alice).await;
    next_frame(&mut bob).await;

    let join_text = request_text("board:join", json!({ "board_id": board_id.to_string() }));
    alice.send(WsMessage::text(join_text.clone())).await.unwrap();
    next_frame(&mut alice).await;
    bob.send(WsMessage::text(join_text)).await.unwrap();
    next_frame(&mut bob).await;
    next_frame(&mut alice).await;

    // Bob fires a request and vanishes without a close handshake.
    let create = request_text("object:create", json!({ "x": 1.0, "y": 1.0 }));
    bob.send(WsMessage::text(create)).await.unwrap();
    drop(bob);

    assert_eq!(next_frame(&mut alice).await.syscall, "object:create");
    assert_eq!(next_frame(&mut alice).await.syscall, "board:part");
    let boards = state.boards.read().await;
    assert_eq!(boards[&board_id].clients.len(), 1);
}
