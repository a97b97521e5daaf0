//! Sweeper: periodic expiry of locks and idle cursors.
//!
//! Lazy checks already treat expired locks as free; the sweeper exists so
//! peers are told. Every expired lock becomes a `lock:release` with
//! `reason: "expired"`, every idle cursor a `cursor:clear`.

use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::frame::{Data, Frame, now_ms};
use crate::services::{board, lock, presence};
use crate::state::AppState;

/// What one sweep removed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_locks: usize,
    pub stale_cursors: usize,
}

/// Spawn the sweeper loop. Returns a handle for shutdown.
pub fn spawn_sweeper(state: AppState, interval_ms: u64) -> JoinHandle<()> {
    info!(interval_ms, lock_ttl_ms = state.sync.lock_ttl_ms, cursor_stale_ms = state.sync.cursor_stale_ms, "sweeper configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = sweep_once(&state, now_ms()).await;
            if report != SweepReport::default() {
                debug!(expired_locks = report.expired_locks, stale_cursors = report.stale_cursors, "sweep");
            }
        }
    })
}

/// Expire locks and cursors as of `now` and notify each board.
pub async fn sweep_once(state: &AppState, now: i64) -> SweepReport {
    let mut report = SweepReport::default();

    for (board_id, expired) in lock::sweep_expired(state, now).await {
        report.expired_locks += expired.len();
        let ids: Vec<String> = expired.iter().map(|l| l.object_id.to_string()).collect();
        let mut data = Data::new();
        data.insert("ids".into(), json!(ids));
        data.insert("reason".into(), json!("expired"));
        let mut frame = Frame::notice(board_id, "lock:release");
        frame.data = data;
        board::broadcast(state, board_id, &frame, None).await;
    }

    for (board_id, clients) in presence::sweep_stale(state, now).await {
        report.stale_cursors += clients.len();
        for client_id in clients {
            let frame = Frame::notice(board_id, "cursor:clear")
                .with_data("client_id", client_id.to_string());
            board::broadcast(state, board_id, &frame, None).await;
        }
    }

    report
}

#[cfg(test)]
#[path = "sweeper_test.rs"]
mod tests;
