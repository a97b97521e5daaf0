//! Persistence service: background flush for dirty objects and the frame log.
//!
//! DESIGN
//! ======
//! Two background tasks. The object flush wakes on a fixed interval and
//! writes every live board's dirty and deleted shapes. The frame log writer
//! drains a bounded queue into batched inserts so websocket handling never
//! waits on Postgres.
//!
//! ERROR HANDLING
//! ==============
//! Dirty flags are cleared only after successful writes. This prioritizes
//! durability over duplicate flush attempts: repeated upserts are acceptable,
//! silent data loss is not.

use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::env_parse;
use crate::frame::Frame;
use crate::services::board::PendingWrites;
use crate::state::AppState;

const DEFAULT_FRAME_PERSIST_QUEUE_CAPACITY: usize = 8192;
const DEFAULT_FRAME_PERSIST_BATCH_SIZE: usize = 128;
const DEFAULT_FRAME_PERSIST_FLUSH_MS: u64 = 5;
const DEFAULT_FRAME_PERSIST_RETRIES: usize = 2;
const DEFAULT_FRAME_PERSIST_RETRY_BASE_MS: u64 = 20;

// =============================================================================
// CONFIG
// =============================================================================

/// Frame log writer knobs, read from `FRAME_PERSIST_*` variables.
#[derive(Clone, Copy)]
pub(crate) struct FramePersistConfig {
    /// Bounded channel capacity for the frame persist queue.
    pub(crate) queue_capacity: usize,
    /// Maximum frames flushed per Postgres write batch.
    pub(crate) batch_size: usize,
    /// How long to wait for the batch to fill before flushing, in milliseconds.
    pub(crate) flush_ms: u64,
    /// Number of retry attempts on transient database failures.
    pub(crate) retries: usize,
    /// First retry delay in milliseconds; doubles per attempt.
    pub(crate) retry_base_ms: u64,
}

impl FramePersistConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            queue_capacity: env_parse("FRAME_PERSIST_QUEUE_CAPACITY", DEFAULT_FRAME_PERSIST_QUEUE_CAPACITY),
            batch_size: env_parse("FRAME_PERSIST_BATCH_SIZE", DEFAULT_FRAME_PERSIST_BATCH_SIZE),
            flush_ms: env_parse("FRAME_PERSIST_FLUSH_MS", DEFAULT_FRAME_PERSIST_FLUSH_MS),
            retries: env_parse("FRAME_PERSIST_RETRIES", DEFAULT_FRAME_PERSIST_RETRIES).max(1),
            retry_base_ms: env_parse("FRAME_PERSIST_RETRY_BASE_MS", DEFAULT_FRAME_PERSIST_RETRY_BASE_MS),
        }
    }
}

/// Spawn the background object flush. Returns a handle for shutdown.
pub fn spawn_persistence_task(state: AppState, flush_interval_ms: u64) -> JoinHandle<()> {
    info!(flush_interval_ms, "object persistence flush configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(flush_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            flush_dirty_boards(&state).await;
        }
    })
}

/// Snapshot every board's pending writes under the lock.
pub(crate) async fn collect_pending(state: &AppState) -> Vec<(Uuid, PendingWrites)> {
    let boards = state.boards.read().await;
    boards
        .iter()
        .filter(|(_, board_state)| !board_state.is_clean())
        .map(|(board_id, board_state)| (*board_id, PendingWrites::snapshot(board_state)))
        .filter(|(_, pending)| !pending.is_empty())
        .collect()
}

async fn flush_dirty_boards(state: &AppState) {
    // PHASE: SNAPSHOT
    // WHY: Postgres I/O happens without holding the boards lock.
    let pending = collect_pending(state).await;

    // PHASE: WRITE, THEN ACK
    // WHY: a failed board keeps its flags and is retried next tick.
    for (board_id, writes) in pending {
        if let Err(e) = writes.flush(&state.pool).await {
            error!(error = %e, upserts = writes.upserts.len(), deletes = writes.deletes.len(), %board_id, "persistence flush failed");
            continue;
        }
        if let Some(board_state) = state.boards.write().await.get_mut(&board_id) {
            writes.ack(board_state);
        }
    }
}

// =============================================================================
// FRAME LOG
// =============================================================================

/// Spawn the batched frame log writer and return its queue sender.
///
/// Frames are written in transactions of up to `batch_size`, or whatever has
/// accumulated when the flush timer fires.
#[must_use]
pub fn spawn_frame_persistence_worker(pool: PgPool) -> mpsc::Sender<Frame> {
    let config = FramePersistConfig::from_env();
    let (tx, rx) = mpsc::channel::<Frame>(config.queue_capacity);
    info!(
        queue_capacity = config.queue_capacity,
        batch_size = config.batch_size,
        flush_ms = config.flush_ms,
        retries = config.retries,
        "frame log writer configured"
    );
    tokio::spawn(FrameLogWriter { pool, config, pending: Vec::with_capacity(config.batch_size) }.run(rx));
    tx
}

/// Best-effort, non-blocking enqueue onto the frame log.
pub fn enqueue_frame(state: &AppState, frame: &Frame) {
    let Some(tx) = &state.frame_persist_tx else {
        return;
    };
    match tx.try_send(frame.clone()) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(id = %frame.id, syscall = %frame.syscall, "frame log queue full; dropping frame");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!(id = %frame.id, syscall = %frame.syscall, "frame log queue closed; dropping frame");
        }
    }
}

struct FrameLogWriter {
    pool: PgPool,
    config: FramePersistConfig,
    pending: Vec<Frame>,
}

impl FrameLogWriter {
    async fn run(mut self, mut rx: mpsc::Receiver<Frame>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.flush_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some(frame) = received else {
                        // All senders dropped: drain and stop.
                        self.flush().await;
                        return;
                    };
                    self.pending.push(frame);
                    if self.pending.len() >= self.config.batch_size {
                        self.flush().await;
                    }
                }
                _ = ticker.tick() => self.flush().await,
            }
        }
    }

    /// Write the pending batch, retrying with exponential back-off. A batch
    /// that still fails is dropped: the frame log is an audit trail, not the
    /// source of truth.
    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let mut delay_ms = self.config.retry_base_ms;
        for attempt in 1..=self.config.retries {
            let Err(e) = persist_frame_batch(&self.pool, &batch).await else {
                return;
            };
            if attempt == self.config.retries {
                warn!(error = %e, count = batch.len(), "frame batch dropped after retries");
                return;
            }
            warn!(error = %e, attempt, count = batch.len(), "frame batch write failed; retrying");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            delay_ms = delay_ms.saturating_mul(2);
        }
    }
}

/// Insert frames in one transaction.
///
/// # Errors
///
/// Returns the first failing statement's error; the transaction rolls back.
pub async fn persist_frame_batch(pool: &PgPool, frames: &[Frame]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for frame in frames {
        let data = serde_json::Value::Object(frame.data.clone().into_iter().collect());
        sqlx::query(
            r#"INSERT INTO frames (id, parent_id, syscall, status, board_id, "from", data, ts)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(frame.id)
        .bind(frame.parent_id)
        .bind(&frame.syscall)
        .bind(frame.status.as_str())
        .bind(frame.board_id)
        .bind(&frame.from)
        .bind(&data)
        .bind(frame.ts)
        .execute(tx.as_mut())
        .await?;
    }
    tx.commit().await
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
