//! Shared numeric constants for the canvas crate.

// ── Camera ──────────────────────────────────────────────────────

/// Smallest allowed zoom factor.
pub const ZOOM_MIN: f64 = 0.1;

/// Largest allowed zoom factor.
pub const ZOOM_MAX: f64 = 10.0;

// ── Hit-testing ─────────────────────────────────────────────────

/// Screen-space hit slop in pixels for thin shapes (lines, arrows).
pub const EDGE_HIT_SLOP_PX: f64 = 6.0;

// ── Collaboration ───────────────────────────────────────────────

/// Default lifetime of a shape lock before it is considered abandoned.
pub const DEFAULT_LOCK_TTL_MS: i64 = 30_000;

/// Default age after which a silent cursor is dropped from presence.
pub const DEFAULT_CURSOR_STALE_MS: i64 = 15_000;

/// Default number of undo entries kept per user per board.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
