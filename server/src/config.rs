//! Server configuration loaded from the environment.
//!
//! DESIGN
//! ======
//! Every knob has a default except `DATABASE_URL`. Values that fail to parse
//! fall back to their default rather than aborting startup; `.env` files are
//! loaded by `main` before this runs.

use canvas::consts::{DEFAULT_CURSOR_STALE_MS, DEFAULT_HISTORY_LIMIT, DEFAULT_LOCK_TTL_MS};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;
const DEFAULT_OBJECT_FLUSH_INTERVAL_MS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL required")]
    MissingDatabaseUrl,
}

/// Collaboration timing knobs shared by services and the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// How long a shape lock lives without renewal.
    pub lock_ttl_ms: i64,
    /// Cursors idle this long are swept.
    pub cursor_stale_ms: i64,
    /// Undo entries kept per user per board.
    pub history_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            cursor_stale_ms: DEFAULT_CURSOR_STALE_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            lock_ttl_ms: env_parse("LOCK_TTL_MS", DEFAULT_LOCK_TTL_MS),
            cursor_stale_ms: env_parse("CURSOR_STALE_MS", DEFAULT_CURSOR_STALE_MS),
            history_limit: env_parse("HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub sweep_interval_ms: u64,
    pub object_flush_interval_ms: u64,
    pub sync: SyncConfig,
}

impl ServerConfig {
    /// Read configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `MissingDatabaseUrl` when `DATABASE_URL` is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => return Err(ConfigError::MissingDatabaseUrl),
        };
        Ok(Self {
            database_url,
            port: env_parse("PORT", DEFAULT_PORT),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            sweep_interval_ms: env_parse("SWEEP_INTERVAL_MS", DEFAULT_SWEEP_INTERVAL_MS),
            object_flush_interval_ms: env_parse("OBJECT_FLUSH_INTERVAL_MS", DEFAULT_OBJECT_FLUSH_INTERVAL_MS),
            sync: SyncConfig::from_env(),
        })
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// missing or malformed.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
