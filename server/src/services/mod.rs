//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation.

pub mod board;
pub mod history;
pub mod lock;
pub mod object;
pub mod persistence;
pub mod presence;
pub mod sweeper;
