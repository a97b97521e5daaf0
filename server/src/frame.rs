//! Wire envelope for the board websocket.
//!
//! Clients send `request` frames as JSON text. The hub answers each one with
//! a `done` or `error` frame whose `parent_id` points back at the request,
//! and tells peers about board changes with `notice` frames (a request-status
//! frame minted by the server, stamped with the board it concerns).
//!
//! Payloads are flat `data` maps; the syscall prefix ("board:", "object:",
//! "lock:", "cursor:", "history:") picks the handler.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type Data = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Request,
    Done,
    Error,
}

impl Status {
    /// Column value in the frame log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Request => "request",
            Status::Done => "done",
            Status::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Unix millis, stamped by whoever built the frame.
    #[serde(default)]
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<Uuid>,
    /// Sender's user id. Overwritten by the hub on inbound frames.
    #[serde(default)]
    pub from: Option<String>,
    pub syscall: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub data: Data,
}

/// Maps a service error onto the `code` / `retryable` fields of an error
/// frame. Codes are stable `E_*` strings clients can switch on.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    pub fn request(syscall: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            board_id: None,
            from: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    /// Server-originated message about `board_id`, sent to its clients.
    pub fn notice(board_id: Uuid, syscall: impl Into<String>) -> Self {
        Self { board_id: Some(board_id), ..Self::request(syscall, Data::new()) }
    }

    /// Reply to a frame the hub could not parse. There is no request id to
    /// point back at, so the error travels as a fresh `gateway:error`.
    pub fn gateway_error(code: &'static str, message: impl Into<String>) -> Self {
        let mut data = Data::new();
        data.insert("code".into(), Value::from(code));
        data.insert("message".into(), Value::String(message.into()));
        Self { status: Status::Error, ..Self::request("gateway:error", data) }
    }

    #[must_use]
    pub fn done(&self) -> Self {
        self.reply(Status::Done, Data::new())
    }

    #[must_use]
    pub fn done_with(&self, data: Data) -> Self {
        self.reply(Status::Done, data)
    }

    /// Untyped error reply, for malformed requests.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Self {
        let mut data = Data::new();
        data.insert("message".into(), Value::String(message.into()));
        self.reply(Status::Error, data)
    }

    /// Error reply carrying the service error's code.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Data::new();
        data.insert("code".into(), Value::from(err.error_code()));
        data.insert("message".into(), Value::String(err.to_string()));
        data.insert("retryable".into(), Value::Bool(err.retryable()));
        self.reply(Status::Error, data)
    }

    /// Replies keep the request's syscall and board so clients can route
    /// them without tracking ids.
    fn reply(&self, status: Status, data: Data) -> Self {
        Self {
            parent_id: Some(self.id),
            board_id: self.board_id,
            status,
            ..Self::request(self.syscall.clone(), data)
        }
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Handler family: the text before the first `:`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.syscall.split_once(':').map_or(self.syscall.as_str(), |(prefix, _)| prefix)
    }

    #[must_use]
    pub fn op(&self) -> &str {
        self.syscall.split_once(':').map_or("", |(_, op)| op)
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
