//! Error taxonomy shared by every room operation
//!
//! The SQL store is the only place that turns raw persistence failures into
//! these variants. Every layer above passes them through untouched.

use super::room::NewRoom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Room operation errors
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The name is already taken. Carries the room that was built but never
    /// persisted; it has no id and must not be treated as durable.
    #[error("room already exists")]
    DuplicateRoom(Box<NewRoom>),

    #[error("room not found")]
    RoomNotFound,

    /// Same external message as a missing room so callers cannot tell
    /// which side of the pair is absent.
    #[error("room or user not found")]
    RelationNotFound,

    #[error("auth failed")]
    AuthFailed,

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RoomError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        RoomError::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RoomError::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::DuplicateRoom(_) => ErrorKind::DuplicateRoom,
            RoomError::RoomNotFound => ErrorKind::RoomNotFound,
            RoomError::RelationNotFound => ErrorKind::RelationNotFound,
            RoomError::AuthFailed => ErrorKind::AuthFailed,
            RoomError::BadRequest(_) => ErrorKind::BadRequest,
            RoomError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The `{kind, message}` shape handed to the transport layer
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
        }
    }

    /// Status a transport should answer with. Missing rooms and bad
    /// credentials stay distinct here; coalescing them is the caller's call.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::BadRequest | ErrorKind::DuplicateRoom => 400,
            ErrorKind::AuthFailed => 401,
            ErrorKind::RoomNotFound | ErrorKind::RelationNotFound => 404,
            ErrorKind::Internal => 500,
        }
    }
}

/// Discriminant of [`RoomError`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    DuplicateRoom,
    RoomNotFound,
    RelationNotFound,
    AuthFailed,
    BadRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DuplicateRoom => "DuplicateRoom",
            ErrorKind::RoomNotFound => "RoomNotFound",
            ErrorKind::RelationNotFound => "RelationNotFound",
            ErrorKind::AuthFailed => "AuthFailed",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}
