//! Ledger error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MessageId, RoomId};

/// Errors from ledger operations.
///
/// Every error is local to the operation that produced it: a rejected
/// operation leaves the ledger exactly as it found it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Malformed input (empty or oversized field, null identity, operation not
    /// applicable to this room).
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input.
        reason: String,
    },

    /// Room id is not allocated.
    #[error("room not found: {room_id}")]
    RoomNotFound {
        /// The room id that was not found.
        room_id: RoomId,
    },

    /// Message id is not allocated.
    #[error("message not found: {message_id}")]
    MessageNotFound {
        /// The message id that was not found.
        message_id: MessageId,
    },

    /// Caller does not own the room.
    #[error("unauthorized: caller does not own room {room_id}")]
    Unauthorized {
        /// Room the caller tried to administer.
        room_id: RoomId,
    },

    /// Private room and the caller is neither owner nor member.
    #[error("access denied to room {room_id}")]
    AccessDenied {
        /// Room the caller tried to use.
        room_id: RoomId,
    },

    /// Member is already in the room's membership set.
    #[error("already a member of room {room_id}")]
    AlreadyMember {
        /// Room the member belongs to.
        room_id: RoomId,
    },

    /// Member is not in the room's membership set.
    #[error("not a member of room {room_id}")]
    NotMember {
        /// Room the member was expected in.
        room_id: RoomId,
    },

    /// Username is bound to a different caller.
    #[error("username already taken: {username}")]
    NameTaken {
        /// The contested username.
        username: String,
    },

    /// Caller posted too recently.
    #[error("cooldown active: retry in {retry_after_secs}s")]
    CooldownActive {
        /// Seconds until the caller may post again.
        retry_after_secs: u64,
    },

    /// Pagination offset is past the end of the room index.
    #[error("offset {offset} out of bounds for {total} messages")]
    OutOfBounds {
        /// Requested offset.
        offset: u64,
        /// Messages in the room.
        total: u64,
    },
}

/// Coarse error classification, stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// See [`LedgerError::InvalidInput`].
    InvalidInput,
    /// Room or message id out of range.
    NotFound,
    /// See [`LedgerError::Unauthorized`].
    Unauthorized,
    /// See [`LedgerError::AccessDenied`].
    AccessDenied,
    /// See [`LedgerError::AlreadyMember`].
    AlreadyMember,
    /// See [`LedgerError::NotMember`].
    NotMember,
    /// See [`LedgerError::NameTaken`].
    NameTaken,
    /// See [`LedgerError::CooldownActive`].
    CooldownActive,
    /// See [`LedgerError::OutOfBounds`].
    OutOfBounds,
}

impl LedgerError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput { reason: reason.into() }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::RoomNotFound { .. } | Self::MessageNotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::AlreadyMember { .. } => ErrorKind::AlreadyMember,
            Self::NotMember { .. } => ErrorKind::NotMember,
            Self::NameTaken { .. } => ErrorKind::NameTaken,
            Self::CooldownActive { .. } => ErrorKind::CooldownActive,
            Self::OutOfBounds { .. } => ErrorKind::OutOfBounds,
        }
    }

    /// Returns true if the same caller can succeed later without changing
    /// identity (after fixing input, waiting, or being granted membership).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidInput { .. }
            | Self::AccessDenied { .. }
            | Self::NameTaken { .. }
            | Self::CooldownActive { .. } => true,

            Self::RoomNotFound { .. }
            | Self::MessageNotFound { .. }
            | Self::Unauthorized { .. }
            | Self::AlreadyMember { .. }
            | Self::NotMember { .. }
            | Self::OutOfBounds { .. } => false,
        }
    }

    /// Seconds to wait before retrying, when the error carries one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::CooldownActive { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
