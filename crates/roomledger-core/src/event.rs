//! Notifications produced by committed ledger operations.
//!
//! Events are plain values returned to the caller of the ledger. The ledger
//! never delivers them itself; the shell forwards them to subscribers once the
//! operation has committed.

use serde::{Deserialize, Serialize};

use crate::{CallerId, MessageId, RoomId, Timestamp, message::Message, room::Room};

/// A state change observed by indexers and other subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A message was appended to a room.
    MessageSent {
        /// Global message id.
        id: MessageId,
        /// Room the message was posted to.
        room_id: RoomId,
        /// Author.
        sender: CallerId,
        /// Message body.
        content: String,
        /// Caller-supplied post time.
        timestamp: Timestamp,
    },

    /// A room was created.
    RoomCreated {
        /// New room id.
        id: RoomId,
        /// Room name.
        name: String,
        /// Creator and owner.
        owner: CallerId,
        /// Whether access is restricted to members.
        is_private: bool,
        /// Creation time.
        timestamp: Timestamp,
    },

    /// A caller was added to a private room.
    MemberAdded {
        /// Room id.
        room_id: RoomId,
        /// Added caller.
        member: CallerId,
        /// Owner who performed the change.
        by: CallerId,
    },

    /// A caller was removed from a private room.
    MemberRemoved {
        /// Room id.
        room_id: RoomId,
        /// Removed caller.
        member: CallerId,
        /// Owner who performed the change.
        by: CallerId,
    },

    /// A caller registered or changed their username.
    ProfileUpdated {
        /// Caller whose profile changed.
        caller: CallerId,
        /// New username.
        username: String,
    },
}

impl LedgerEvent {
    pub(crate) fn message_sent(message: &Message) -> Self {
        Self::MessageSent {
            id: message.id,
            room_id: message.room_id,
            sender: message.sender.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
        }
    }

    /// Creation event for an existing room.
    pub fn room_created(room: &Room) -> Self {
        Self::RoomCreated {
            id: room.id,
            name: room.name.clone(),
            owner: room.owner.clone(),
            is_private: room.is_private,
            timestamp: room.created_at,
        }
    }

    /// Room the event concerns, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Self::MessageSent { room_id, .. }
            | Self::MemberAdded { room_id, .. }
            | Self::MemberRemoved { room_id, .. } => Some(*room_id),
            Self::RoomCreated { id, .. } => Some(*id),
            Self::ProfileUpdated { .. } => None,
        }
    }

    /// Short name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageSent { .. } => "message_sent",
            Self::RoomCreated { .. } => "room_created",
            Self::MemberAdded { .. } => "member_added",
            Self::MemberRemoved { .. } => "member_removed",
            Self::ProfileUpdated { .. } => "profile_updated",
        }
    }
}
