//! Operations for model-based testing.
//!
//! Operations represent every externally exposed action on the ledger. They
//! are generated randomly by proptest (or by `arbitrary` in the fuzzer) and
//! applied to both the model and the real implementation.

use arbitrary::Arbitrary;
use roomledger_core::{
    CallerId, ErrorKind, LedgerError, MAX_CONTENT_LEN, MAX_ROOM_NAME_LEN, MAX_USERNAME_LEN,
};

/// Client identifier (0-indexed). Client 0 is the ledger initializer.
pub type ClientId = u8;

/// Room identifier (u8 keeps the search space small).
pub type ModelRoomId = u8;

/// Client id standing for the null identity.
pub const NULL_CLIENT: ClientId = u8::MAX;

/// Identity of a model client in the real ledger.
pub fn caller_id(client: ClientId) -> CallerId {
    if client == NULL_CLIENT {
        CallerId::new(format!("0x{}", "0".repeat(40)))
    } else {
        CallerId::new(format!("0x{:040x}", u64::from(client) + 1))
    }
}

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Client registers or changes its username.
    Register {
        /// Client performing the operation.
        client_id: ClientId,
        /// Desired username.
        name: SmallText,
    },

    /// Client creates a room.
    CreateRoom {
        /// Client performing the operation.
        client_id: ClientId,
        /// Room name.
        name: SmallText,
        /// Restrict to members.
        is_private: bool,
    },

    /// Client adds another client to a room.
    AddMember {
        /// Client performing the operation.
        client_id: ClientId,
        /// Target room.
        room_id: ModelRoomId,
        /// Client to add ([`NULL_CLIENT`] for the null identity).
        member: ClientId,
    },

    /// Client removes another client from a room.
    RemoveMember {
        /// Client performing the operation.
        client_id: ClientId,
        /// Target room.
        room_id: ModelRoomId,
        /// Client to remove.
        member: ClientId,
    },

    /// Client posts a message at the current simulated time.
    Post {
        /// Author.
        client_id: ClientId,
        /// Target room.
        room_id: ModelRoomId,
        /// Message body.
        content: SmallText,
    },

    /// Client reads one message.
    GetMessage {
        /// Reader.
        client_id: ClientId,
        /// Message to read.
        message_id: u8,
    },

    /// Client reads a page of a room.
    Page {
        /// Reader.
        client_id: ClientId,
        /// Room to read.
        room_id: ModelRoomId,
        /// First position.
        offset: u8,
        /// Page size.
        limit: u8,
    },

    /// Advance simulated time.
    AdvanceTime {
        /// Seconds to advance.
        secs: u8,
    },
}

impl Operation {
    /// Fold raw fuzzer input into `num_clients` clients and a few rooms.
    ///
    /// [`NULL_CLIENT`] survives as a member so null-identity handling stays
    /// reachable.
    #[must_use]
    pub fn clamped(self, num_clients: u8) -> Self {
        const ROOMS: u8 = 8;
        let n = num_clients.max(1);
        let client = |c: ClientId| c % n;
        let member = |m: ClientId| if m == NULL_CLIENT { m } else { m % n };

        match self {
            Self::Register { client_id, name } => {
                Self::Register { client_id: client(client_id), name }
            },
            Self::CreateRoom { client_id, name, is_private } => {
                Self::CreateRoom { client_id: client(client_id), name, is_private }
            },
            Self::AddMember { client_id, room_id, member: m } => Self::AddMember {
                client_id: client(client_id),
                room_id: room_id % ROOMS,
                member: member(m),
            },
            Self::RemoveMember { client_id, room_id, member: m } => Self::RemoveMember {
                client_id: client(client_id),
                room_id: room_id % ROOMS,
                member: member(m),
            },
            Self::Post { client_id, room_id, content } => {
                Self::Post { client_id: client(client_id), room_id: room_id % ROOMS, content }
            },
            Self::GetMessage { client_id, message_id } => {
                Self::GetMessage { client_id: client(client_id), message_id }
            },
            Self::Page { client_id, room_id, offset, limit } => Self::Page {
                client_id: client(client_id),
                room_id: room_id % ROOMS,
                offset,
                limit,
            },
            Self::AdvanceTime { secs } => Self::AdvanceTime { secs },
        }
    }
}

/// Compact text generator.
///
/// The size class picks one of the interesting lengths for a field: empty,
/// short, exactly at the limit, or one byte over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallText {
    /// Content seed; short texts from the same seed collide on purpose.
    pub seed: u8,
    /// Length class (0-3 maps to empty/short/max/over).
    pub size_class: u8,
}

impl SmallText {
    /// Expand to a string for a field limited to `max` bytes.
    pub fn render(self, max: usize) -> String {
        let fill = char::from(b'a' + self.seed % 26);
        match self.size_class % 4 {
            0 => String::new(),
            1 => format!("t{}", self.seed % 6),
            2 => fill.to_string().repeat(max),
            _ => fill.to_string().repeat(max + 1),
        }
    }

    /// As a username.
    pub fn username(self) -> String {
        self.render(MAX_USERNAME_LEN)
    }

    /// As a room name.
    pub fn room_name(self) -> String {
        self.render(MAX_ROOM_NAME_LEN)
    }

    /// As message content.
    pub fn content(self) -> String {
        self.render(MAX_CONTENT_LEN)
    }
}

/// Result of applying an operation.
///
/// Used to compare model and real system behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded without a value.
    Ok,

    /// Operation returned an id (room or message).
    Id(u64),

    /// Operation returned a list of message ids.
    Ids(Vec<u64>),

    /// Operation failed.
    Error(OperationError),
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Error(_))
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

impl From<&LedgerError> for OperationResult {
    fn from(err: &LedgerError) -> Self {
        Self::Error(err.kind().into())
    }
}

/// Expected errors, one per ledger error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Malformed input.
    InvalidInput,
    /// Unknown room or message.
    NotFound,
    /// Caller does not own the room.
    Unauthorized,
    /// Caller cannot access a private room.
    AccessDenied,
    /// Member already has access.
    AlreadyMember,
    /// Member is not in the membership set.
    NotMember,
    /// Username claimed by another client.
    NameTaken,
    /// Post inside the cooldown window.
    CooldownActive,
    /// Page offset past the end.
    OutOfBounds,
}

impl From<ErrorKind> for OperationError {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidInput => Self::InvalidInput,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::Unauthorized => Self::Unauthorized,
            ErrorKind::AccessDenied => Self::AccessDenied,
            ErrorKind::AlreadyMember => Self::AlreadyMember,
            ErrorKind::NotMember => Self::NotMember,
            ErrorKind::NameTaken => Self::NameTaken,
            ErrorKind::CooldownActive => Self::CooldownActive,
            ErrorKind::OutOfBounds => Self::OutOfBounds,
        }
    }
}
