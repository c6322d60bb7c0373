//! Wire format for the TCP adapter.
//!
//! Every frame is a 4-byte big-endian payload length followed by a CBOR
//! payload. Requests carry the caller identity as already authenticated by
//! whatever fronts this adapter; the ledger trusts it as-is.
//!
//! ```text
//! +----------------+---------------------------+
//! | len: u32 (BE)  | CBOR(Request | Response)  |
//! +----------------+---------------------------+
//! ```

use bytes::{Buf, BufMut, BytesMut};
use roomledger_core::{CallerId, ErrorKind, LedgerError, Message, MessageId, Room, RoomId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on a request frame payload.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Largest `limit` a [`Request::PageRoomMessages`] may carry.
pub const MAX_PAGE_LIMIT: u64 = 100;

/// CBOR bytes a stored message may add over the request that posted it
/// (ids, timestamp, field names), plus the response envelope.
const MESSAGE_OVERHEAD: usize = 128;

/// Upper bound on a response frame payload for a peer whose requests are
/// capped at `max_frame_bytes`.
///
/// Every stored message arrived in one request frame, so a page of
/// [`MAX_PAGE_LIMIT`] messages always fits.
pub fn response_limit(max_frame_bytes: usize) -> usize {
    let per_message = max_frame_bytes.saturating_add(MESSAGE_OVERHEAD);
    per_message.saturating_mul(MAX_PAGE_LIMIT as usize).saturating_add(MESSAGE_OVERHEAD)
}

/// Errors from framing and (de)serialization.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload length exceeds the configured limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced or encoded payload size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Payload is not a valid message.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Peer closed the stream in the middle of a frame.
    #[error("truncated frame")]
    Truncated,

    /// Underlying stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One operation against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Bind a username to the caller.
    RegisterUser {
        /// Authenticated caller.
        caller: CallerId,
        /// Desired username.
        username: String,
    },
    /// Create a room owned by the caller.
    CreateRoom {
        /// Authenticated caller.
        caller: CallerId,
        /// Room name.
        name: String,
        /// Restrict to members.
        is_private: bool,
    },
    /// Add a member to a private room.
    AddMember {
        /// Authenticated caller (must own the room).
        caller: CallerId,
        /// Target room.
        room_id: RoomId,
        /// Caller to add.
        member: CallerId,
    },
    /// Remove a member from a private room.
    RemoveMember {
        /// Authenticated caller (must own the room).
        caller: CallerId,
        /// Target room.
        room_id: RoomId,
        /// Caller to remove.
        member: CallerId,
    },
    /// Post a message; the server stamps the current time.
    PostMessage {
        /// Authenticated caller.
        caller: CallerId,
        /// Target room.
        room_id: RoomId,
        /// Message body.
        content: String,
    },
    /// Read one message.
    GetMessage {
        /// Authenticated caller.
        caller: CallerId,
        /// Message to read.
        message_id: MessageId,
    },
    /// List a room's message ids.
    ListRoomMessageIds {
        /// Authenticated caller.
        caller: CallerId,
        /// Room to list.
        room_id: RoomId,
    },
    /// Read a page of a room's messages, at most [`MAX_PAGE_LIMIT`] at a time.
    PageRoomMessages {
        /// Authenticated caller.
        caller: CallerId,
        /// Room to read.
        room_id: RoomId,
        /// First position to return.
        offset: u64,
        /// Maximum messages to return.
        limit: u64,
    },
    /// Whether a caller is in a private room's explicit membership set.
    IsMember {
        /// Room to check.
        room_id: RoomId,
        /// Caller to look for.
        member: CallerId,
    },
    /// Room metadata.
    GetRoom {
        /// Room to describe.
        room_id: RoomId,
    },
    /// Username of a caller.
    GetUsername {
        /// Caller to look up.
        caller: CallerId,
    },
    /// Number of rooms.
    TotalRooms,
    /// Number of messages.
    TotalMessages,
    /// Number of messages in a room.
    RoomMessageCount {
        /// Authenticated caller.
        caller: CallerId,
        /// Room to count.
        room_id: RoomId,
    },
}

impl Request {
    /// Operation name for log fields.
    pub fn op(&self) -> &'static str {
        match self {
            Self::RegisterUser { .. } => "register_user",
            Self::CreateRoom { .. } => "create_room",
            Self::AddMember { .. } => "add_member",
            Self::RemoveMember { .. } => "remove_member",
            Self::PostMessage { .. } => "post_message",
            Self::GetMessage { .. } => "get_message",
            Self::ListRoomMessageIds { .. } => "list_room_message_ids",
            Self::PageRoomMessages { .. } => "page_room_messages",
            Self::IsMember { .. } => "is_member",
            Self::GetRoom { .. } => "get_room",
            Self::GetUsername { .. } => "get_username",
            Self::TotalRooms => "total_rooms",
            Self::TotalMessages => "total_messages",
            Self::RoomMessageCount { .. } => "room_message_count",
        }
    }
}

/// Successful result payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// Operation with no result value.
    Unit,
    /// Newly created room.
    RoomId(RoomId),
    /// Newly posted message.
    MessageId(MessageId),
    /// One message.
    Message(Message),
    /// Room index.
    MessageIds(Vec<MessageId>),
    /// A page of messages.
    Messages(Vec<Message>),
    /// Room metadata.
    Room(Room),
    /// A username (empty if unregistered).
    Username(String),
    /// A counter.
    Count(u64),
    /// A yes/no answer.
    Flag(bool),
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// The operation committed (or the read succeeded).
    Ok(ResponseBody),
    /// The operation was rejected; nothing changed.
    Err {
        /// Error classification.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
        /// Seconds to wait before retrying, for cooldowns.
        retry_after_secs: Option<u64>,
    },
}

impl From<LedgerError> for Response {
    fn from(err: LedgerError) -> Self {
        Self::Err {
            kind: err.kind(),
            message: err.to_string(),
            retry_after_secs: err.retry_after_secs(),
        }
    }
}

impl<T: Into<ResponseBody>> From<Result<T, LedgerError>> for Response {
    fn from(result: Result<T, LedgerError>) -> Self {
        match result {
            Ok(body) => Self::Ok(body.into()),
            Err(e) => e.into(),
        }
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::Unit
    }
}

impl From<Message> for ResponseBody {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<Vec<Message>> for ResponseBody {
    fn from(messages: Vec<Message>) -> Self {
        Self::Messages(messages)
    }
}

impl From<Room> for ResponseBody {
    fn from(room: Room) -> Self {
        Self::Room(room)
    }
}

/// Append one length-prefixed CBOR frame to `buf`.
///
/// # Errors
///
/// `Encode` if serialization fails, `FrameTooLarge` if the payload exceeds
/// `max_frame_bytes`.
pub fn encode_frame<T: Serialize>(
    msg: &T,
    buf: &mut BytesMut,
    max_frame_bytes: usize,
) -> Result<(), ProtocolError> {
    let mut payload = Vec::new();
    ciborium::into_writer(msg, &mut payload).map_err(|e| ProtocolError::Encode(e.to_string()))?;

    let size = payload.len();
    let len = u32::try_from(size)
        .ok()
        .filter(|_| size <= max_frame_bytes)
        .ok_or(ProtocolError::FrameTooLarge { size, max: max_frame_bytes })?;

    buf.reserve(LENGTH_PREFIX_SIZE + size);
    buf.put_u32(len);
    buf.put_slice(&payload);
    Ok(())
}

/// Take one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a whole frame; bytes are
/// consumed only when a frame is returned.
///
/// # Errors
///
/// `FrameTooLarge` as soon as the prefix announces an oversized payload,
/// `Decode` if the payload is not a valid `T`.
pub fn decode_frame<T: DeserializeOwned>(
    buf: &mut BytesMut,
    max_frame_bytes: usize,
) -> Result<Option<T>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&buf[..LENGTH_PREFIX_SIZE]);
    let size = u32::from_be_bytes(prefix) as usize;
    if size > max_frame_bytes {
        return Err(ProtocolError::FrameTooLarge { size, max: max_frame_bytes });
    }
    if buf.len() < LENGTH_PREFIX_SIZE + size {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(size);
    ciborium::from_reader(&payload[..]).map(Some).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Read one frame from a stream.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
///
/// # Errors
///
/// `Truncated` if the stream ends mid-frame, plus everything
/// [`decode_frame`] returns.
pub async fn read_frame<R, T>(
    reader: &mut R,
    buf: &mut BytesMut,
    max_frame_bytes: usize,
) -> Result<Option<T>, ProtocolError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    loop {
        if let Some(msg) = decode_frame(buf, max_frame_bytes)? {
            return Ok(Some(msg));
        }

        if reader.read_buf(buf).await? == 0 {
            return if buf.is_empty() { Ok(None) } else { Err(ProtocolError::Truncated) };
        }
    }
}

/// Write one frame to a stream and flush it.
///
/// # Errors
///
/// Encoding errors and I/O errors.
pub async fn write_frame<W, T>(
    writer: &mut W,
    msg: &T,
    max_frame_bytes: usize,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = BytesMut::new();
    encode_frame(msg, &mut buf, max_frame_bytes)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut full = BytesMut::new();
        encode_frame(&Request::TotalRooms, &mut full, DEFAULT_MAX_FRAME_BYTES).unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        let before = partial.len();
        assert!(decode_frame::<Request>(&mut partial, DEFAULT_MAX_FRAME_BYTES).unwrap().is_none());
        assert_eq!(partial.len(), before, "incomplete frame must not be consumed");
    }

    #[test]
    fn two_frames_back_to_back() {
        let mut buf = BytesMut::new();
        let first = Request::GetUsername { caller: CallerId::from("a") };
        let second = Request::GetRoom { room_id: 3 };
        encode_frame(&first, &mut buf, DEFAULT_MAX_FRAME_BYTES).unwrap();
        encode_frame(&second, &mut buf, DEFAULT_MAX_FRAME_BYTES).unwrap();

        let max = DEFAULT_MAX_FRAME_BYTES;
        assert_eq!(decode_frame::<Request>(&mut buf, max).unwrap(), Some(first));
        assert_eq!(decode_frame::<Request>(&mut buf, max).unwrap(), Some(second));
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_prefix_rejected_before_payload_arrives() {
        let mut buf = BytesMut::new();
        buf.put_u32(1_000_000);

        let result = decode_frame::<Request>(&mut buf, 1024);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size: 1_000_000, max: 1024 })
        ));
    }

    #[test]
    fn oversized_message_not_encoded() {
        let mut buf = BytesMut::new();
        let req = Request::PostMessage {
            caller: CallerId::from("a"),
            room_id: 0,
            content: "x".repeat(2048),
        };

        let result = encode_frame(&req, &mut buf, 1024);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn ledger_error_maps_to_response() {
        let response = Response::from(LedgerError::CooldownActive { retry_after_secs: 12 });
        match response {
            Response::Err { kind, retry_after_secs, .. } => {
                assert_eq!(kind, ErrorKind::CooldownActive);
                assert_eq!(retry_after_secs, Some(12));
            },
            Response::Ok(_) => panic!("expected error response"),
        }
    }

    #[test]
    fn full_page_fits_response_limit() {
        let max = 2048;
        let sender = CallerId::new("c".repeat(900));
        let content = "x".repeat(1000);
        let posted =
            Request::PostMessage { caller: sender.clone(), room_id: 7, content: content.clone() };
        let mut buf = BytesMut::new();
        encode_frame(&posted, &mut buf, max).unwrap();

        let message = Message { id: u64::MAX, sender, content, timestamp: u64::MAX, room_id: 7 };
        let page = Response::Ok(ResponseBody::Messages(vec![message; MAX_PAGE_LIMIT as usize]));

        buf.clear();
        encode_frame(&page, &mut buf, response_limit(max)).unwrap();
    }

    proptest! {
        /// Decoding arbitrary bytes never panics.
        #[test]
        fn prop_decode_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let mut buf = BytesMut::from(&bytes[..]);
            let _ = decode_frame::<Request>(&mut buf, DEFAULT_MAX_FRAME_BYTES);
        }
    }
}
