//! Message log and per-room indices.
//!
//! Messages live in one global append-only log; the position in the log is
//! the message id. Each room keeps an append-only list of the ids posted to
//! it, which is what pagination walks.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    CallerId, LedgerError, MessageId, RoomId, Timestamp, event::LedgerEvent,
    rate_limit::RateLimiter, room::RoomStore,
};

/// Longest accepted message body, in UTF-8 bytes.
pub const MAX_CONTENT_LEN: usize = 1000;

/// Restartable iterator over a room's message ids in posting order.
pub type MessageIds<'a> = std::iter::Copied<std::slice::Iter<'a, MessageId>>;

/// An immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Global id, strictly increasing across all rooms.
    pub id: MessageId,
    /// Author.
    pub sender: CallerId,
    /// Body (1..=1000 bytes).
    pub content: String,
    /// Caller-supplied post time.
    pub timestamp: Timestamp,
    /// Room the message belongs to.
    pub room_id: RoomId,
}

/// Parameters of a post, grouped to keep the call site readable.
#[derive(Debug, Clone, Copy)]
pub struct PostRequest<'a> {
    /// Author.
    pub caller: &'a CallerId,
    /// Target room.
    pub room_id: RoomId,
    /// Body.
    pub content: &'a str,
    /// Post time.
    pub now: Timestamp,
    /// Cooldown to enforce, in seconds.
    pub cooldown: u64,
}

/// Global message log plus room indices.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    /// Indexed by message id.
    messages: Vec<Message>,
    /// Room id -> message ids in posting order.
    room_index: HashMap<RoomId, Vec<MessageId>>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages posted across all rooms, which is also the next message id.
    pub fn len(&self) -> u64 {
        self.messages.len() as u64
    }

    /// True if nothing has been posted.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Post a message.
    ///
    /// Checks run in order and the first failure wins: room exists, caller
    /// has access, content size, cooldown. The cooldown is recorded only when
    /// every earlier check has passed, and nothing else is written unless the
    /// cooldown check passes too.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `AccessDenied`, `InvalidInput`, `CooldownActive`.
    pub fn post(
        &mut self,
        rooms: &mut RoomStore,
        limiter: &mut RateLimiter,
        req: PostRequest<'_>,
    ) -> Result<(MessageId, LedgerEvent), LedgerError> {
        let PostRequest { caller, room_id, content, now, cooldown } = req;

        rooms.ensure_access(room_id, caller)?;
        if content.is_empty() || content.len() > MAX_CONTENT_LEN {
            return Err(LedgerError::invalid(format!(
                "content must be 1..={MAX_CONTENT_LEN} bytes, got {}",
                content.len()
            )));
        }
        limiter.check_and_record(caller, now, cooldown)?;

        let message = Message {
            id: self.len(),
            sender: caller.clone(),
            content: content.to_string(),
            timestamp: now,
            room_id,
        };
        let id = message.id;
        let event = LedgerEvent::message_sent(&message);

        rooms.record_message(room_id)?;
        self.room_index.entry(room_id).or_default().push(id);
        self.messages.push(message);

        Ok((id, event))
    }

    /// Fetch a message the caller is allowed to read.
    ///
    /// # Errors
    ///
    /// `MessageNotFound` if the id is unallocated, `AccessDenied` if the
    /// caller cannot access the message's room.
    pub fn get(
        &self,
        rooms: &RoomStore,
        caller: &CallerId,
        message_id: MessageId,
    ) -> Result<&Message, LedgerError> {
        let message = self.lookup(message_id).ok_or(LedgerError::MessageNotFound { message_id })?;
        rooms.ensure_access(message.room_id, caller)?;
        Ok(message)
    }

    /// Every message id of a room in posting order.
    ///
    /// The returned iterator can be cloned and replayed; since the index is
    /// append-only, a fresh call later yields this sequence as a prefix.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `AccessDenied`.
    pub fn list_ids(
        &self,
        rooms: &RoomStore,
        caller: &CallerId,
        room_id: RoomId,
    ) -> Result<MessageIds<'_>, LedgerError> {
        rooms.ensure_access(room_id, caller)?;
        Ok(self.index(room_id).iter().copied())
    }

    /// Up to `limit` messages of a room starting at `offset`, oldest first.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `AccessDenied`, and `OutOfBounds` when `offset` is not
    /// below the room's message count. `limit == 0` yields nothing.
    pub fn page(
        &self,
        rooms: &RoomStore,
        caller: &CallerId,
        room_id: RoomId,
        offset: u64,
        limit: u64,
    ) -> Result<impl Iterator<Item = &Message> + '_, LedgerError> {
        rooms.ensure_access(room_id, caller)?;

        let index = self.index(room_id);
        let total = index.len() as u64;
        if offset >= total {
            return Err(LedgerError::OutOfBounds { offset, total });
        }

        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit.min(total - offset)).unwrap_or(usize::MAX);

        Ok(index[start..].iter().take(take).filter_map(move |id| self.lookup(*id)))
    }

    /// Messages in a room the caller can access.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `AccessDenied`.
    pub fn room_count(
        &self,
        rooms: &RoomStore,
        caller: &CallerId,
        room_id: RoomId,
    ) -> Result<u64, LedgerError> {
        Ok(rooms.ensure_access(room_id, caller)?.message_count)
    }

    fn index(&self, room_id: RoomId) -> &[MessageId] {
        self.room_index.get(&room_id).map(Vec::as_slice).unwrap_or_default()
    }

    fn lookup(&self, message_id: MessageId) -> Option<&Message> {
        usize::try_from(message_id).ok().and_then(|idx| self.messages.get(idx))
    }
}
