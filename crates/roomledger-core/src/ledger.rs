//! Ledger aggregate.
//!
//! Composes the identity registry, rate limiter, room store and message store
//! behind the externally exposed operation set.
//!
//! ## Design
//!
//! - Exclusive access: mutating operations take `&mut self`, so an operation
//!   can never interleave with another. The shell decides how to serialize
//!   callers (a lock, an actor); the ledger only relies on Rust's aliasing
//!   rules.
//! - Validate, then write: every component checks all of its preconditions
//!   before touching state, so a rejected operation leaves no trace and never
//!   consumes an id.
//! - Action-based: events are returned in an [`Outcome`], never delivered from
//!   here.

use tracing::{debug, trace};

use crate::{
    CallerId, LedgerError, MessageId, RoomId, Timestamp,
    event::LedgerEvent,
    identity::IdentityRegistry,
    message::{Message, MessageIds, MessageStore, PostRequest},
    rate_limit::{DEFAULT_COOLDOWN_SECS, RateLimiter},
    room::{Room, RoomStore},
};

/// Ledger configuration fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Owner of the General room.
    pub initializer: CallerId,
    /// Minimum seconds between two posts by the same caller.
    pub cooldown_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { initializer: CallerId::from("system"), cooldown_secs: DEFAULT_COOLDOWN_SECS }
    }
}

/// Result of a committed operation and the events it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    /// Operation result.
    pub value: T,
    /// Notifications to hand to subscribers, in commit order.
    pub events: Vec<LedgerEvent>,
}

impl<T> Outcome<T> {
    fn new(value: T, event: LedgerEvent) -> Self {
        Self { value, events: vec![event] }
    }

    /// Split into value and events.
    pub fn into_parts(self) -> (T, Vec<LedgerEvent>) {
        (self.value, self.events)
    }
}

/// The multi-room message ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    config: LedgerConfig,
    identities: IdentityRegistry,
    limiter: RateLimiter,
    rooms: RoomStore,
    messages: MessageStore,
}

/// Log rejections at trace level; they are routine caller errors.
fn traced<T>(op: &'static str, result: Result<T, LedgerError>) -> Result<T, LedgerError> {
    if let Err(ref e) = result {
        trace!(op, error = %e, "operation rejected");
    }
    result
}

impl Ledger {
    /// Create a ledger whose General room is owned by `config.initializer`.
    pub fn new(config: LedgerConfig, now: Timestamp) -> Self {
        let rooms = RoomStore::new(config.initializer.clone(), now);
        Self {
            config,
            identities: IdentityRegistry::new(),
            limiter: RateLimiter::new(),
            rooms,
            messages: MessageStore::new(),
        }
    }

    /// Bind a username to the caller.
    ///
    /// # Errors
    ///
    /// `InvalidInput`, `NameTaken`.
    pub fn register_user(
        &mut self,
        caller: &CallerId,
        username: &str,
    ) -> Result<Outcome<()>, LedgerError> {
        let event = traced("register_user", self.identities.set_username(caller, username))?;
        debug!(%caller, username, "username registered");
        Ok(Outcome::new((), event))
    }

    /// Create a room owned by the caller.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty or oversized name.
    pub fn create_room(
        &mut self,
        caller: &CallerId,
        name: &str,
        is_private: bool,
        now: Timestamp,
    ) -> Result<Outcome<RoomId>, LedgerError> {
        let (room_id, event) =
            traced("create_room", self.rooms.create(caller, name, is_private, now))?;
        debug!(%caller, room_id, is_private, "room created");
        Ok(Outcome::new(room_id, event))
    }

    /// Grant `member` access to a private room owned by the caller.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `Unauthorized`, `InvalidInput`, `AlreadyMember`.
    pub fn add_member(
        &mut self,
        caller: &CallerId,
        room_id: RoomId,
        member: &CallerId,
    ) -> Result<Outcome<()>, LedgerError> {
        let event = traced("add_member", self.rooms.add_member(caller, room_id, member))?;
        debug!(%caller, room_id, %member, "member added");
        Ok(Outcome::new((), event))
    }

    /// Revoke `member`'s access to a private room owned by the caller.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `Unauthorized`, `InvalidInput`, `NotMember`.
    pub fn remove_member(
        &mut self,
        caller: &CallerId,
        room_id: RoomId,
        member: &CallerId,
    ) -> Result<Outcome<()>, LedgerError> {
        let event = traced("remove_member", self.rooms.remove_member(caller, room_id, member))?;
        debug!(%caller, room_id, %member, "member removed");
        Ok(Outcome::new((), event))
    }

    /// Post a message at `now`, subject to the caller's cooldown.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `AccessDenied`, `InvalidInput`, `CooldownActive`.
    pub fn post_message(
        &mut self,
        caller: &CallerId,
        room_id: RoomId,
        content: &str,
        now: Timestamp,
    ) -> Result<Outcome<MessageId>, LedgerError> {
        let cooldown = self.config.cooldown_secs;
        let req = PostRequest { caller, room_id, content, now, cooldown };
        let (message_id, event) =
            traced("post_message", self.messages.post(&mut self.rooms, &mut self.limiter, req))?;
        debug!(%caller, room_id, message_id, "message posted");
        Ok(Outcome::new(message_id, event))
    }

    /// Read one message.
    ///
    /// # Errors
    ///
    /// `MessageNotFound`, `AccessDenied`.
    pub fn get_message(
        &self,
        caller: &CallerId,
        message_id: MessageId,
    ) -> Result<&Message, LedgerError> {
        self.messages.get(&self.rooms, caller, message_id)
    }

    /// All message ids of a room in posting order.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `AccessDenied`.
    pub fn list_room_message_ids(
        &self,
        caller: &CallerId,
        room_id: RoomId,
    ) -> Result<MessageIds<'_>, LedgerError> {
        self.messages.list_ids(&self.rooms, caller, room_id)
    }

    /// Up to `limit` messages of a room starting at `offset`.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `AccessDenied`, `OutOfBounds`.
    pub fn page_room_messages(
        &self,
        caller: &CallerId,
        room_id: RoomId,
        offset: u64,
        limit: u64,
    ) -> Result<impl Iterator<Item = &Message> + '_, LedgerError> {
        self.messages.page(&self.rooms, caller, room_id, offset, limit)
    }

    /// Look up a room. Room metadata is public, even for private rooms.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`.
    pub fn get_room(&self, room_id: RoomId) -> Result<&Room, LedgerError> {
        self.rooms.get(room_id)
    }

    /// Username of the caller, empty if unregistered.
    pub fn username(&self, caller: &CallerId) -> &str {
        self.identities.username(caller)
    }

    /// Rooms created so far, including General.
    pub fn total_rooms(&self) -> u64 {
        self.rooms.len()
    }

    /// Messages posted so far across all rooms.
    pub fn total_messages(&self) -> u64 {
        self.messages.len()
    }

    /// Messages in a room the caller can access.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `AccessDenied`.
    pub fn room_message_count(
        &self,
        caller: &CallerId,
        room_id: RoomId,
    ) -> Result<u64, LedgerError> {
        self.messages.room_count(&self.rooms, caller, room_id)
    }

    /// Whether the caller may read and post in a room.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`.
    pub fn can_access(&self, caller: &CallerId, room_id: RoomId) -> Result<bool, LedgerError> {
        self.rooms.can_access(room_id, caller)
    }

    /// Whether the caller is in a room's explicit membership set. Public rooms
    /// have an empty set.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`.
    pub fn is_member(&self, caller: &CallerId, room_id: RoomId) -> Result<bool, LedgerError> {
        self.rooms.get(room_id)?;
        Ok(self.rooms.is_member(room_id, caller))
    }

    /// Seconds the caller must wait before posting at `now`.
    pub fn cooldown_remaining(&self, caller: &CallerId, now: Timestamp) -> u64 {
        self.limiter.remaining(caller, now, self.config.cooldown_secs)
    }
}
