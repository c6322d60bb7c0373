//! Model world - the reference ledger.
//!
//! A deliberately naive re-statement of the ledger rules: flat vectors,
//! linear scans, no indices. It is the oracle the real `Ledger` is compared
//! against, so it favors being obviously correct over being fast.

use std::collections::{BTreeSet, HashMap};

use roomledger_core::{
    DEFAULT_COOLDOWN_SECS, MAX_CONTENT_LEN, MAX_ROOM_NAME_LEN, MAX_USERNAME_LEN, Timestamp,
};

use super::operation::{
    ClientId, ModelRoomId, NULL_CLIENT, Operation, OperationError, OperationResult,
};

/// Room as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoom {
    /// Creator.
    pub owner: ClientId,
    /// Members-only access.
    pub is_private: bool,
    /// Explicit membership set (owner included for private rooms).
    pub members: BTreeSet<ClientId>,
}

/// Message as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMessage {
    /// Room posted to.
    pub room: u64,
    /// Author.
    pub sender: ClientId,
    /// Body.
    pub content: String,
    /// Post time.
    pub timestamp: Timestamp,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Username of each client, empty if unregistered.
    pub usernames: Vec<String>,
    /// `(owner, is_private, message ids)` per room.
    pub rooms: Vec<(ClientId, bool, Vec<u64>)>,
    /// Total messages.
    pub total_messages: u64,
}

/// Model world - the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    num_clients: usize,
    cooldown: u64,
    now: Timestamp,
    usernames: HashMap<ClientId, String>,
    rooms: Vec<ModelRoom>,
    messages: Vec<ModelMessage>,
    last_post: HashMap<ClientId, Timestamp>,
}

impl ModelWorld {
    /// World with `num_clients` clients, the default cooldown, and the clock
    /// at `now`. Client 0 owns the General room.
    pub fn new(num_clients: usize, now: Timestamp) -> Self {
        Self::with_cooldown(num_clients, now, DEFAULT_COOLDOWN_SECS)
    }

    /// World with an explicit cooldown.
    pub fn with_cooldown(num_clients: usize, now: Timestamp, cooldown: u64) -> Self {
        let general = ModelRoom { owner: 0, is_private: false, members: BTreeSet::new() };
        Self {
            num_clients,
            cooldown,
            now,
            usernames: HashMap::new(),
            rooms: vec![general],
            messages: Vec::new(),
            last_post: HashMap::new(),
        }
    }

    /// Current model time.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Room by id.
    pub fn room(&self, room_id: u64) -> Option<&ModelRoom> {
        usize::try_from(room_id).ok().and_then(|i| self.rooms.get(i))
    }

    /// Apply an operation and return the result.
    ///
    /// This is the main entry point for model-based testing.
    /// The result should match the real implementation's result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Register { client_id, name } => self.register(client_id, &name.username()),
            Operation::CreateRoom { client_id, name, is_private } => {
                self.create_room(client_id, &name.room_name(), is_private)
            },
            Operation::AddMember { client_id, room_id, member } => {
                self.add_member(client_id, room_id, member)
            },
            Operation::RemoveMember { client_id, room_id, member } => {
                self.remove_member(client_id, room_id, member)
            },
            Operation::Post { client_id, room_id, content } => {
                self.post(client_id, room_id, &content.content())
            },
            Operation::GetMessage { client_id, message_id } => {
                self.get_message(client_id, message_id)
            },
            Operation::Page { client_id, room_id, offset, limit } => {
                self.page(client_id, room_id, offset, limit)
            },
            Operation::AdvanceTime { secs } => {
                self.now += u64::from(secs);
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let usernames = (0..self.num_clients)
            .map(|c| {
                let c = ClientId::try_from(c).unwrap_or(NULL_CLIENT);
                self.usernames.get(&c).cloned().unwrap_or_default()
            })
            .collect();

        let rooms = self
            .rooms
            .iter()
            .enumerate()
            .map(|(i, room)| (room.owner, room.is_private, self.room_messages(i as u64)))
            .collect();

        ObservableState { usernames, rooms, total_messages: self.messages.len() as u64 }
    }

    fn room_messages(&self, room: u64) -> Vec<u64> {
        (0..self.messages.len() as u64)
            .filter(|&id| self.messages[id as usize].room == room)
            .collect()
    }

    fn can_access(&self, client: ClientId, room: &ModelRoom) -> bool {
        !room.is_private || room.owner == client || room.members.contains(&client)
    }

    /// Room lookup plus access check, in that order.
    fn accessible(&self, client: ClientId, room_id: u64) -> Result<&ModelRoom, OperationError> {
        let room = self.room(room_id).ok_or(OperationError::NotFound)?;
        if !self.can_access(client, room) {
            return Err(OperationError::AccessDenied);
        }
        Ok(room)
    }

    fn register(&mut self, client: ClientId, name: &str) -> OperationResult {
        if name.is_empty() || name.len() > MAX_USERNAME_LEN {
            return OperationResult::Error(OperationError::InvalidInput);
        }
        let taken = self.usernames.iter().any(|(c, n)| n == name && *c != client);
        if taken {
            return OperationResult::Error(OperationError::NameTaken);
        }
        self.usernames.insert(client, name.to_string());
        OperationResult::Ok
    }

    fn create_room(&mut self, client: ClientId, name: &str, is_private: bool) -> OperationResult {
        if name.is_empty() || name.len() > MAX_ROOM_NAME_LEN {
            return OperationResult::Error(OperationError::InvalidInput);
        }
        let members = if is_private { BTreeSet::from([client]) } else { BTreeSet::new() };
        self.rooms.push(ModelRoom { owner: client, is_private, members });
        OperationResult::Id(self.rooms.len() as u64 - 1)
    }

    fn owned_private_room(
        &mut self,
        client: ClientId,
        room_id: ModelRoomId,
    ) -> Result<&mut ModelRoom, OperationError> {
        let room = self.rooms.get_mut(usize::from(room_id)).ok_or(OperationError::NotFound)?;
        if room.owner != client {
            return Err(OperationError::Unauthorized);
        }
        if !room.is_private {
            return Err(OperationError::InvalidInput);
        }
        Ok(room)
    }

    fn add_member(
        &mut self,
        client: ClientId,
        room_id: ModelRoomId,
        member: ClientId,
    ) -> OperationResult {
        let room = match self.owned_private_room(client, room_id) {
            Ok(room) => room,
            Err(e) => return OperationResult::Error(e),
        };
        if member == NULL_CLIENT {
            return OperationResult::Error(OperationError::InvalidInput);
        }
        if member == room.owner || !room.members.insert(member) {
            return OperationResult::Error(OperationError::AlreadyMember);
        }
        OperationResult::Ok
    }

    fn remove_member(
        &mut self,
        client: ClientId,
        room_id: ModelRoomId,
        member: ClientId,
    ) -> OperationResult {
        let room = match self.owned_private_room(client, room_id) {
            Ok(room) => room,
            Err(e) => return OperationResult::Error(e),
        };
        if member == room.owner {
            return OperationResult::Error(OperationError::InvalidInput);
        }
        if !room.members.remove(&member) {
            return OperationResult::Error(OperationError::NotMember);
        }
        OperationResult::Ok
    }

    fn post(&mut self, client: ClientId, room_id: ModelRoomId, content: &str) -> OperationResult {
        let room = u64::from(room_id);
        if let Err(e) = self.accessible(client, room) {
            return OperationResult::Error(e);
        }
        if content.is_empty() || content.len() > MAX_CONTENT_LEN {
            return OperationResult::Error(OperationError::InvalidInput);
        }
        if let Some(&last) = self.last_post.get(&client) {
            if self.now < last.saturating_add(self.cooldown) {
                return OperationResult::Error(OperationError::CooldownActive);
            }
        }

        self.last_post.insert(client, self.now);
        self.messages.push(ModelMessage {
            room,
            sender: client,
            content: content.to_string(),
            timestamp: self.now,
        });
        OperationResult::Id(self.messages.len() as u64 - 1)
    }

    fn get_message(&self, client: ClientId, message_id: u8) -> OperationResult {
        let Some(message) = self.messages.get(usize::from(message_id)) else {
            return OperationResult::Error(OperationError::NotFound);
        };
        match self.accessible(client, message.room) {
            Ok(_) => OperationResult::Id(u64::from(message_id)),
            Err(e) => OperationResult::Error(e),
        }
    }

    fn page(
        &self,
        client: ClientId,
        room_id: ModelRoomId,
        offset: u8,
        limit: u8,
    ) -> OperationResult {
        let room = u64::from(room_id);
        if let Err(e) = self.accessible(client, room) {
            return OperationResult::Error(e);
        }
        let ids = self.room_messages(room);
        let offset = usize::from(offset);
        if offset >= ids.len() {
            return OperationResult::Error(OperationError::OutOfBounds);
        }
        OperationResult::Ids(ids.into_iter().skip(offset).take(usize::from(limit)).collect())
    }
}
