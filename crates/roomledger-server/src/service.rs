//! Serialized access to the ledger.
//!
//! `LedgerService` is the concurrency shell around the sans-IO [`Ledger`]:
//! one `RwLock` guards all ledger state, every write runs under the write
//! guard as one indivisible step, and reads share the read guard so they
//! always see a committed state. Events are enqueued for the dispatcher
//! before the write guard drops (a non-blocking push), so subscribers observe
//! them in commit order, while sink I/O happens on the dispatcher task.

use std::sync::Arc;

use roomledger_core::{
    CallerId, Environment, GENERAL_ROOM_ID, Ledger, LedgerConfig, LedgerError, LedgerEvent,
    Message, MessageId, Outcome, Room, RoomId, Timestamp,
};
use tokio::sync::RwLock;

use crate::{
    dispatch::DispatchHandle,
    protocol::{MAX_PAGE_LIMIT, Request, Response, ResponseBody},
};

/// Shared, cloneable handle to one ledger.
pub struct LedgerService<E: Environment> {
    ledger: Arc<RwLock<Ledger>>,
    env: E,
    notifier: DispatchHandle,
}

impl<E: Environment> Clone for LedgerService<E> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            env: self.env.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<E: Environment> std::fmt::Debug for LedgerService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService").finish_non_exhaustive()
    }
}

impl<E: Environment> LedgerService<E> {
    /// Create the ledger at `env.now()` and announce the General room.
    pub fn new(env: E, config: LedgerConfig, notifier: DispatchHandle) -> Self {
        let ledger = Ledger::new(config, env.now());
        notifier.publish(ledger.get_room(GENERAL_ROOM_ID).map(LedgerEvent::room_created));

        Self { ledger: Arc::new(RwLock::new(ledger)), env, notifier }
    }

    /// Environment used for timestamps and connection ids.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Run one mutating operation under the write guard.
    async fn commit<T>(
        &self,
        op: impl FnOnce(&mut Ledger) -> Result<Outcome<T>, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut ledger = self.ledger.write().await;
        let (value, events) = op(&mut ledger)?.into_parts();
        self.notifier.publish(events);
        Ok(value)
    }

    /// Run one read under the read guard.
    async fn read<T>(&self, op: impl FnOnce(&Ledger) -> T) -> T {
        let ledger = self.ledger.read().await;
        op(&ledger)
    }

    /// See [`Ledger::register_user`].
    pub async fn register_user(
        &self,
        caller: &CallerId,
        username: &str,
    ) -> Result<(), LedgerError> {
        self.commit(|l| l.register_user(caller, username)).await
    }

    /// See [`Ledger::create_room`]; the creation time is `env.now()`.
    pub async fn create_room(
        &self,
        caller: &CallerId,
        name: &str,
        is_private: bool,
    ) -> Result<RoomId, LedgerError> {
        let now = self.env.now();
        self.commit(|l| l.create_room(caller, name, is_private, now)).await
    }

    /// See [`Ledger::add_member`].
    pub async fn add_member(
        &self,
        caller: &CallerId,
        room_id: RoomId,
        member: &CallerId,
    ) -> Result<(), LedgerError> {
        self.commit(|l| l.add_member(caller, room_id, member)).await
    }

    /// See [`Ledger::remove_member`].
    pub async fn remove_member(
        &self,
        caller: &CallerId,
        room_id: RoomId,
        member: &CallerId,
    ) -> Result<(), LedgerError> {
        self.commit(|l| l.remove_member(caller, room_id, member)).await
    }

    /// Post at the environment's current time.
    pub async fn post_message(
        &self,
        caller: &CallerId,
        room_id: RoomId,
        content: &str,
    ) -> Result<MessageId, LedgerError> {
        self.post_message_at(caller, room_id, content, self.env.now()).await
    }

    /// Post with a caller-supplied timestamp. See [`Ledger::post_message`].
    pub async fn post_message_at(
        &self,
        caller: &CallerId,
        room_id: RoomId,
        content: &str,
        now: Timestamp,
    ) -> Result<MessageId, LedgerError> {
        self.commit(|l| l.post_message(caller, room_id, content, now)).await
    }

    /// See [`Ledger::get_message`].
    pub async fn get_message(
        &self,
        caller: &CallerId,
        message_id: MessageId,
    ) -> Result<Message, LedgerError> {
        self.read(|l| l.get_message(caller, message_id).cloned()).await
    }

    /// See [`Ledger::list_room_message_ids`].
    pub async fn list_room_message_ids(
        &self,
        caller: &CallerId,
        room_id: RoomId,
    ) -> Result<Vec<MessageId>, LedgerError> {
        self.read(|l| l.list_room_message_ids(caller, room_id).map(Iterator::collect)).await
    }

    /// See [`Ledger::page_room_messages`].
    pub async fn page_room_messages(
        &self,
        caller: &CallerId,
        room_id: RoomId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, LedgerError> {
        self.read(|l| {
            l.page_room_messages(caller, room_id, offset, limit)
                .map(|page| page.cloned().collect())
        })
        .await
    }

    /// See [`Ledger::is_member`].
    pub async fn is_member(&self, member: &CallerId, room_id: RoomId) -> Result<bool, LedgerError> {
        self.read(|l| l.is_member(member, room_id)).await
    }

    /// See [`Ledger::get_room`].
    pub async fn get_room(&self, room_id: RoomId) -> Result<Room, LedgerError> {
        self.read(|l| l.get_room(room_id).cloned()).await
    }

    /// See [`Ledger::username`].
    pub async fn username(&self, caller: &CallerId) -> String {
        self.read(|l| l.username(caller).to_string()).await
    }

    /// See [`Ledger::total_rooms`].
    pub async fn total_rooms(&self) -> u64 {
        self.read(Ledger::total_rooms).await
    }

    /// See [`Ledger::total_messages`].
    pub async fn total_messages(&self) -> u64 {
        self.read(Ledger::total_messages).await
    }

    /// See [`Ledger::room_message_count`].
    pub async fn room_message_count(
        &self,
        caller: &CallerId,
        room_id: RoomId,
    ) -> Result<u64, LedgerError> {
        self.read(|l| l.room_message_count(caller, room_id)).await
    }

    /// Execute a wire request.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::RegisterUser { caller, username } => {
                self.register_user(&caller, &username).await.into()
            },
            Request::CreateRoom { caller, name, is_private } => {
                self.create_room(&caller, &name, is_private).await.map(ResponseBody::RoomId).into()
            },
            Request::AddMember { caller, room_id, member } => {
                self.add_member(&caller, room_id, &member).await.into()
            },
            Request::RemoveMember { caller, room_id, member } => {
                self.remove_member(&caller, room_id, &member).await.into()
            },
            Request::PostMessage { caller, room_id, content } => {
                let posted = self.post_message(&caller, room_id, &content).await;
                posted.map(ResponseBody::MessageId).into()
            },
            Request::GetMessage { caller, message_id } => {
                self.get_message(&caller, message_id).await.into()
            },
            Request::ListRoomMessageIds { caller, room_id } => self
                .list_room_message_ids(&caller, room_id)
                .await
                .map(ResponseBody::MessageIds)
                .into(),
            Request::PageRoomMessages { limit, .. } if limit > MAX_PAGE_LIMIT => {
                Response::from(LedgerError::InvalidInput {
                    reason: format!("page limit {limit} exceeds {MAX_PAGE_LIMIT}"),
                })
            },
            Request::PageRoomMessages { caller, room_id, offset, limit } => {
                self.page_room_messages(&caller, room_id, offset, limit).await.into()
            },
            Request::IsMember { room_id, member } => {
                self.is_member(&member, room_id).await.map(ResponseBody::Flag).into()
            },
            Request::GetRoom { room_id } => self.get_room(room_id).await.into(),
            Request::GetUsername { caller } => {
                Response::Ok(ResponseBody::Username(self.username(&caller).await))
            },
            Request::TotalRooms => Response::Ok(ResponseBody::Count(self.total_rooms().await)),
            Request::TotalMessages => {
                Response::Ok(ResponseBody::Count(self.total_messages().await))
            },
            Request::RoomMessageCount { caller, room_id } => {
                self.room_message_count(&caller, room_id).await.map(ResponseBody::Count).into()
            },
        }
    }
}
