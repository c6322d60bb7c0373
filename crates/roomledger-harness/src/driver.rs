//! Drives the real [`Ledger`] with model operations.
//!
//! `LedgerDriver` mirrors [`ModelWorld`](crate::ModelWorld)'s interface so the
//! two can be stepped side by side and their results compared.

use roomledger_core::{CallerId, Ledger, LedgerConfig, LedgerError, Timestamp};

use crate::model::{ClientId, NULL_CLIENT, ObservableState, Operation, OperationResult, caller_id};

/// Real ledger plus the simulated clock the model uses.
#[derive(Debug, Clone)]
pub struct LedgerDriver {
    ledger: Ledger,
    now: Timestamp,
    callers: Vec<CallerId>,
}

impl LedgerDriver {
    /// Ledger with `num_clients` clients, the default cooldown, and the clock
    /// at `now`. Client 0 is the initializer.
    pub fn new(num_clients: usize, now: Timestamp) -> Self {
        Self::with_cooldown(num_clients, now, LedgerConfig::default().cooldown_secs)
    }

    /// Ledger with an explicit cooldown.
    pub fn with_cooldown(num_clients: usize, now: Timestamp, cooldown_secs: u64) -> Self {
        let callers: Vec<_> = (0..num_clients)
            .map(|c| caller_id(ClientId::try_from(c).unwrap_or(NULL_CLIENT)))
            .collect();
        let config = LedgerConfig { initializer: caller_id(0), cooldown_secs };

        Self { ledger: Ledger::new(config, now), now, callers }
    }

    /// The ledger under test.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Apply an operation to the real ledger.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Register { client_id, name } => {
                let result = self.ledger.register_user(&caller_id(client_id), &name.username());
                settle(result.map(|_| OperationResult::Ok))
            },
            Operation::CreateRoom { client_id, name, is_private } => {
                let result = self.ledger.create_room(
                    &caller_id(client_id),
                    &name.room_name(),
                    is_private,
                    self.now,
                );
                settle(result.map(|o| OperationResult::Id(o.value)))
            },
            Operation::AddMember { client_id, room_id, member } => {
                let result = self.ledger.add_member(
                    &caller_id(client_id),
                    u64::from(room_id),
                    &caller_id(member),
                );
                settle(result.map(|_| OperationResult::Ok))
            },
            Operation::RemoveMember { client_id, room_id, member } => {
                let result = self.ledger.remove_member(
                    &caller_id(client_id),
                    u64::from(room_id),
                    &caller_id(member),
                );
                settle(result.map(|_| OperationResult::Ok))
            },
            Operation::Post { client_id, room_id, content } => {
                let result = self.ledger.post_message(
                    &caller_id(client_id),
                    u64::from(room_id),
                    &content.content(),
                    self.now,
                );
                settle(result.map(|o| OperationResult::Id(o.value)))
            },
            Operation::GetMessage { client_id, message_id } => {
                let result = self.ledger.get_message(&caller_id(client_id), u64::from(message_id));
                settle(result.map(|m| OperationResult::Id(m.id)))
            },
            Operation::Page { client_id, room_id, offset, limit } => {
                let result = self.ledger.page_room_messages(
                    &caller_id(client_id),
                    u64::from(room_id),
                    u64::from(offset),
                    u64::from(limit),
                );
                settle(result.map(|page| OperationResult::Ids(page.map(|m| m.id).collect())))
            },
            Operation::AdvanceTime { secs } => {
                self.now += u64::from(secs);
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state in the model's terms.
    pub fn observable_state(&self) -> ObservableState {
        let usernames = self.callers.iter().map(|c| self.ledger.username(c).to_string()).collect();

        let rooms = (0..self.ledger.total_rooms())
            .filter_map(|id| self.ledger.get_room(id).ok())
            .map(|room| {
                let ids: Vec<_> = self
                    .ledger
                    .list_room_message_ids(&room.owner, room.id)
                    .map(Iterator::collect)
                    .unwrap_or_default();
                (self.client_of(&room.owner), room.is_private, ids)
            })
            .collect();

        ObservableState { usernames, rooms, total_messages: self.ledger.total_messages() }
    }

    fn client_of(&self, caller: &CallerId) -> ClientId {
        self.callers
            .iter()
            .position(|c| c == caller)
            .and_then(|i| ClientId::try_from(i).ok())
            .unwrap_or(NULL_CLIENT)
    }
}

fn settle(result: Result<OperationResult, LedgerError>) -> OperationResult {
    result.unwrap_or_else(|e| OperationResult::from(&e))
}
