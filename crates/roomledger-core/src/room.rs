//! Rooms, private-room membership, and the access predicate.
//!
//! ## Access rule
//!
//! Public rooms are open to every caller. A private room is open to its owner
//! and to callers in its membership set. The owner is treated as a member
//! whether or not the set contains them, and can never be removed from it.
//! [`RoomStore::can_access`] is the only place this rule is written down;
//! every read and write path goes through it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{CallerId, LedgerError, RoomId, Timestamp, event::LedgerEvent};

/// Longest accepted room name, in UTF-8 bytes.
pub const MAX_ROOM_NAME_LEN: usize = 64;

/// Id of the room created at initialization.
pub const GENERAL_ROOM_ID: RoomId = 0;

/// Name of the room created at initialization.
pub const GENERAL_ROOM_NAME: &str = "General";

/// A chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Sequential id, starting at 0.
    pub id: RoomId,
    /// Display name (1..=64 bytes).
    pub name: String,
    /// Creator; implicitly a member.
    pub owner: CallerId,
    /// Restricts access to owner and members.
    pub is_private: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Messages posted to this room.
    pub message_count: u64,
}

/// Owns every room and the private-room membership sets.
#[derive(Debug, Clone)]
pub struct RoomStore {
    /// Indexed by room id; ids are never reused.
    rooms: Vec<Room>,
    /// Explicit members of private rooms.
    members: HashMap<RoomId, HashSet<CallerId>>,
}

impl RoomStore {
    /// Create the store with the public General room owned by `initializer`.
    pub fn new(initializer: CallerId, now: Timestamp) -> Self {
        let general = Room {
            id: GENERAL_ROOM_ID,
            name: GENERAL_ROOM_NAME.to_string(),
            owner: initializer,
            is_private: false,
            created_at: now,
            message_count: 0,
        };

        Self { rooms: vec![general], members: HashMap::new() }
    }

    /// Number of rooms, which is also the next room id.
    pub fn len(&self) -> u64 {
        self.rooms.len() as u64
    }

    /// Always false: the General room exists from construction.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Look up a room.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if `room_id` has not been allocated.
    pub fn get(&self, room_id: RoomId) -> Result<&Room, LedgerError> {
        usize::try_from(room_id)
            .ok()
            .and_then(|idx| self.rooms.get(idx))
            .ok_or(LedgerError::RoomNotFound { room_id })
    }

    fn get_mut(&mut self, room_id: RoomId) -> Result<&mut Room, LedgerError> {
        usize::try_from(room_id)
            .ok()
            .and_then(|idx| self.rooms.get_mut(idx))
            .ok_or(LedgerError::RoomNotFound { room_id })
    }

    /// Create a room owned by `caller` under the next sequential id.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `name` is empty or longer than [`MAX_ROOM_NAME_LEN`]
    /// bytes.
    pub fn create(
        &mut self,
        caller: &CallerId,
        name: &str,
        is_private: bool,
        now: Timestamp,
    ) -> Result<(RoomId, LedgerEvent), LedgerError> {
        if name.is_empty() || name.len() > MAX_ROOM_NAME_LEN {
            return Err(LedgerError::invalid(format!(
                "room name must be 1..={MAX_ROOM_NAME_LEN} bytes, got {}",
                name.len()
            )));
        }

        let room = Room {
            id: self.len(),
            name: name.to_string(),
            owner: caller.clone(),
            is_private,
            created_at: now,
            message_count: 0,
        };
        let id = room.id;
        let event = LedgerEvent::room_created(&room);

        if is_private {
            self.members.entry(id).or_default().insert(caller.clone());
        }
        self.rooms.push(room);

        Ok((id, event))
    }

    /// Owner gate shared by membership changes: the room must exist, `caller`
    /// must own it, and it must be private.
    fn administered(&self, caller: &CallerId, room_id: RoomId) -> Result<&Room, LedgerError> {
        let room = self.get(room_id)?;
        if &room.owner != caller {
            return Err(LedgerError::Unauthorized { room_id });
        }
        if !room.is_private {
            return Err(LedgerError::invalid(format!("room {room_id} is public")));
        }
        Ok(room)
    }

    /// Grant `member` access to a private room.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `Unauthorized` (caller is not the owner),
    /// `InvalidInput` (public room or null member), `AlreadyMember`.
    pub fn add_member(
        &mut self,
        caller: &CallerId,
        room_id: RoomId,
        member: &CallerId,
    ) -> Result<LedgerEvent, LedgerError> {
        self.administered(caller, room_id)?;
        if member.is_null() {
            return Err(LedgerError::invalid("member identity is null"));
        }
        if self.can_access(room_id, member)? {
            return Err(LedgerError::AlreadyMember { room_id });
        }

        self.members.entry(room_id).or_default().insert(member.clone());

        Ok(LedgerEvent::MemberAdded { room_id, member: member.clone(), by: caller.clone() })
    }

    /// Revoke `member`'s access to a private room.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, `Unauthorized`, `InvalidInput` (public room or
    /// `member` is the owner), `NotMember`.
    pub fn remove_member(
        &mut self,
        caller: &CallerId,
        room_id: RoomId,
        member: &CallerId,
    ) -> Result<LedgerEvent, LedgerError> {
        let room = self.administered(caller, room_id)?;
        if &room.owner == member {
            return Err(LedgerError::invalid("room owner cannot be removed"));
        }

        let removed = self.members.get_mut(&room_id).is_some_and(|set| set.remove(member));
        if !removed {
            return Err(LedgerError::NotMember { room_id });
        }

        Ok(LedgerEvent::MemberRemoved { room_id, member: member.clone(), by: caller.clone() })
    }

    /// Whether `caller` may read and post in `room_id`.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if the room does not exist.
    pub fn can_access(&self, room_id: RoomId, caller: &CallerId) -> Result<bool, LedgerError> {
        let room = self.get(room_id)?;
        if !room.is_private || &room.owner == caller {
            return Ok(true);
        }
        Ok(self.is_member(room_id, caller))
    }

    /// Resolve a room the caller is allowed to use.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`, or `AccessDenied` when [`Self::can_access`] says no.
    pub fn ensure_access(&self, room_id: RoomId, caller: &CallerId) -> Result<&Room, LedgerError> {
        if !self.can_access(room_id, caller)? {
            return Err(LedgerError::AccessDenied { room_id });
        }
        self.get(room_id)
    }

    /// Explicit membership-set lookup, without the owner rule.
    pub fn is_member(&self, room_id: RoomId, caller: &CallerId) -> bool {
        self.members.get(&room_id).is_some_and(|set| set.contains(caller))
    }

    pub(crate) fn record_message(&mut self, room_id: RoomId) -> Result<(), LedgerError> {
        let room = self.get_mut(room_id)?;
        room.message_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Timestamp = 1_700_000_000;

    fn store() -> RoomStore {
        RoomStore::new(CallerId::from("deployer"), NOW)
    }

    fn owner() -> CallerId {
        CallerId::from("owner")
    }

    fn guest() -> CallerId {
        CallerId::from("guest")
    }

    #[test]
    fn general_room_exists_at_init() {
        let rooms = store();
        let general = rooms.get(GENERAL_ROOM_ID).unwrap();

        assert_eq!(general.name, GENERAL_ROOM_NAME);
        assert!(!general.is_private);
        assert_eq!(general.owner, CallerId::from("deployer"));
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn room_ids_are_sequential() {
        let mut rooms = store();
        let (a, _) = rooms.create(&owner(), "a", false, NOW).unwrap();
        let (b, _) = rooms.create(&owner(), "b", true, NOW).unwrap();

        assert_eq!((a, b), (1, 2));
        assert!(matches!(rooms.get(3), Err(LedgerError::RoomNotFound { room_id: 3 })));
    }

    #[test]
    fn invalid_name_does_not_consume_id() {
        let mut rooms = store();
        assert!(rooms.create(&owner(), "", false, NOW).is_err());
        assert!(rooms.create(&owner(), &"n".repeat(MAX_ROOM_NAME_LEN + 1), false, NOW).is_err());

        let (id, _) = rooms.create(&owner(), &"n".repeat(MAX_ROOM_NAME_LEN), false, NOW).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn public_room_is_open() {
        let mut rooms = store();
        let (id, _) = rooms.create(&owner(), "lobby", false, NOW).unwrap();
        assert!(rooms.can_access(id, &guest()).unwrap());
    }

    #[test]
    fn private_room_membership() {
        let mut rooms = store();
        let (id, _) = rooms.create(&owner(), "secret", true, NOW).unwrap();

        assert!(rooms.can_access(id, &owner()).unwrap());
        assert!(!rooms.can_access(id, &guest()).unwrap());
        assert!(matches!(
            rooms.ensure_access(id, &guest()),
            Err(LedgerError::AccessDenied { .. })
        ));

        rooms.add_member(&owner(), id, &guest()).unwrap();
        assert!(rooms.can_access(id, &guest()).unwrap());

        rooms.remove_member(&owner(), id, &guest()).unwrap();
        assert!(!rooms.can_access(id, &guest()).unwrap());
    }

    #[test]
    fn membership_changes_require_owner() {
        let mut rooms = store();
        let (id, _) = rooms.create(&owner(), "secret", true, NOW).unwrap();

        let result = rooms.add_member(&guest(), id, &guest());
        assert!(matches!(result, Err(LedgerError::Unauthorized { .. })));
    }

    #[test]
    fn membership_changes_require_private_room() {
        let mut rooms = store();
        let (id, _) = rooms.create(&owner(), "lobby", false, NOW).unwrap();

        assert!(matches!(
            rooms.add_member(&owner(), id, &guest()),
            Err(LedgerError::InvalidInput { .. })
        ));
        assert!(matches!(
            rooms.remove_member(&owner(), id, &guest()),
            Err(LedgerError::InvalidInput { .. })
        ));
    }

    #[test]
    fn add_member_rejects_null_and_duplicates() {
        let mut rooms = store();
        let (id, _) = rooms.create(&owner(), "secret", true, NOW).unwrap();

        assert!(matches!(
            rooms.add_member(&owner(), id, &CallerId::from("0x0000")),
            Err(LedgerError::InvalidInput { .. })
        ));
        rooms.add_member(&owner(), id, &guest()).unwrap();
        assert!(matches!(
            rooms.add_member(&owner(), id, &guest()),
            Err(LedgerError::AlreadyMember { .. })
        ));
        assert!(matches!(
            rooms.add_member(&owner(), id, &owner()),
            Err(LedgerError::AlreadyMember { .. })
        ));
    }

    #[test]
    fn owner_cannot_be_removed() {
        let mut rooms = store();
        let (id, _) = rooms.create(&owner(), "secret", true, NOW).unwrap();

        assert!(matches!(
            rooms.remove_member(&owner(), id, &owner()),
            Err(LedgerError::InvalidInput { .. })
        ));
        assert!(rooms.can_access(id, &owner()).unwrap());
    }

    #[test]
    fn remove_absent_member() {
        let mut rooms = store();
        let (id, _) = rooms.create(&owner(), "secret", true, NOW).unwrap();

        assert!(matches!(
            rooms.remove_member(&owner(), id, &guest()),
            Err(LedgerError::NotMember { .. })
        ));
    }

    #[test]
    fn unknown_room_is_not_found_everywhere() {
        let mut rooms = store();
        assert!(matches!(rooms.can_access(9, &owner()), Err(LedgerError::RoomNotFound { .. })));
        assert!(matches!(
            rooms.add_member(&owner(), 9, &guest()),
            Err(LedgerError::RoomNotFound { .. })
        ));
        assert!(matches!(
            rooms.remove_member(&owner(), 9, &guest()),
            Err(LedgerError::RoomNotFound { .. })
        ));
    }
}
