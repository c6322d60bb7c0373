//! Roomledger core: a sans-IO multi-room message ledger.
//!
//! Users register unique display names, create public or private rooms, and
//! post rate-limited messages that are durably ordered and retrievable by
//! room. This crate is pure state: no clocks, no sockets, no locks.
//!
//! ## Architecture
//!
//! ```text
//! Ledger                 (facade, one entry point per operation)
//!   ├─ IdentityRegistry  (username <-> caller, global uniqueness)
//!   ├─ RateLimiter       (per-caller cooldown)
//!   ├─ RoomStore         (rooms, membership, the access predicate)
//!   └─ MessageStore      (global log, per-room index, pagination)
//! ```
//!
//! Mutating operations return an [`Outcome`] holding the events they
//! produced; delivering those is the caller's job.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
mod error;
pub mod event;
pub mod identity;
mod ledger;
pub mod message;
pub mod rate_limit;
pub mod room;

pub use env::Environment;
pub use error::{ErrorKind, LedgerError};
pub use event::LedgerEvent;
pub use identity::{CallerId, IdentityRegistry, MAX_USERNAME_LEN, UserProfile};
pub use ledger::{Ledger, LedgerConfig, Outcome};
pub use message::{MAX_CONTENT_LEN, Message, MessageIds, MessageStore};
pub use rate_limit::{DEFAULT_COOLDOWN_SECS, RateLimiter};
pub use room::{GENERAL_ROOM_ID, GENERAL_ROOM_NAME, MAX_ROOM_NAME_LEN, Room, RoomStore};

/// Sequential room identifier; 0 is the General room.
pub type RoomId = u64;

/// Sequential message identifier, global across rooms.
pub type MessageId = u64;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;
