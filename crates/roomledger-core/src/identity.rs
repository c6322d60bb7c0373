//! Caller identities and the username registry.
//!
//! The ledger never authenticates anyone. A [`CallerId`] arrives already
//! authenticated by the transport and is only ever used as a map key.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{LedgerError, event::LedgerEvent};

/// Longest accepted username, in UTF-8 bytes.
pub const MAX_USERNAME_LEN: usize = 32;

/// Opaque, externally authenticated principal (address, account id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    /// Wrap an identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty identity and for an all-zero hex address (`0x00..0`).
    pub fn is_null(&self) -> bool {
        match self.0.strip_prefix("0x") {
            Some(digits) => digits.bytes().all(|b| b == b'0'),
            None => self.0.is_empty(),
        }
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CallerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Registered display name of a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Current username (1..=32 bytes).
    pub username: String,
    /// Always true once a profile exists.
    pub registered: bool,
}

/// Username <-> caller binding with global uniqueness.
#[derive(Debug, Default, Clone)]
pub struct IdentityRegistry {
    /// One profile per caller, never deleted.
    profiles: HashMap<CallerId, UserProfile>,
    /// Uniqueness set: claimed username -> owning caller.
    claims: HashMap<String, CallerId>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `caller`, releasing the caller's previous name.
    ///
    /// Re-registering the name the caller already holds is accepted as a
    /// no-op claim and still reported as a profile update.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `name` is empty or longer than
    ///   [`MAX_USERNAME_LEN`] bytes.
    /// - `NameTaken` if another caller holds `name`.
    pub fn set_username(
        &mut self,
        caller: &CallerId,
        name: &str,
    ) -> Result<LedgerEvent, LedgerError> {
        if name.is_empty() || name.len() > MAX_USERNAME_LEN {
            return Err(LedgerError::invalid(format!(
                "username must be 1..={MAX_USERNAME_LEN} bytes, got {}",
                name.len()
            )));
        }

        if let Some(owner) = self.claims.get(name) {
            if owner != caller {
                return Err(LedgerError::NameTaken { username: name.to_string() });
            }
        }

        // Nothing below can fail, so release-then-claim happens as one step.
        if let Some(previous) = self.profiles.get(caller) {
            if previous.username != name {
                self.claims.remove(&previous.username);
            }
        }
        self.claims.insert(name.to_string(), caller.clone());
        self.profiles
            .insert(caller.clone(), UserProfile { username: name.to_string(), registered: true });

        Ok(LedgerEvent::ProfileUpdated { caller: caller.clone(), username: name.to_string() })
    }

    /// Username of `caller`, or the empty string if unregistered.
    pub fn username(&self, caller: &CallerId) -> &str {
        self.profiles.get(caller).map_or("", |p| p.username.as_str())
    }

    /// Full profile of `caller`.
    pub fn profile(&self, caller: &CallerId) -> Option<&UserProfile> {
        self.profiles.get(caller)
    }

    /// Caller currently holding `name`.
    pub fn owner_of(&self, name: &str) -> Option<&CallerId> {
        self.claims.get(name)
    }

    /// Number of registered callers.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// True if nobody has registered.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
