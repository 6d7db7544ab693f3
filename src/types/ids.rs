//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! DeliveryId where an EntityId is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A webhook delivery ID, taken from the `X-Delivery-Id` header.
///
/// Each HTTP call from the upstream event source carries a unique delivery
/// id; the store enforces uniqueness so redeliveries are idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new(s: impl Into<String>) -> Self {
        DeliveryId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeliveryId {
    fn from(s: String) -> Self {
        DeliveryId(s)
    }
}

impl From<&str> for DeliveryId {
    fn from(s: &str) -> Self {
        DeliveryId(s.to_string())
    }
}

/// The tracked entity's ID as reported in the payload's `data.id` field.
///
/// Linear entity ids are UUIDs, but the wire format does not guarantee that,
/// so this is an opaque string. Events whose `data` carries no `id` use
/// [`EntityId::unknown`] as a sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(s: impl Into<String>) -> Self {
        EntityId(s.into())
    }

    /// Sentinel for payloads whose `data` object has no `id` field.
    pub fn unknown() -> Self {
        EntityId("unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (8-character) version of the id for branch names.
    ///
    /// Uses `get()` to avoid panicking on a multi-byte boundary if the
    /// upstream ever sends a non-ASCII id.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}
