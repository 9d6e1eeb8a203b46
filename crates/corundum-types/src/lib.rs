//! # corundum-types: Core types for the Corundum client SDK
//!
//! This crate contains the shared types used across the Corundum client:
//! - Entity IDs ([`StoreId`], [`MessageId`])
//! - The opaque serialized-item payload ([`SerializedItem`])
//! - The item-marshaling boundary ([`ItemMarshaler`], [`MarshalError`])
//!
//! Item schemas are defined by generated code outside this workspace; the
//! client only ever moves [`SerializedItem`] values across the wire and
//! hands them to an [`ItemMarshaler`] supplied by the caller.

use std::fmt::Display;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Entity IDs - All Copy (cheap 8-byte values)
// ============================================================================

/// Unique identifier for a store. All operations of one client are scoped
/// to a single store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(u64);

impl StoreId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StoreId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<StoreId> for u64 {
    fn from(id: StoreId) -> Self {
        id.0
    }
}

/// Sequence number correlating a request with its response(s) on a shared
/// bidirectional stream.
///
/// Strictly increasing within one transaction session, starting at 1 for
/// the begin command. The session owns allocation; everything else only
/// compares IDs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MessageId(u64);

impl MessageId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the next ID in the sequence.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<MessageId> for u64 {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

// ============================================================================
// Serialized items
// ============================================================================

/// An item as it travels over the wire: an opaque payload plus the logical
/// type tag callers use for narrowing.
///
/// The payload encoding is owned entirely by the caller's marshaler; the
/// client round-trips it untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedItem {
    /// Logical item type from the caller's schema (e.g. `"Equipment"`).
    pub item_type: String,
    /// Opaque encoded payload.
    pub payload: Bytes,
}

impl SerializedItem {
    pub fn new(item_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            item_type: item_type.into(),
            payload: payload.into(),
        }
    }
}

/// Errors produced at the item-marshaling boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// The item's type tag did not match what the caller asked for.
    #[error("expected item type {expected}, got {actual}")]
    TypeMismatch {
        /// The type tag the caller requested.
        expected: String,
        /// The type tag found on the wire item.
        actual: String,
    },

    /// The payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

/// Converts between the caller's concrete item type and the opaque wire
/// representation.
///
/// Implementations come from generated schema code and must be safe for
/// concurrent use; one marshaler is shared by every session of a client.
pub trait ItemMarshaler {
    /// The caller-facing item type.
    type Item;

    /// Encodes an item into its wire representation.
    fn marshal(&self, item: &Self::Item) -> Result<SerializedItem, MarshalError>;

    /// Decodes a wire item back into the caller-facing type.
    fn unmarshal(&self, raw: SerializedItem) -> Result<Self::Item, MarshalError>;
}
