//! One-shot (non-transactional) request/response messages.

use corundum_types::{SerializedItem, StoreId};
use serde::{Deserialize, Serialize};

/// Reads the items at the given full key paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    /// The store to read from.
    pub store_id: StoreId,
    /// Full key path of each item to load.
    pub key_paths: Vec<String>,
    /// Whether the server may serve the read from a stale replica.
    pub allow_stale: bool,
}

/// Answer to a [`GetRequest`]: the items that exist, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GetResponse {
    /// The items found.
    pub items: Vec<SerializedItem>,
}

/// Writes the given items, replacing any that already exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    /// The store to write to.
    pub store_id: StoreId,
    /// The items to write, in caller order.
    pub items: Vec<SerializedItem>,
}

/// Answer to a [`PutRequest`]: the written items with server-generated
/// fields filled in, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PutResponse {
    /// The items as stored.
    pub items: Vec<SerializedItem>,
}

/// Removes the items at the given full key paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// The store to delete from.
    pub store_id: StoreId,
    /// Full key path of each item to delete.
    pub key_paths: Vec<String>,
}

/// Answer to a [`DeleteRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeleteResponse {}
