//! Sync (catch-up) messages.
//!
//! A sync exchange replays every change within the window of a previous
//! list: changed items arrive whole, deletions and updates that fell out
//! of the window arrive as key paths. A `reset` tells the client to
//! discard everything it accumulated from earlier list/sync calls for
//! this window.

use bytes::Bytes;
use corundum_types::SerializedItem;
use serde::{Deserialize, Serialize};

use crate::list::ListFinished;

/// Starts a sync over the window of a previous list, by its opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncListRequest {
    /// Token data from the previous list/sync `finished` message.
    pub token_data: Bytes,
}

/// One inbound message on a sync stream.
///
/// `response` is `None` when the server populated no variant; the client
/// treats that as a protocol error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponseMessage {
    /// The populated variant, if any.
    pub response: Option<SyncResponse>,
}

/// A page of a sync exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncResponse {
    /// Previously fetched results for this window are obsolete; the items
    /// from this sync form the new result set. Sent at the server's
    /// discretion, e.g. when the token is too old.
    Reset,
    /// A batch of changes within the window.
    Result(SyncPartialResult),
    /// Terminal: the sync is complete and this token continues it.
    Finished(ListFinished),
}

/// The changes of one sync page.
///
/// Within a page the client flushes groups in declaration order: changed,
/// then deleted, then keys that moved outside the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncPartialResult {
    /// Items changed or newly created within the window.
    pub changed_items: Vec<SerializedItem>,
    /// Items deleted from the window.
    pub deleted_items: Vec<DeletedItem>,
    /// Keys of items that were updated but now sort outside the window.
    /// Not deleted, but should be dropped from the local result set.
    pub updated_keys_outside_window: Vec<String>,
}

/// One deletion in a sync page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedItem {
    /// The full key path that was deleted.
    pub key_path: String,
}
