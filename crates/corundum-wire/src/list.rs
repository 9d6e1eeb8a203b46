//! Paginated list messages.

use bytes::Bytes;
use corundum_types::{SerializedItem, StoreId};
use serde::{Deserialize, Serialize};

/// Result ordering for a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortDirection {
    /// Ascending key order.
    #[default]
    Ascending,
    /// Descending key order.
    Descending,
}

/// The opaque continuation handle returned by every list/sync exchange.
///
/// Produced only by the terminal `finished` message. The client never
/// inspects `token_data`; it must be fed back byte for byte into the next
/// continue or sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListToken {
    /// Opaque server-side continuation state.
    pub token_data: Bytes,
    /// Whether another continue call can expand the result set further.
    pub can_continue: bool,
    /// The ordering of the original list this token descends from.
    pub direction: SortDirection,
}

/// Starts a standalone (non-transactional) list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginListRequest {
    /// The store to list from.
    pub store_id: StoreId,
    /// The key path prefix to query.
    pub key_path_prefix: String,
    /// Maximum number of items to return; 0 means no limit.
    pub limit: u32,
    /// Result ordering.
    pub sort_direction: SortDirection,
    /// Whether the server may serve the read from a stale replica.
    pub allow_stale: bool,
}

/// Fetches the next page of a previous standalone list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueListRequest {
    /// Token data from the previous `finished` message.
    pub token_data: Bytes,
}

/// The initial message of a standalone list stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListRequest {
    /// Start a new list.
    Begin(BeginListRequest),
    /// Continue a previous list.
    Continue(ContinueListRequest),
}

/// One inbound message on a standalone list stream.
///
/// `response` is `None` when the server populated no variant; the client
/// treats that as a protocol error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponseMessage {
    /// The populated variant, if any.
    pub response: Option<ListResponse>,
}

/// A page of a list exchange, shared by standalone and in-transaction
/// lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListResponse {
    /// Zero or more items to yield.
    Result(ListPartialResult),
    /// Terminal: the exchange is complete and this token continues it.
    Finished(ListFinished),
}

/// The items of one list page, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ListPartialResult {
    /// The page's items.
    pub items: Vec<SerializedItem>,
}

/// Terminal message of a list or sync exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFinished {
    /// The continuation token for subsequent continue/sync calls.
    pub token: ListToken,
}
