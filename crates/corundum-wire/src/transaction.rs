//! Transaction stream messages.

use bytes::Bytes;
use corundum_types::{MessageId, SerializedItem, StoreId};
use serde::{Deserialize, Serialize};

use crate::list::{ListResponse, SortDirection};

/// A single request on a transaction stream.
///
/// Exactly one command is populated per message; the `message_id` pairs the
/// request with its response(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Strictly increasing per session, starting at 1 for begin.
    pub message_id: MessageId,
    /// The command to execute.
    pub command: Command,
}

/// The commands accepted within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Opens the transaction. Sent exactly once, as message 1. No response
    /// is produced for begin itself.
    Begin {
        /// The store the transaction operates on.
        store_id: StoreId,
    },

    /// Reads the items at the given full key paths.
    Get {
        /// Full key path of each item to load.
        key_paths: Vec<String>,
    },

    /// Starts a paginated list of items under a key path prefix.
    BeginList {
        /// The key path prefix to query.
        key_path_prefix: String,
        /// Maximum number of items to return; 0 means no limit.
        limit: u32,
        /// Result ordering.
        sort_direction: SortDirection,
    },

    /// Fetches the next page of a previous list, by its opaque token.
    ContinueList {
        /// Token data from the previous list's `finished` message,
        /// round-tripped byte for byte.
        token_data: Bytes,
    },

    /// Writes the given items. Not acknowledged as durable until commit.
    Put {
        /// The items to write, in caller order.
        items: Vec<SerializedItem>,
    },

    /// Removes the items at the given full key paths.
    Delete {
        /// Full key path of each item to delete.
        key_paths: Vec<String>,
    },

    /// Commits the transaction. Terminal: half-closes the stream.
    Commit,

    /// Aborts the transaction, discarding all changes. Terminal:
    /// half-closes the stream.
    Abort,
}

impl Command {
    /// Returns true for commands after which no further requests may be
    /// sent; the transport half-closes the send side with these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Commit | Self::Abort)
    }

    /// Wire name of the command, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Begin { .. } => "begin",
            Self::Get { .. } => "get",
            Self::BeginList { .. } => "begin_list",
            Self::ContinueList { .. } => "continue_list",
            Self::Put { .. } => "put",
            Self::Delete { .. } => "delete",
            Self::Commit => "commit",
            Self::Abort => "abort",
        }
    }
}

/// A single response on a transaction stream.
///
/// `result` is `None` when the server populated no variant; the client
/// treats that as a protocol error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    /// The ID of the request this answers. List pages repeat the same ID
    /// until their terminal `finished` variant.
    pub message_id: MessageId,
    /// The populated result variant, if any.
    pub result: Option<ResponseBody>,
}

/// The result variants a transaction response can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// Answer to a get: the items that exist, in request order.
    GetResults {
        /// The items found.
        items: Vec<SerializedItem>,
    },

    /// Answer to a put: one entry per input item, in input order.
    PutAck {
        /// Server-generated identifier for each item, `None` when the item
        /// had no generated-ID field.
        generated_ids: Vec<Option<GeneratedId>>,
    },

    /// One page of an in-transaction list exchange.
    ListResults(ListResponse),

    /// Answer to commit or abort.
    Finished(Finished),
}

impl ResponseBody {
    /// The discriminant of this body.
    pub fn kind(&self) -> ResponseKind {
        match self {
            Self::GetResults { .. } => ResponseKind::GetResults,
            Self::PutAck { .. } => ResponseKind::PutAck,
            Self::ListResults(_) => ResponseKind::ListResults,
            Self::Finished(_) => ResponseKind::Finished,
        }
    }
}

/// Discriminant for [`ResponseBody`], used when checking that a response
/// matches the variant a request expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    GetResults,
    PutAck,
    ListResults,
    Finished,
}

impl ResponseKind {
    /// Wire name of the variant, for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::GetResults => "get_results",
            Self::PutAck => "put_ack",
            Self::ListResults => "list_results",
            Self::Finished => "finished",
        }
    }
}

/// Payload of the terminal commit/abort response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Finished {
    /// Whether the transaction committed.
    pub committed: bool,
    /// The items that were put, with server-generated fields filled in,
    /// in input order.
    pub put_results: Vec<SerializedItem>,
    /// The deletes that were applied.
    pub delete_results: Vec<DeleteResult>,
}

/// One applied delete in a [`Finished`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    /// The full key path that was deleted.
    pub key_path: String,
}

/// A server-generated item identifier in a put ack.
///
/// The `Bytes` form is a 16-byte value the client decodes as a UUID; any
/// other length is a protocol error on the client side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratedId {
    /// An unsigned integer ID.
    Uint(u64),
    /// An opaque byte ID, expected to decode as a UUID.
    Bytes(Bytes),
}
