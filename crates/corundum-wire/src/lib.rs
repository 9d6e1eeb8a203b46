//! # corundum-wire: Protocol messages for the Corundum client
//!
//! This crate defines the message vocabulary exchanged with a Corundum
//! server, grouped by exchange:
//!
//! ## Transactions
//! - [`TransactionRequest`] / [`Command`] - Client → Server: one command per message
//! - [`TransactionResponse`] / [`ResponseBody`] - Server → Client: one result per message
//!
//! ## Lists
//! - [`ListRequest`] - Client → Server: start or continue a paginated list
//! - [`ListResponseMessage`] / [`ListResponse`] - Server → Client: item pages,
//!   then a terminal `finished` carrying the [`ListToken`]
//!
//! ## Sync
//! - [`SyncListRequest`] - Client → Server: catch up on a previous list window
//! - [`SyncResponseMessage`] / [`SyncResponse`] - Server → Client: reset /
//!   change pages, then a terminal `finished`
//!
//! ## One-shot calls
//! - [`GetRequest`] / [`GetResponse`], [`PutRequest`] / [`PutResponse`],
//!   [`DeleteRequest`] / [`DeleteResponse`]
//!
//! Tagged unions are explicit enums: exactly one variant per message. The
//! wire reality that a oneof can arrive with nothing populated is modeled
//! as an `Option` on the envelope (`TransactionResponse::result`,
//! `ListResponseMessage::response`, `SyncResponseMessage::response`); the
//! client rejects the `None` case as a protocol error rather than ever
//! defaulting.

mod list;
mod sync;
mod transaction;
mod unary;

pub use list::{
    BeginListRequest, ContinueListRequest, ListFinished, ListPartialResult, ListRequest,
    ListResponse, ListResponseMessage, ListToken, SortDirection,
};
pub use sync::{
    DeletedItem, SyncListRequest, SyncPartialResult, SyncResponse, SyncResponseMessage,
};
pub use transaction::{
    Command, DeleteResult, Finished, GeneratedId, ResponseBody, ResponseKind, TransactionRequest,
    TransactionResponse,
};
pub use unary::{DeleteRequest, DeleteResponse, GetRequest, GetResponse, PutRequest, PutResponse};
