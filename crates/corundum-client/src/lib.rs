//! # corundum-client: Client SDK for `Corundum`
//!
//! This crate provides an async client for a `Corundum` store: one-shot
//! reads and writes, paginated lists with continuation tokens, sync
//! (catch-up) over a previous list's window, and interactive
//! transactions over a bidirectional stream, all defined in terms of the
//! messages in `corundum-wire`.
//!
//! The client is generic over three collaborators supplied by the
//! caller: a [`Connection`] (the RPC transport), a [`TokenFetcher`] (the
//! credential exchange), and an [`ItemMarshaler`] (the generated schema
//! codec).
//!
//! ## Usage
//!
//! ```ignore
//! use corundum_client::{Client, ClientConfig};
//! use corundum_types::StoreId;
//!
//! let client = Client::new(StoreId::new(1), connection, fetcher, marshaler);
//!
//! // One-shot reads and writes
//! let order = client.get("/order-123").await?;
//! let written = client.put(&order).await?;
//!
//! // Paginated list, consumed lazily
//! let mut cursor = client.begin_list("/order", 100, Default::default()).await?;
//! while let Some(item) = cursor.next().await? {
//!     // ...
//! }
//! let token = cursor.token().cloned();
//!
//! // Interactive transaction
//! let mut txn = client.transaction().await?;
//! let item = txn.get("/order-123").await?;
//! txn.put(&updated).await?;
//! let outcome = txn.commit().await?;
//! assert!(outcome.committed);
//! ```

mod auth;
mod backoff;
mod client;
mod correlate;
mod cursor;
mod error;
mod transport;
mod txn;

#[cfg(test)]
mod testutil;

pub use auth::{TokenCache, TokenFetcher, TokenGrant, DEFAULT_RETRY_BASE, RETRY_ATTEMPTS};
pub use backoff::{full_jitter, refresh_delay};
pub use client::{Client, ClientConfig};
pub use correlate::Correlator;
pub use cursor::{ListCursor, ListPageSource, StreamListPages, SyncCursor, SyncEvent, TransactionListPages};
pub use error::{ClientError, ClientResult, ErrorCode, ProtocolError, RemoteError};
pub use transport::{Connection, DuplexStream};
pub use txn::{GeneratedKey, Transaction, TransactionResult};

// Re-export the wire and core types callers interact with directly.
pub use corundum_types::{ItemMarshaler, MarshalError, MessageId, SerializedItem, StoreId};
pub use corundum_wire::{ListToken, SortDirection};
