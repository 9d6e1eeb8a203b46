//! Transport collaborator traits.
//!
//! The SDK does not implement RPC framing, TLS, or service discovery;
//! it drives a transport supplied by the caller through these seams. A
//! production implementation wraps an HTTP/2 channel; the unit tests use
//! scripted in-memory fakes.

use corundum_wire::{
    DeleteRequest, DeleteResponse, GetRequest, GetResponse, ListRequest, ListResponseMessage,
    PutRequest, PutResponse, SyncListRequest, SyncResponseMessage, TransactionRequest,
    TransactionResponse,
};

use crate::error::ClientResult;

/// One half-duplex-per-direction, ordered, reliable message stream.
///
/// The transport must deliver messages in send order and report end of
/// stream as `Ok(None)` from [`receive`](Self::receive). `send` with
/// `end_of_stream = true` half-closes the send side; no further sends are
/// valid after it.
pub trait DuplexStream<Req, Resp> {
    /// Sends one message, optionally half-closing the send side.
    fn send(
        &mut self,
        message: Req,
        end_of_stream: bool,
    ) -> impl Future<Output = ClientResult<()>> + Send;

    /// Receives the next message, or `None` at end of stream.
    fn receive(&mut self) -> impl Future<Output = ClientResult<Option<Resp>>> + Send;

    /// Gracefully closes the stream after a completed exchange.
    fn close(&mut self) -> impl Future<Output = ClientResult<()>> + Send;

    /// Tears the stream down immediately, telling the server to stop.
    ///
    /// Synchronous and infallible so it can run from `Drop` when a caller
    /// stops consuming a stream early. Calling it more than once, or
    /// after `close`, is a no-op.
    fn abort(&mut self);
}

/// Factory for the per-RPC streams and one-shot calls of the store
/// service.
///
/// Every method takes the bearer token for the call; the client facade
/// fetches it from the shared token cache immediately beforehand.
pub trait Connection {
    /// Stream type for the transaction RPC.
    type TxnStream: DuplexStream<TransactionRequest, TransactionResponse> + Send;
    /// Stream type for the begin/continue list RPCs.
    type ListStream: DuplexStream<ListRequest, ListResponseMessage> + Send;
    /// Stream type for the sync RPC.
    type SyncStream: DuplexStream<SyncListRequest, SyncResponseMessage> + Send;

    /// Opens a transaction stream. Nothing is sent until the session
    /// sends its begin command.
    fn transaction_stream(
        &self,
        token: &str,
    ) -> impl Future<Output = ClientResult<Self::TxnStream>> + Send;

    /// Opens a list stream. The caller sends the initial
    /// [`ListRequest`] itself.
    fn list_stream(&self, token: &str)
    -> impl Future<Output = ClientResult<Self::ListStream>> + Send;

    /// Opens a sync stream. The caller sends the initial
    /// [`SyncListRequest`] itself.
    fn sync_stream(&self, token: &str)
    -> impl Future<Output = ClientResult<Self::SyncStream>> + Send;

    /// One-shot get.
    fn get(
        &self,
        token: &str,
        request: GetRequest,
    ) -> impl Future<Output = ClientResult<GetResponse>> + Send;

    /// One-shot put.
    fn put(
        &self,
        token: &str,
        request: PutRequest,
    ) -> impl Future<Output = ClientResult<PutResponse>> + Send;

    /// One-shot delete.
    fn delete(
        &self,
        token: &str,
        request: DeleteRequest,
    ) -> impl Future<Output = ClientResult<DeleteResponse>> + Send;
}
