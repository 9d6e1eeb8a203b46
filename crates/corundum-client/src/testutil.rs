//! Shared test fixtures: scripted fakes for the fetcher, the streams,
//! and the connection, plus a trivial marshaler.
//!
//! Every fake hands out cloneable handles onto shared state, so a test
//! can move one clone into the code under test and keep another for
//! assertions.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use corundum_types::{ItemMarshaler, MarshalError, SerializedItem};
use corundum_wire::{
    DeleteRequest, DeleteResponse, GetRequest, GetResponse, ListRequest, ListResponseMessage,
    PutRequest, PutResponse, SyncListRequest, SyncResponseMessage, TransactionRequest,
    TransactionResponse,
};

use crate::auth::{TokenFetcher, TokenGrant};
use crate::error::{ClientResult, RemoteError};
use crate::transport::{Connection, DuplexStream};

// ============================================================================
// Items and marshaling
// ============================================================================

/// A minimal item: a type tag plus a name, the name carried as the
/// payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestItem {
    pub kind: String,
    pub name: String,
}

pub(crate) fn item(kind: &str, name: &str) -> TestItem {
    TestItem {
        kind: kind.to_owned(),
        name: name.to_owned(),
    }
}

pub(crate) fn raw_item(kind: &str, name: &str) -> SerializedItem {
    SerializedItem::new(kind, Bytes::copy_from_slice(name.as_bytes()))
}

pub(crate) struct TestMarshaler;

impl ItemMarshaler for TestMarshaler {
    type Item = TestItem;

    fn marshal(&self, item: &TestItem) -> Result<SerializedItem, MarshalError> {
        Ok(raw_item(&item.kind, &item.name))
    }

    fn unmarshal(&self, raw: SerializedItem) -> Result<TestItem, MarshalError> {
        let name = String::from_utf8(raw.payload.to_vec())
            .map_err(|err| MarshalError::Codec(err.to_string()))?;
        Ok(TestItem {
            kind: raw.item_type,
            name,
        })
    }
}

// ============================================================================
// Token fetcher
// ============================================================================

/// Counts fetcher invocations; cloneable for assertions after the
/// fetcher moved into a cache.
#[derive(Clone)]
pub(crate) struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fetcher that pops scripted outcomes, then mints `token-N` grants
/// with a fixed lifetime once the script runs dry.
#[derive(Clone)]
pub(crate) struct ScriptedFetcher {
    calls: Arc<AtomicU32>,
    script: Arc<Mutex<VecDeque<Result<TokenGrant, RemoteError>>>>,
    delay: Duration,
    fallback_expiry_secs: u64,
}

impl ScriptedFetcher {
    pub fn new(fallback_expiry_secs: u64) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            script: Arc::new(Mutex::new(VecDeque::new())),
            delay: Duration::ZERO,
            fallback_expiry_secs,
        }
    }

    /// Makes every fetch suspend for `delay` first, so tests can pile
    /// concurrent callers onto one in-flight refresh.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_error(&self, err: RemoteError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> CallCounter {
        CallCounter(Arc::clone(&self.calls))
    }
}

impl TokenFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<TokenGrant, RemoteError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(TokenGrant {
            token: format!("token-{n}"),
            expires_in_secs: self.fallback_expiry_secs,
        })
    }
}

// ============================================================================
// Streams
// ============================================================================

struct StreamState<Req, Resp> {
    script: VecDeque<Resp>,
    sent: Vec<(Req, bool)>,
    aborted: bool,
    closed: bool,
}

impl<Req, Resp> Default for StreamState<Req, Resp> {
    fn default() -> Self {
        Self {
            script: VecDeque::new(),
            sent: Vec::new(),
            aborted: false,
            closed: false,
        }
    }
}

/// A scripted in-memory stream. Receives pop the script; an empty script
/// reads as end of stream.
pub(crate) struct MockStream<Req, Resp> {
    inner: Arc<Mutex<StreamState<Req, Resp>>>,
}

impl<Req, Resp> Clone for MockStream<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Req, Resp> Default for MockStream<Req, Resp> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamState::default())),
        }
    }
}

impl<Req: Clone, Resp> MockStream<Req, Resp> {
    pub fn push(&self, response: Resp) {
        self.inner.lock().unwrap().script.push_back(response);
    }

    pub fn sent(&self) -> Vec<(Req, bool)> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn aborted(&self) -> bool {
        self.inner.lock().unwrap().aborted
    }

    pub fn closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl<Req, Resp> DuplexStream<Req, Resp> for MockStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn send(&mut self, message: Req, end_of_stream: bool) -> ClientResult<()> {
        self.inner.lock().unwrap().sent.push((message, end_of_stream));
        Ok(())
    }

    async fn receive(&mut self) -> ClientResult<Option<Resp>> {
        Ok(self.inner.lock().unwrap().script.pop_front())
    }

    async fn close(&mut self) -> ClientResult<()> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.inner.lock().unwrap().aborted = true;
    }
}

pub(crate) type MockTxnStream = MockStream<TransactionRequest, TransactionResponse>;
pub(crate) type MockListStream = MockStream<ListRequest, ListResponseMessage>;
pub(crate) type MockSyncStream = MockStream<SyncListRequest, SyncResponseMessage>;

// ============================================================================
// Connection
// ============================================================================

#[derive(Default)]
struct ConnState {
    tokens_seen: Vec<String>,
    get_requests: Vec<GetRequest>,
    put_requests: Vec<PutRequest>,
    delete_requests: Vec<DeleteRequest>,
    get_responses: VecDeque<Result<GetResponse, RemoteError>>,
    put_responses: VecDeque<PutResponse>,
}

/// A scripted connection. Stream factories hand out clones of one shared
/// stream per RPC kind, so tests script and inspect them through the
/// connection handle.
#[derive(Clone, Default)]
pub(crate) struct MockConnection {
    inner: Arc<Mutex<ConnState>>,
    txn: MockTxnStream,
    list: MockListStream,
    sync: MockSyncStream,
}

impl MockConnection {
    pub fn push_get_response(&self, response: GetResponse) {
        self.inner.lock().unwrap().get_responses.push_back(Ok(response));
    }

    pub fn fail_next_get(&self, err: RemoteError) {
        self.inner.lock().unwrap().get_responses.push_back(Err(err));
    }

    pub fn push_put_response(&self, response: PutResponse) {
        self.inner.lock().unwrap().put_responses.push_back(response);
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.inner.lock().unwrap().tokens_seen.clone()
    }

    pub fn get_requests(&self) -> Vec<GetRequest> {
        self.inner.lock().unwrap().get_requests.clone()
    }

    pub fn put_requests(&self) -> Vec<PutRequest> {
        self.inner.lock().unwrap().put_requests.clone()
    }

    pub fn delete_requests(&self) -> Vec<DeleteRequest> {
        self.inner.lock().unwrap().delete_requests.clone()
    }

    pub fn txn_stream_handle(&self) -> MockTxnStream {
        self.txn.clone()
    }

    pub fn list_stream_handle(&self) -> MockListStream {
        self.list.clone()
    }

    pub fn sync_stream_handle(&self) -> MockSyncStream {
        self.sync.clone()
    }

    fn record_token(&self, token: &str) {
        self.inner.lock().unwrap().tokens_seen.push(token.to_owned());
    }
}

impl Connection for MockConnection {
    type TxnStream = MockTxnStream;
    type ListStream = MockListStream;
    type SyncStream = MockSyncStream;

    async fn transaction_stream(&self, token: &str) -> ClientResult<MockTxnStream> {
        self.record_token(token);
        Ok(self.txn.clone())
    }

    async fn list_stream(&self, token: &str) -> ClientResult<MockListStream> {
        self.record_token(token);
        Ok(self.list.clone())
    }

    async fn sync_stream(&self, token: &str) -> ClientResult<MockSyncStream> {
        self.record_token(token);
        Ok(self.sync.clone())
    }

    async fn get(&self, token: &str, request: GetRequest) -> ClientResult<GetResponse> {
        self.record_token(token);
        let mut state = self.inner.lock().unwrap();
        state.get_requests.push(request);
        match state.get_responses.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(err)) => Err(err.into()),
            None => Ok(GetResponse::default()),
        }
    }

    async fn put(&self, token: &str, request: PutRequest) -> ClientResult<PutResponse> {
        self.record_token(token);
        let mut state = self.inner.lock().unwrap();
        state.put_requests.push(request);
        Ok(state.put_responses.pop_front().unwrap_or_default())
    }

    async fn delete(&self, token: &str, request: DeleteRequest) -> ClientResult<DeleteResponse> {
        self.record_token(token);
        self.inner.lock().unwrap().delete_requests.push(request);
        Ok(DeleteResponse::default())
    }
}
