//! The client facade.
//!
//! One [`Client`] per store. It owns the shared pieces every operation
//! needs: the connection, the token cache, and the item marshaler, all
//! behind `Arc` so clones are cheap and share the same token state.
//! Every call fetches a token from the cache immediately before hitting
//! the transport; the cache makes that free while the token is valid.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use corundum_types::{ItemMarshaler, SerializedItem, StoreId};
use corundum_wire::{
    BeginListRequest, ContinueListRequest, DeleteRequest, GetRequest, ListRequest, ListToken,
    PutRequest, SortDirection, SyncListRequest,
};

use crate::auth::{TokenCache, TokenFetcher, DEFAULT_RETRY_BASE};
use crate::cursor::{ListCursor, StreamListPages, SyncCursor};
use crate::error::{ClientError, ClientResult};
use crate::transport::{Connection, DuplexStream};
use crate::txn::{Transaction, TransactionResult};

/// Tunables for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whether non-transactional reads may be served from a stale
    /// replica. Transactional reads are always strongly consistent.
    pub allow_stale: bool,
    /// Base delay for the token-fetch retry backoff.
    pub token_retry_base: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            allow_stale: false,
            token_retry_base: DEFAULT_RETRY_BASE,
        }
    }
}

/// A handle to one store.
///
/// Cheap to clone; clones share the connection and token cache.
pub struct Client<C, F, M> {
    connection: Arc<C>,
    tokens: TokenCache<F>,
    marshaler: Arc<M>,
    store_id: StoreId,
    allow_stale: bool,
}

impl<C, F, M> Clone for Client<C, F, M> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            tokens: self.tokens.clone(),
            marshaler: Arc::clone(&self.marshaler),
            store_id: self.store_id,
            allow_stale: self.allow_stale,
        }
    }
}

impl<C, F, M> Client<C, F, M>
where
    C: Connection,
    F: TokenFetcher,
    M: ItemMarshaler,
{
    /// Creates a client with default configuration.
    pub fn new(store_id: StoreId, connection: C, fetcher: F, marshaler: M) -> Self {
        Self::with_config(store_id, connection, fetcher, marshaler, ClientConfig::default())
    }

    /// Creates a client with explicit configuration.
    pub fn with_config(
        store_id: StoreId,
        connection: C,
        fetcher: F,
        marshaler: M,
        config: ClientConfig,
    ) -> Self {
        Self {
            connection: Arc::new(connection),
            tokens: TokenCache::with_retry_base(fetcher, config.token_retry_base),
            marshaler: Arc::new(marshaler),
            store_id,
            allow_stale: config.allow_stale,
        }
    }

    /// Returns a clone of this client with a different staleness
    /// setting, sharing the connection and token cache.
    pub fn with_allow_stale(&self, allow_stale: bool) -> Self {
        let mut client = self.clone();
        client.allow_stale = allow_stale;
        client
    }

    /// The store this client operates on.
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    /// Reads one item by its full key path.
    pub async fn get(&self, key_path: &str) -> ClientResult<Option<M::Item>> {
        Ok(self.get_batch(&[key_path]).await?.into_iter().next())
    }

    /// Reads one item, checking that its wire type tag matches
    /// `item_type` before decoding.
    pub async fn get_of(&self, item_type: &str, key_path: &str) -> ClientResult<Option<M::Item>> {
        let raws = self.get_batch_raw(&[key_path]).await?;
        let Some(raw) = raws.into_iter().next() else {
            return Ok(None);
        };
        if raw.item_type != item_type {
            return Err(corundum_types::MarshalError::TypeMismatch {
                expected: item_type.to_owned(),
                actual: raw.item_type,
            }
            .into());
        }
        Ok(Some(self.marshaler.unmarshal(raw)?))
    }

    /// Reads a batch of items by their full key paths. Missing items are
    /// absent from the result.
    pub async fn get_batch(&self, key_paths: &[&str]) -> ClientResult<Vec<M::Item>> {
        let raws = self.get_batch_raw(key_paths).await?;
        raws.into_iter()
            .map(|raw| self.marshaler.unmarshal(raw).map_err(ClientError::from))
            .collect()
    }

    async fn get_batch_raw(&self, key_paths: &[&str]) -> ClientResult<Vec<SerializedItem>> {
        let token = self.tokens.get_token().await?;
        let response = self
            .connection
            .get(
                &token,
                GetRequest {
                    store_id: self.store_id,
                    key_paths: key_paths.iter().map(|&k| k.to_owned()).collect(),
                    allow_stale: self.allow_stale,
                },
            )
            .await?;
        Ok(response.items)
    }

    /// Writes one item in its own transaction, returning the written
    /// item with server-generated fields filled in.
    pub async fn put(&self, item: &M::Item) -> ClientResult<M::Item> {
        self.put_batch(std::slice::from_ref(item))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Internal("put response carried no item".into()))
    }

    /// Writes a batch of items atomically, returning them with
    /// server-generated fields filled in, in input order.
    pub async fn put_batch(&self, items: &[M::Item]) -> ClientResult<Vec<M::Item>> {
        let raws = items
            .iter()
            .map(|item| self.marshaler.marshal(item))
            .collect::<Result<Vec<_>, _>>()?;
        let token = self.tokens.get_token().await?;
        let response = self
            .connection
            .put(
                &token,
                PutRequest {
                    store_id: self.store_id,
                    items: raws,
                },
            )
            .await?;
        response
            .items
            .into_iter()
            .map(|raw| self.marshaler.unmarshal(raw).map_err(ClientError::from))
            .collect()
    }

    /// Deletes the items at the given full key paths atomically.
    pub async fn delete(&self, key_paths: &[&str]) -> ClientResult<()> {
        let token = self.tokens.get_token().await?;
        self.connection
            .delete(
                &token,
                DeleteRequest {
                    store_id: self.store_id,
                    key_paths: key_paths.iter().map(|&k| k.to_owned()).collect(),
                },
            )
            .await?;
        Ok(())
    }

    /// Starts a paginated list over a key path prefix.
    pub async fn begin_list(
        &self,
        key_path_prefix: &str,
        limit: u32,
        sort_direction: SortDirection,
    ) -> ClientResult<ListCursor<StreamListPages<C::ListStream>, M>> {
        let token = self.tokens.get_token().await?;
        let mut stream = self.connection.list_stream(&token).await?;
        stream
            .send(
                ListRequest::Begin(BeginListRequest {
                    store_id: self.store_id,
                    key_path_prefix: key_path_prefix.to_owned(),
                    limit,
                    sort_direction,
                    allow_stale: self.allow_stale,
                }),
                false,
            )
            .await?;
        Ok(ListCursor::new(
            StreamListPages::new(stream),
            Arc::clone(&self.marshaler),
        ))
    }

    /// Continues a previous list from its token. The token's bytes are
    /// sent back exactly as received.
    pub async fn continue_list(
        &self,
        token: &ListToken,
    ) -> ClientResult<ListCursor<StreamListPages<C::ListStream>, M>> {
        let auth = self.tokens.get_token().await?;
        let mut stream = self.connection.list_stream(&auth).await?;
        stream
            .send(
                ListRequest::Continue(ContinueListRequest {
                    token_data: token.token_data.clone(),
                }),
                false,
            )
            .await?;
        Ok(ListCursor::new(
            StreamListPages::new(stream),
            Arc::clone(&self.marshaler),
        ))
    }

    /// Replays every change within the window of a previous list, from
    /// its token.
    pub async fn sync_list(&self, token: &ListToken) -> ClientResult<SyncCursor<C::SyncStream, M>> {
        let auth = self.tokens.get_token().await?;
        let mut stream = self.connection.sync_stream(&auth).await?;
        stream
            .send(
                SyncListRequest {
                    token_data: token.token_data.clone(),
                },
                false,
            )
            .await?;
        Ok(SyncCursor::new(stream, Arc::clone(&self.marshaler)))
    }

    /// Opens a transaction session. The caller must finish it with
    /// commit or abort; dropping it discards every staged change.
    pub async fn transaction(&self) -> ClientResult<Transaction<C::TxnStream, M>> {
        let token = self.tokens.get_token().await?;
        let stream = self.connection.transaction_stream(&token).await?;
        Transaction::begin(stream, self.store_id, Arc::clone(&self.marshaler)).await
    }

    /// Runs `body` inside a transaction: commits if it returns `Ok`,
    /// aborts if it returns `Err`.
    ///
    /// Returns the transaction outcome together with the body's value.
    /// When the body fails, its error is propagated even if the abort
    /// itself also fails.
    pub async fn transact<R, B>(&self, body: B) -> ClientResult<(TransactionResult<M::Item>, R)>
    where
        B: for<'a> FnOnce(
            &'a mut Transaction<C::TxnStream, M>,
        ) -> Pin<Box<dyn Future<Output = ClientResult<R>> + 'a>>,
    {
        let mut txn = self.transaction().await?;
        match body(&mut txn).await {
            Ok(value) => {
                let result = txn.commit().await?;
                Ok((result, value))
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort().await {
                    tracing::debug!(error = %abort_err, "abort after failed transaction body also failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testutil::{
        item, raw_item, MockConnection, MockTxnStream, ScriptedFetcher, TestMarshaler,
    };
    use bytes::Bytes;
    use corundum_types::MessageId;
    use corundum_wire::{
        Finished, GetResponse, ListFinished, ListPartialResult, ListResponse, ListResponseMessage,
        PutResponse, ResponseBody, SyncPartialResult, SyncResponse, SyncResponseMessage,
        TransactionResponse,
    };

    use crate::cursor::SyncEvent;

    fn client(connection: MockConnection) -> Client<MockConnection, ScriptedFetcher, TestMarshaler> {
        Client::new(
            StoreId::new(7),
            connection,
            ScriptedFetcher::new(3600),
            TestMarshaler,
        )
    }

    #[tokio::test]
    async fn get_threads_the_cached_token_through() {
        let connection = MockConnection::default();
        connection.push_get_response(GetResponse {
            items: vec![raw_item("thing", "alpha")],
        });
        let handle = connection.clone();

        let client = client(connection);
        let got = client.get("/thing/alpha").await.unwrap().unwrap();
        assert_eq!(got.name, "alpha");

        let requests = handle.get_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key_paths, vec!["/thing/alpha".to_owned()]);
        assert!(!requests[0].allow_stale);
        assert_eq!(handle.tokens_seen(), vec!["token-1".to_owned()]);
    }

    #[tokio::test]
    async fn token_is_fetched_once_across_operations() {
        let connection = MockConnection::default();
        connection.push_get_response(GetResponse::default());
        connection.push_get_response(GetResponse::default());
        let handle = connection.clone();

        let client = client(connection);
        client.get("/a").await.unwrap();
        client.get("/b").await.unwrap();
        assert_eq!(
            handle.tokens_seen(),
            vec!["token-1".to_owned(), "token-1".to_owned()]
        );
    }

    #[tokio::test]
    async fn with_allow_stale_only_affects_the_clone() {
        let connection = MockConnection::default();
        connection.push_get_response(GetResponse::default());
        connection.push_get_response(GetResponse::default());
        let handle = connection.clone();

        let client = client(connection);
        let stale = client.with_allow_stale(true);
        stale.get("/a").await.unwrap();
        client.get("/a").await.unwrap();

        let requests = handle.get_requests();
        assert!(requests[0].allow_stale);
        assert!(!requests[1].allow_stale);
    }

    #[tokio::test]
    async fn put_round_trips_the_item() {
        let connection = MockConnection::default();
        connection.push_put_response(PutResponse {
            items: vec![raw_item("thing", "echoed")],
        });
        let handle = connection.clone();

        let client = client(connection);
        let written = client.put(&item("thing", "echoed")).await.unwrap();
        assert_eq!(written.name, "echoed");

        let requests = handle.put_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].store_id, StoreId::new(7));
        assert_eq!(requests[0].items, vec![raw_item("thing", "echoed")]);
    }

    #[tokio::test]
    async fn delete_sends_all_key_paths() {
        let connection = MockConnection::default();
        let handle = connection.clone();

        let client = client(connection);
        client.delete(&["/thing/a", "/thing/b"]).await.unwrap();

        let requests = handle.delete_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].key_paths,
            vec!["/thing/a".to_owned(), "/thing/b".to_owned()]
        );
    }

    #[tokio::test]
    async fn sync_list_sends_the_token_and_streams_events() {
        let connection = MockConnection::default();
        let sync = connection.sync_stream_handle();
        sync.push(SyncResponseMessage {
            response: Some(SyncResponse::Result(SyncPartialResult {
                changed_items: vec![raw_item("thing", "fresh")],
                ..SyncPartialResult::default()
            })),
        });
        sync.push(SyncResponseMessage {
            response: Some(SyncResponse::Finished(ListFinished {
                token: ListToken {
                    token_data: Bytes::from_static(b"next"),
                    can_continue: true,
                    direction: SortDirection::Ascending,
                },
            })),
        });

        let client = client(connection);
        let window = ListToken {
            token_data: Bytes::from_static(b"win"),
            can_continue: true,
            direction: SortDirection::Ascending,
        };
        let cursor = client.sync_list(&window).await.unwrap();
        let (events, next) = cursor.collect().await.unwrap();

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SyncEvent::Changed(item) if item.name == "fresh"));
        assert_eq!(next.token_data, Bytes::from_static(b"next"));

        let sent = sync.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.token_data, Bytes::from_static(b"win"));
    }

    #[tokio::test]
    async fn remote_error_propagates_unretried() {
        let connection = MockConnection::default();
        connection.fail_next_get(crate::error::RemoteError::new(
            ErrorCode::NotFound,
            "StoreNotFound",
            "no such store",
        ));
        let handle = connection.clone();

        let client = client(connection);
        let err = client.get("/a").await.unwrap_err();
        match err {
            ClientError::Remote(remote) => {
                assert_eq!(remote.code, ErrorCode::NotFound);
                assert_eq!(
                    remote.to_string(),
                    "(NotFound/StoreNotFound) no such store"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(handle.get_requests().len(), 1);
    }

    #[tokio::test]
    async fn begin_list_sends_the_initial_request_and_streams_items() {
        let connection = MockConnection::default();
        let list = connection.list_stream_handle();
        list.push(ListResponseMessage {
            response: Some(ListResponse::Result(ListPartialResult {
                items: vec![raw_item("thing", "a")],
            })),
        });
        list.push(ListResponseMessage {
            response: Some(ListResponse::Finished(ListFinished {
                token: ListToken {
                    token_data: Bytes::from_static(b"tok"),
                    can_continue: true,
                    direction: SortDirection::Ascending,
                },
            })),
        });

        let client = client(connection);
        let cursor = client
            .begin_list("/thing", 10, SortDirection::Ascending)
            .await
            .unwrap();
        let (items, token) = cursor.collect().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(token.token_data, Bytes::from_static(b"tok"));

        let sent = list.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].0 {
            ListRequest::Begin(begin) => {
                assert_eq!(begin.key_path_prefix, "/thing");
                assert_eq!(begin.limit, 10);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[tokio::test]
    async fn continue_list_round_trips_token_bytes() {
        let connection = MockConnection::default();
        let list = connection.list_stream_handle();
        list.push(ListResponseMessage {
            response: Some(ListResponse::Finished(ListFinished {
                token: ListToken {
                    token_data: Bytes::from_static(b"\x00\x01raw"),
                    can_continue: false,
                    direction: SortDirection::Ascending,
                },
            })),
        });

        let client = client(connection);
        let token = ListToken {
            token_data: Bytes::from_static(b"\x00\x01raw"),
            can_continue: true,
            direction: SortDirection::Ascending,
        };
        let cursor = client.continue_list(&token).await.unwrap();
        let (_, next) = cursor.collect().await.unwrap();
        assert!(!next.can_continue);

        let sent = list.sent();
        match &sent[0].0 {
            ListRequest::Continue(cont) => {
                assert_eq!(cont.token_data, Bytes::from_static(b"\x00\x01raw"));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    fn txn_response(id: u64, body: ResponseBody) -> TransactionResponse {
        TransactionResponse {
            message_id: MessageId::new(id),
            result: Some(body),
        }
    }

    #[tokio::test]
    async fn transact_commits_on_success() {
        let connection = MockConnection::default();
        let txn_stream: MockTxnStream = connection.txn_stream_handle();
        txn_stream.push(txn_response(2, ResponseBody::PutAck {
            generated_ids: vec![None],
        }));
        txn_stream.push(txn_response(
            3,
            ResponseBody::Finished(Finished {
                committed: true,
                put_results: vec![raw_item("thing", "written")],
                delete_results: vec![],
            }),
        ));

        let client = client(connection);
        let (result, value) = client
            .transact(|txn| {
                Box::pin(async move {
                    txn.put(&item("thing", "written")).await?;
                    Ok(42)
                })
            })
            .await
            .unwrap();

        assert!(result.committed);
        assert_eq!(result.puts.len(), 1);
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn transact_aborts_on_body_error_and_keeps_it() {
        let connection = MockConnection::default();
        let txn_stream = connection.txn_stream_handle();
        txn_stream.push(txn_response(
            2,
            ResponseBody::Finished(Finished::default()),
        ));

        let client = client(connection);
        let err = client
            .transact::<(), _>(|_txn| {
                Box::pin(async move { Err(ClientError::Internal("boom".into())) })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Internal(msg) if msg == "boom"));

        let sent = txn_stream.sent();
        assert!(matches!(
            sent.last().unwrap().0.command,
            corundum_wire::Command::Abort
        ));
    }
}
