//! Lazy cursors over list and sync exchanges.
//!
//! A cursor pulls pages from the server only as the caller consumes
//! items: items already buffered are yielded without touching the
//! network, and unmarshaling happens per item at yield time. When the
//! terminal `finished` message arrives its continuation token is
//! captured on the cursor; after that, `next` keeps returning `None`.
//!
//! Dropping a cursor before exhaustion tears its stream down so the
//! server stops producing pages. In-transaction cursors share the
//! session's stream instead of owning one, so their teardown poisons the
//! whole session, matching the all-or-nothing contract of a transaction.

use std::collections::VecDeque;
use std::sync::Arc;

use corundum_types::{ItemMarshaler, MessageId, SerializedItem};
use corundum_wire::{
    ListFinished, ListRequest, ListResponse, ListResponseMessage, ListToken, SyncListRequest,
    SyncResponse, SyncResponseMessage, TransactionRequest, TransactionResponse,
};

use crate::correlate::Correlator;
use crate::error::{ClientResult, ProtocolError};
use crate::transport::DuplexStream;

/// Where a list cursor's pages come from.
///
/// Implemented by a dedicated list stream for standalone lists and by a
/// borrowed transaction session for in-transaction lists; the cursor
/// logic above is identical for both.
pub trait ListPageSource {
    /// Pulls the next page.
    fn next_page(&mut self) -> impl Future<Output = ClientResult<ListResponse>> + Send;

    /// Releases the source after the terminal page was consumed.
    fn finish(&mut self) -> impl Future<Output = ClientResult<()>> + Send;

    /// Tears the source down when the caller stops early or the exchange
    /// failed. Synchronous so it can run from `Drop`.
    fn cancel(&mut self);
}

/// Page source backed by a dedicated list stream.
pub struct StreamListPages<S> {
    stream: S,
    closed: bool,
}

impl<S> StreamListPages<S>
where
    S: DuplexStream<ListRequest, ListResponseMessage> + Send,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

impl<S> ListPageSource for StreamListPages<S>
where
    S: DuplexStream<ListRequest, ListResponseMessage> + Send,
{
    async fn next_page(&mut self) -> ClientResult<ListResponse> {
        let received = match self.stream.receive().await {
            Ok(received) => received,
            Err(err) => {
                self.cancel();
                return Err(err);
            }
        };
        let Some(message) = received else {
            // A list stream must end with `finished`, never silently.
            self.cancel();
            return Err(ProtocolError::MissingFinished.into());
        };
        let Some(response) = message.response else {
            self.cancel();
            return Err(ProtocolError::EmptyResponse.into());
        };
        Ok(response)
    }

    async fn finish(&mut self) -> ClientResult<()> {
        self.closed = true;
        self.stream.close().await
    }

    fn cancel(&mut self) {
        if !self.closed {
            self.stream.abort();
            self.closed = true;
        }
    }
}

/// Page source backed by a transaction session.
///
/// The session's correlator checks every page against the message ID of
/// the originating list command and handles stream teardown on protocol
/// violations.
pub struct TransactionListPages<'a, S> {
    correlator: &'a mut Correlator<S>,
    message_id: MessageId,
}

impl<'a, S> TransactionListPages<'a, S>
where
    S: DuplexStream<TransactionRequest, TransactionResponse> + Send,
{
    pub(crate) fn new(correlator: &'a mut Correlator<S>, message_id: MessageId) -> Self {
        Self {
            correlator,
            message_id,
        }
    }
}

impl<S> ListPageSource for TransactionListPages<'_, S>
where
    S: DuplexStream<TransactionRequest, TransactionResponse> + Send,
{
    async fn next_page(&mut self) -> ClientResult<ListResponse> {
        self.correlator.expect_list_results(self.message_id).await
    }

    async fn finish(&mut self) -> ClientResult<()> {
        // The session stays open for further commands.
        Ok(())
    }

    fn cancel(&mut self) {
        self.correlator.abort();
    }
}

/// A lazy cursor over one list exchange.
///
/// Pages are pulled on demand and items unmarshaled one at a time as
/// [`next`](Self::next) yields them. After exhaustion,
/// [`token`](Self::token) returns the continuation token from the
/// terminal `finished` message.
pub struct ListCursor<P: ListPageSource, M: ItemMarshaler> {
    source: P,
    marshaler: Arc<M>,
    buffer: VecDeque<SerializedItem>,
    token: Option<ListToken>,
    done: bool,
}

impl<P: ListPageSource, M: ItemMarshaler> ListCursor<P, M> {
    pub(crate) fn new(source: P, marshaler: Arc<M>) -> Self {
        Self {
            source,
            marshaler,
            buffer: VecDeque::new(),
            token: None,
            done: false,
        }
    }

    /// Yields the next item, or `None` once the exchange has finished.
    ///
    /// Any error is terminal for the cursor.
    pub async fn next(&mut self) -> ClientResult<Option<M::Item>> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                match self.marshaler.unmarshal(raw) {
                    Ok(item) => return Ok(Some(item)),
                    Err(err) => {
                        self.done = true;
                        self.source.cancel();
                        return Err(err.into());
                    }
                }
            }
            if self.done {
                return Ok(None);
            }
            match self.source.next_page().await {
                Ok(ListResponse::Result(page)) => self.buffer.extend(page.items),
                Ok(ListResponse::Finished(ListFinished { token })) => {
                    self.token = Some(token);
                    self.done = true;
                    self.source.finish().await?;
                }
                Err(err) => {
                    // The source tore itself down already.
                    self.done = true;
                    return Err(err);
                }
            }
        }
    }

    /// Drains the cursor, returning all items and the continuation token.
    pub async fn collect(mut self) -> ClientResult<(Vec<M::Item>, ListToken)> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        let token = self
            .token
            .take()
            .ok_or_else(|| crate::error::ClientError::Internal("list finished without a token".into()))?;
        Ok((items, token))
    }

    /// The continuation token, available once the exchange has finished.
    pub fn token(&self) -> Option<&ListToken> {
        self.token.as_ref()
    }
}

impl<P: ListPageSource, M: ItemMarshaler> Drop for ListCursor<P, M> {
    fn drop(&mut self) {
        if !self.done {
            self.source.cancel();
        }
    }
}

/// One change event yielded by a [`SyncCursor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent<I> {
    /// Previously fetched results for this window are obsolete; discard
    /// them and rebuild from the events that follow.
    Reset,
    /// An item changed or was created within the window.
    Changed(I),
    /// The item at this key path was deleted.
    Deleted(String),
    /// The item at this key path was updated but now sorts outside the
    /// window; drop it from the local result set.
    OutsideWindow(String),
}

/// Buffered precursor of a [`SyncEvent`]; `Changed` payloads stay raw
/// until yielded.
enum RawSyncEvent {
    Reset,
    Changed(SerializedItem),
    Deleted(String),
    OutsideWindow(String),
}

/// A lazy cursor over one sync exchange.
///
/// Within each page, events are yielded grouped: changed items first,
/// then deletions, then keys that moved outside the window.
pub struct SyncCursor<S: DuplexStream<SyncListRequest, SyncResponseMessage>, M: ItemMarshaler> {
    stream: S,
    marshaler: Arc<M>,
    buffer: VecDeque<RawSyncEvent>,
    token: Option<ListToken>,
    done: bool,
    closed: bool,
}

impl<S, M> SyncCursor<S, M>
where
    S: DuplexStream<SyncListRequest, SyncResponseMessage> + Send,
    M: ItemMarshaler,
{
    pub(crate) fn new(stream: S, marshaler: Arc<M>) -> Self {
        Self {
            stream,
            marshaler,
            buffer: VecDeque::new(),
            token: None,
            done: false,
            closed: false,
        }
    }

    /// Yields the next change event, or `None` once the sync has
    /// finished. Any error is terminal for the cursor.
    pub async fn next(&mut self) -> ClientResult<Option<SyncEvent<M::Item>>> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                let event = match raw {
                    RawSyncEvent::Reset => SyncEvent::Reset,
                    RawSyncEvent::Changed(item) => match self.marshaler.unmarshal(item) {
                        Ok(item) => SyncEvent::Changed(item),
                        Err(err) => {
                            self.done = true;
                            self.cancel();
                            return Err(err.into());
                        }
                    },
                    RawSyncEvent::Deleted(key_path) => SyncEvent::Deleted(key_path),
                    RawSyncEvent::OutsideWindow(key_path) => SyncEvent::OutsideWindow(key_path),
                };
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }
            let received = match self.stream.receive().await {
                Ok(received) => received,
                Err(err) => {
                    self.done = true;
                    self.cancel();
                    return Err(err);
                }
            };
            let Some(message) = received else {
                self.done = true;
                self.cancel();
                return Err(ProtocolError::MissingFinished.into());
            };
            let Some(response) = message.response else {
                self.done = true;
                self.cancel();
                return Err(ProtocolError::EmptyResponse.into());
            };
            match response {
                SyncResponse::Reset => self.buffer.push_back(RawSyncEvent::Reset),
                SyncResponse::Result(page) => {
                    self.buffer
                        .extend(page.changed_items.into_iter().map(RawSyncEvent::Changed));
                    self.buffer.extend(
                        page.deleted_items
                            .into_iter()
                            .map(|d| RawSyncEvent::Deleted(d.key_path)),
                    );
                    self.buffer.extend(
                        page.updated_keys_outside_window
                            .into_iter()
                            .map(RawSyncEvent::OutsideWindow),
                    );
                }
                SyncResponse::Finished(ListFinished { token }) => {
                    self.token = Some(token);
                    self.done = true;
                    self.closed = true;
                    self.stream.close().await?;
                }
            }
        }
    }

    /// Drains the cursor, returning all events and the continuation
    /// token.
    pub async fn collect(mut self) -> ClientResult<(Vec<SyncEvent<M::Item>>, ListToken)> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await? {
            events.push(event);
        }
        let token = self
            .token
            .take()
            .ok_or_else(|| crate::error::ClientError::Internal("sync finished without a token".into()))?;
        Ok((events, token))
    }

    /// The continuation token, available once the sync has finished.
    pub fn token(&self) -> Option<&ListToken> {
        self.token.as_ref()
    }

    fn cancel(&mut self) {
        if !self.closed {
            self.stream.abort();
            self.closed = true;
        }
    }
}

impl<S: DuplexStream<SyncListRequest, SyncResponseMessage>, M: ItemMarshaler> Drop
    for SyncCursor<S, M>
{
    fn drop(&mut self) {
        if !self.done && !self.closed {
            self.stream.abort();
            self.closed = true;
        }
    }
}
