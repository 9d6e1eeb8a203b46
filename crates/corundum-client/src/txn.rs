//! Transaction sessions.
//!
//! A [`Transaction`] wraps one transaction stream for its whole life:
//! begin, any number of reads/writes/lists, then exactly one of
//! [`commit`](Transaction::commit) or [`abort`](Transaction::abort),
//! both of which consume the session. Writes are acknowledged as durable
//! only by the commit outcome; puts and deletes issued mid-session are
//! buffered server-side.
//!
//! Dropping a session without committing tears its stream down, which
//! the server treats as an abort.

use std::sync::Arc;

use corundum_types::{ItemMarshaler, SerializedItem, StoreId};
use corundum_wire::{
    Command, GeneratedId, ListToken, SortDirection, TransactionRequest, TransactionResponse,
};
use uuid::Uuid;

use crate::correlate::Correlator;
use crate::cursor::{ListCursor, TransactionListPages};
use crate::error::{ClientError, ClientResult, ProtocolError};
use crate::transport::DuplexStream;

/// The outcome of a transaction.
///
/// After an abort (explicit or implicit), `puts` is empty and
/// `committed` is false regardless of what was issued during the
/// session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult<I> {
    /// The items that were put, with server-generated fields filled in,
    /// in the order they were issued.
    pub puts: Vec<I>,
    /// Whether the transaction committed.
    pub committed: bool,
}

impl<I> Default for TransactionResult<I> {
    fn default() -> Self {
        Self {
            puts: Vec::new(),
            committed: false,
        }
    }
}

/// A decoded server-generated item identifier from a put ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKey {
    /// An unsigned integer ID.
    Uint(u64),
    /// A UUID, decoded from the 16-byte wire form.
    Uuid(Uuid),
}

/// One transaction session over a dedicated stream.
pub struct Transaction<S, M>
where
    S: DuplexStream<TransactionRequest, TransactionResponse> + Send,
    M: ItemMarshaler,
{
    correlator: Correlator<S>,
    marshaler: Arc<M>,
}

impl<S, M> Transaction<S, M>
where
    S: DuplexStream<TransactionRequest, TransactionResponse> + Send,
    M: ItemMarshaler,
{
    /// Opens the session by sending the begin command as message 1.
    ///
    /// Begin produces no response; the first awaited response belongs to
    /// the first read issued in the session.
    pub(crate) async fn begin(
        stream: S,
        store_id: StoreId,
        marshaler: Arc<M>,
    ) -> ClientResult<Self> {
        let mut correlator = Correlator::new(stream);
        correlator.send(Command::Begin { store_id }).await?;
        Ok(Self {
            correlator,
            marshaler,
        })
    }

    /// Reads one item by its full key path.
    pub async fn get(&mut self, key_path: &str) -> ClientResult<Option<M::Item>> {
        Ok(self.get_batch(&[key_path]).await?.into_iter().next())
    }

    /// Reads one item, checking that its wire type tag matches
    /// `item_type` before decoding.
    pub async fn get_of(&mut self, item_type: &str, key_path: &str) -> ClientResult<Option<M::Item>> {
        let raws = self.get_batch_raw(&[key_path]).await?;
        let Some(raw) = raws.into_iter().next() else {
            return Ok(None);
        };
        check_item_type(item_type, &raw)?;
        Ok(Some(self.marshaler.unmarshal(raw)?))
    }

    /// Reads a batch of items by their full key paths. Missing items are
    /// absent from the result; order otherwise follows the request.
    pub async fn get_batch(&mut self, key_paths: &[&str]) -> ClientResult<Vec<M::Item>> {
        let raws = self.get_batch_raw(key_paths).await?;
        raws.into_iter()
            .map(|raw| self.marshaler.unmarshal(raw).map_err(ClientError::from))
            .collect()
    }

    async fn get_batch_raw(&mut self, key_paths: &[&str]) -> ClientResult<Vec<SerializedItem>> {
        let id = self
            .correlator
            .send(Command::Get {
                key_paths: key_paths.iter().map(|&k| k.to_owned()).collect(),
            })
            .await?;
        self.correlator.expect_get_results(id).await
    }

    /// Stages one item for writing. Returns the server-generated ID if
    /// the item has a generated-ID field.
    pub async fn put(&mut self, item: &M::Item) -> ClientResult<Option<GeneratedKey>> {
        Ok(self
            .put_batch(std::slice::from_ref(item))
            .await?
            .into_iter()
            .next()
            .flatten())
    }

    /// Stages a batch of items for writing. The result has one entry per
    /// input item, in input order.
    pub async fn put_batch(&mut self, items: &[M::Item]) -> ClientResult<Vec<Option<GeneratedKey>>> {
        let raws = items
            .iter()
            .map(|item| self.marshaler.marshal(item))
            .collect::<Result<Vec<_>, _>>()?;
        let id = self.correlator.send(Command::Put { items: raws }).await?;
        let acks = self.correlator.expect_put_ack(id).await?;
        acks.into_iter().map(decode_generated_id).collect()
    }

    /// Stages deletes for the given key paths. Deletes are not
    /// acknowledged individually; the commit outcome reports them.
    pub async fn delete(&mut self, key_paths: &[&str]) -> ClientResult<()> {
        self.correlator
            .send(Command::Delete {
                key_paths: key_paths.iter().map(|&k| k.to_owned()).collect(),
            })
            .await?;
        Ok(())
    }

    /// Starts a list over a key path prefix inside the transaction.
    ///
    /// The returned cursor borrows the session; it must be exhausted or
    /// dropped before the next command. Dropping it mid-exchange tears
    /// down the whole session.
    pub async fn begin_list(
        &mut self,
        key_path_prefix: &str,
        limit: u32,
        sort_direction: SortDirection,
    ) -> ClientResult<ListCursor<TransactionListPages<'_, S>, M>> {
        let marshaler = Arc::clone(&self.marshaler);
        let id = self
            .correlator
            .send(Command::BeginList {
                key_path_prefix: key_path_prefix.to_owned(),
                limit,
                sort_direction,
            })
            .await?;
        Ok(ListCursor::new(
            TransactionListPages::new(&mut self.correlator, id),
            marshaler,
        ))
    }

    /// Continues a previous list inside the transaction, from its token.
    pub async fn continue_list(
        &mut self,
        token: &ListToken,
    ) -> ClientResult<ListCursor<TransactionListPages<'_, S>, M>> {
        let marshaler = Arc::clone(&self.marshaler);
        let id = self
            .correlator
            .send(Command::ContinueList {
                token_data: token.token_data.clone(),
            })
            .await?;
        Ok(ListCursor::new(
            TransactionListPages::new(&mut self.correlator, id),
            marshaler,
        ))
    }

    /// Commits the transaction and returns its outcome, including the
    /// put items with server-generated fields filled in.
    pub async fn commit(mut self) -> ClientResult<TransactionResult<M::Item>> {
        let id = self.correlator.send(Command::Commit).await?;
        let finished = self.correlator.expect_finished(id).await?;
        self.correlator.close().await?;
        tracing::debug!(committed = finished.committed, "transaction finished");
        let puts = finished
            .put_results
            .into_iter()
            .map(|raw| self.marshaler.unmarshal(raw).map_err(ClientError::from))
            .collect::<ClientResult<Vec<_>>>()?;
        Ok(TransactionResult {
            puts,
            committed: finished.committed,
        })
    }

    /// Aborts the transaction, discarding every staged change.
    ///
    /// Always reports an empty, uncommitted outcome; whatever the server
    /// echoes back for an abort is not item data the caller should see.
    pub async fn abort(mut self) -> ClientResult<TransactionResult<M::Item>> {
        let id = self.correlator.send(Command::Abort).await?;
        self.correlator.expect_finished(id).await?;
        self.correlator.close().await?;
        tracing::debug!("transaction aborted");
        Ok(TransactionResult::default())
    }
}

impl<S, M> Drop for Transaction<S, M>
where
    S: DuplexStream<TransactionRequest, TransactionResponse> + Send,
    M: ItemMarshaler,
{
    fn drop(&mut self) {
        // No-op after commit/abort closed the stream.
        self.correlator.abort();
    }
}

fn check_item_type(expected: &str, raw: &SerializedItem) -> ClientResult<()> {
    if raw.item_type == expected {
        Ok(())
    } else {
        Err(corundum_types::MarshalError::TypeMismatch {
            expected: expected.to_owned(),
            actual: raw.item_type.clone(),
        }
        .into())
    }
}

fn decode_generated_id(id: Option<GeneratedId>) -> ClientResult<Option<GeneratedKey>> {
    match id {
        None => Ok(None),
        Some(GeneratedId::Uint(value)) => Ok(Some(GeneratedKey::Uint(value))),
        Some(GeneratedId::Bytes(bytes)) => Uuid::from_slice(&bytes)
            .map(|uuid| Some(GeneratedKey::Uuid(uuid)))
            .map_err(|_| ProtocolError::InvalidGeneratedId { len: bytes.len() }.into()),
    }
}
