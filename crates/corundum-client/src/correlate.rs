//! Request/response correlation over the transaction stream.
//!
//! The transaction RPC is a single bidirectional stream carrying many
//! commands, only some of which the server answers. The [`Correlator`]
//! owns the stream and the monotonic message-ID counter, tags every
//! outgoing command, and checks that each awaited response answers
//! exactly the request it is matched against.
//!
//! Any protocol violation tears the stream down before the error
//! propagates: a session that has observed a malformed exchange can never
//! be used again.

use corundum_types::{MessageId, SerializedItem};
use corundum_wire::{
    Command, Finished, GeneratedId, ListResponse, ResponseBody, ResponseKind, TransactionRequest,
    TransactionResponse,
};

use crate::error::{ClientError, ClientResult, ProtocolError};
use crate::transport::DuplexStream;

/// Owns a transaction stream and correlates commands with responses.
pub struct Correlator<S> {
    stream: S,
    last_id: MessageId,
    closed: bool,
}

impl<S> Correlator<S>
where
    S: DuplexStream<TransactionRequest, TransactionResponse> + Send,
{
    /// Wraps a freshly opened stream. The first command sent carries
    /// message ID 1.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            last_id: MessageId::default(),
            closed: false,
        }
    }

    /// Sends one command, returning the message ID assigned to it.
    ///
    /// Commands that end the session (commit, abort) half-close the send
    /// side of the stream.
    pub async fn send(&mut self, command: Command) -> ClientResult<MessageId> {
        if self.closed {
            return Err(ProtocolError::StreamClosed.into());
        }
        let id = self.last_id.next();
        self.last_id = id;
        let end_of_stream = command.is_terminal();
        tracing::debug!(
            message_id = %id,
            command = command.name(),
            end_of_stream,
            "sending transaction command"
        );
        let request = TransactionRequest {
            message_id: id,
            command,
        };
        if let Err(err) = self.stream.send(request, end_of_stream).await {
            self.teardown();
            return Err(err);
        }
        Ok(id)
    }

    /// Awaits the response to `expected` and returns its body.
    ///
    /// Fails, tearing down the stream, if the stream ends early, the
    /// response answers a different message, or no variant is populated.
    async fn expect_body(&mut self, expected: MessageId) -> ClientResult<ResponseBody> {
        if self.closed {
            return Err(ProtocolError::StreamClosed.into());
        }
        let received = match self.stream.receive().await {
            Ok(received) => received,
            Err(err) => {
                self.teardown();
                return Err(err);
            }
        };
        let Some(response) = received else {
            return Err(self.fail(ProtocolError::UnexpectedEnd));
        };
        if response.message_id != expected {
            return Err(self.fail(ProtocolError::MessageIdMismatch {
                expected,
                got: response.message_id,
            }));
        }
        let Some(body) = response.result else {
            return Err(self.fail(ProtocolError::EmptyResponse));
        };
        Ok(body)
    }

    /// Awaits the get results answering `id`.
    pub async fn expect_get_results(&mut self, id: MessageId) -> ClientResult<Vec<SerializedItem>> {
        match self.expect_body(id).await? {
            ResponseBody::GetResults { items } => Ok(items),
            other => Err(self.wrong_variant(ResponseKind::GetResults, &other)),
        }
    }

    /// Awaits the put acknowledgement answering `id`.
    pub async fn expect_put_ack(
        &mut self,
        id: MessageId,
    ) -> ClientResult<Vec<Option<GeneratedId>>> {
        match self.expect_body(id).await? {
            ResponseBody::PutAck { generated_ids } => Ok(generated_ids),
            other => Err(self.wrong_variant(ResponseKind::PutAck, &other)),
        }
    }

    /// Awaits one list page answering `id`. A single list command is
    /// answered by many of these, ending with one that carries
    /// `finished`.
    pub async fn expect_list_results(&mut self, id: MessageId) -> ClientResult<ListResponse> {
        match self.expect_body(id).await? {
            ResponseBody::ListResults(response) => Ok(response),
            other => Err(self.wrong_variant(ResponseKind::ListResults, &other)),
        }
    }

    /// Awaits the session outcome answering `id`.
    pub async fn expect_finished(&mut self, id: MessageId) -> ClientResult<Finished> {
        match self.expect_body(id).await? {
            ResponseBody::Finished(finished) => Ok(finished),
            other => Err(self.wrong_variant(ResponseKind::Finished, &other)),
        }
    }

    /// Gracefully closes the stream after a completed session.
    pub async fn close(&mut self) -> ClientResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.close().await
    }

    /// Tears the stream down immediately. No-op if already closed.
    pub fn abort(&mut self) {
        self.teardown();
    }

    /// Whether the stream has been closed or torn down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn wrong_variant(&mut self, expected: ResponseKind, got: &ResponseBody) -> ClientError {
        self.fail(ProtocolError::UnexpectedVariant {
            expected: expected.name(),
            got: got.kind().name(),
        })
    }

    fn fail(&mut self, err: ProtocolError) -> ClientError {
        tracing::warn!(error = %err, "protocol violation; tearing down stream");
        self.teardown();
        err.into()
    }

    fn teardown(&mut self) {
        if !self.closed {
            self.stream.abort();
            self.closed = true;
        }
    }
}
