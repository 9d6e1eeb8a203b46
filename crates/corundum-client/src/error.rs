//! Client error types.
//!
//! Three families, per the protocol contract:
//! - [`RemoteError`]: a classified failure returned by the service,
//!   surfaced verbatim. Retried only inside the token-fetch loop, and
//!   only for retryable codes.
//! - [`ProtocolError`]: local detection of a malformed or out-of-sequence
//!   exchange. Always fatal to the owning session/stream; the stream is
//!   closed before the error propagates.
//! - [`ClientError::RetriesExhausted`]: the token-fetch retry budget was
//!   used up; wraps the last underlying remote error.
//!
//! Every variant is `Clone`: a single failed token refresh fans its error
//! out to all callers joined on the in-flight refresh.

use corundum_types::{MarshalError, MessageId};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Stable transport-level error codes returned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl ErrorCode {
    /// Maps a numeric wire code to a known code; anything unrecognized
    /// decays to [`ErrorCode::Unknown`].
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => Self::Canceled,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    /// Whether the token-fetch loop may retry after this code.
    ///
    /// The non-retryable set is fixed: failures of authentication,
    /// authorization, addressing, or the request itself will not resolve
    /// by retrying.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            Self::Unauthenticated
                | Self::PermissionDenied
                | Self::NotFound
                | Self::Unimplemented
                | Self::InvalidArgument
        )
    }

    /// PascalCase name, matching the service's error formatter.
    pub fn name(self) -> &'static str {
        match self {
            Self::Canceled => "Canceled",
            Self::Unknown => "Unknown",
            Self::InvalidArgument => "InvalidArgument",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::ResourceExhausted => "ResourceExhausted",
            Self::FailedPrecondition => "FailedPrecondition",
            Self::Aborted => "Aborted",
            Self::OutOfRange => "OutOfRange",
            Self::Unimplemented => "Unimplemented",
            Self::Internal => "Internal",
            Self::Unavailable => "Unavailable",
            Self::DataLoss => "DataLoss",
            Self::Unauthenticated => "Unauthenticated",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified failure returned by the service.
///
/// Carries the stable transport code plus the service-specific sub-code
/// string, e.g. `(NotFound/NonRecoverableTransaction) message`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("({code}/{api_code}) {message}")]
pub struct RemoteError {
    /// The stable transport-level code.
    pub code: ErrorCode,
    /// The service-specific sub-code, e.g. `"StoreNotFound"`.
    pub api_code: String,
    /// Human-readable detail.
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrorCode, api_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            api_code: api_code.into(),
            message: message.into(),
        }
    }
}

/// Local detection of a malformed or out-of-sequence exchange.
///
/// Never retried; the owning stream is torn down before the error
/// surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The stream ended while a response was still expected.
    #[error("stream ended while awaiting a response")]
    UnexpectedEnd,

    /// A response answered a different request than the one in flight.
    #[error("expected message_id {expected}, got {got}")]
    MessageIdMismatch {
        /// The ID of the outstanding request.
        expected: MessageId,
        /// The ID the response carried.
        got: MessageId,
    },

    /// A response arrived with no variant populated.
    #[error("response has no variant populated")]
    EmptyResponse,

    /// A response's populated variant was not the one the request expects.
    #[error("expected {expected} response, got {got}")]
    UnexpectedVariant {
        /// The variant the request expects.
        expected: &'static str,
        /// The variant that arrived.
        got: &'static str,
    },

    /// A list/sync stream ended without ever sending `finished`.
    #[error("list stream ended before a finished message")]
    MissingFinished,

    /// A generated-ID byte payload was not 16 bytes.
    #[error("generated ID has {len} bytes, expected 16 (UUID)")]
    InvalidGeneratedId {
        /// The length that arrived.
        len: usize,
    },

    /// An operation was issued on a session whose stream is already
    /// closed or torn down.
    #[error("stream already closed")]
    StreamClosed,
}

/// Errors surfaced by client operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// A classified failure returned by the service.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A malformed or out-of-sequence exchange, fatal to its session.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The token-fetch retry budget was exhausted.
    #[error("token fetch failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// How many fetches were attempted.
        attempts: u32,
        /// The last underlying remote error.
        source: RemoteError,
    },

    /// An item could not cross the marshaling boundary.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The transport failed to send, receive, or close.
    #[error("transport error: {0}")]
    Transport(String),

    /// An internal invariant of the client broke.
    #[error("internal error: {0}")]
    Internal(String),
}
