//! Broker error taxonomy.
//!
//! Every failure is local to the request that caused it and ends up as a
//! `{error:true, message}` envelope; nothing here is retried.

use std::time::Duration;

use http::StatusCode;

use crate::adapters::{Backend, TransportKind};
use crate::envelope::JsonResponse;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors produced while decoding, dispatching or relaying a request.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Inbound body is not a valid request document.
    #[error("{0}")]
    Decode(String),

    /// Action tag is not one the broker routes.
    #[error("unknown action")]
    UnknownAction(String),

    /// Known action without the payload it requires.
    #[error("missing {0} payload")]
    MissingPayload(&'static str),

    /// Authentication backend answered 401.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Backend accepted the call but its envelope reported `error: true`.
    #[error("{message}")]
    BackendRejected { backend: Backend, message: String },

    /// Backend could not be reached or the exchange with it broke down.
    #[error("{transport} transport failed: {source}")]
    Transport {
        transport: TransportKind,
        #[source]
        source: TransportFailure,
    },

    /// Backend was reached but answered with something unexpected.
    #[error("error calling {backend} service")]
    BackendCallFailed { backend: Backend, detail: String },
}

/// Cause of a [`BrokerError::Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("i/o failed: {0}")]
    Io(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl BrokerError {
    pub fn transport(transport: TransportKind, source: TransportFailure) -> Self {
        BrokerError::Transport { transport, source }
    }

    pub fn call_failed(backend: Backend, detail: impl Into<String>) -> Self {
        BrokerError::BackendCallFailed {
            backend,
            detail: detail.into(),
        }
    }

    /// True if the call was abandoned because its deadline elapsed.
    pub fn is_deadline(&self) -> bool {
        matches!(
            self,
            BrokerError::Transport {
                source: TransportFailure::DeadlineExceeded(_),
                ..
            }
        )
    }

    /// HTTP status written back to the broker's caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BrokerError::Decode(_)
            | BrokerError::UnknownAction(_)
            | BrokerError::MissingPayload(_) => StatusCode::BAD_REQUEST,
            BrokerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            BrokerError::BackendRejected {
                backend: Backend::Auth,
                ..
            } => StatusCode::UNAUTHORIZED,
            BrokerError::BackendRejected { .. } => StatusCode::BAD_GATEWAY,
            BrokerError::Transport {
                source: TransportFailure::DeadlineExceeded(_),
                ..
            } => StatusCode::GATEWAY_TIMEOUT,
            BrokerError::Transport { .. } | BrokerError::BackendCallFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Failure envelope for this error. Never carries `data`.
    pub fn to_envelope(&self) -> JsonResponse {
        JsonResponse::failure(self.to_string())
    }
}
