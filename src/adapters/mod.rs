//! Transport adapters.
//!
//! Each adapter encodes one payload shape, performs a single bounded call
//! to one backend over one transport, and translates the reply into a
//! [`JsonResponse`] or a [`BrokerError`]. Adapters hold only read-only
//! target configuration; nothing survives between calls.
//!
//! Implementations:
//! - [`http`]: synchronous JSON over HTTP (auth, logging, mail)
//! - [`queue`]: fire-and-forget publish to RabbitMQ (logging)
//! - [`rpc`]: length-delimited protobuf frames over TCP (logging)
//! - [`grpc`]: tonic client for the log service (logging)
//! - [`mock`]: recording in-memory adapters for testing

use std::fmt;

use async_trait::async_trait;

use crate::envelope::JsonResponse;
use crate::error::Result;
use crate::payload::{AuthPayload, LogPayload, MailPayload};

pub mod grpc;
pub mod http;
pub mod mock;
pub mod queue;
pub mod rpc;

pub use grpc::GrpcLogSink;
pub use http::{HttpAuthenticator, HttpJsonAdapter, HttpLogSink, HttpMailer};
pub use queue::QueueLogSink;
pub use rpc::RpcLogSink;

/// Outbound transport family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Http,
    Queue,
    Rpc,
    Grpc,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Http => "http",
            TransportKind::Queue => "amqp",
            TransportKind::Rpc => "rpc",
            TransportKind::Grpc => "grpc",
        })
    }
}

/// Backend service a call is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Auth,
    Logger,
    Mail,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Auth => "auth",
            Backend::Logger => "logger",
            Backend::Mail => "mail",
        })
    }
}

/// Verifies credentials against the authentication backend.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &AuthPayload) -> Result<JsonResponse>;
}

/// Delivers log entries to the logging backend.
///
/// Every transport that reaches the logging backend implements this, which
/// is what makes the log routes interchangeable.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Transport this sink delivers over.
    fn transport(&self) -> TransportKind;

    async fn write_log(&self, entry: &LogPayload) -> Result<JsonResponse>;
}

/// Hands messages to the mail backend.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, message: &MailPayload) -> Result<JsonResponse>;
}
