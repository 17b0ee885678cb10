//! Inbound request decoding.
//!
//! The wire form is a loose document `{action, auth?, log?, mail?}`. It is
//! narrowed into [`BrokerRequest`], a closed variant type carrying exactly
//! the payload its action needs, before anything is dispatched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};

/// Credentials forwarded to the authentication backend.
///
/// Absent fields in this and the other payloads decode as empty strings;
/// the backend decides whether they are acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthPayload {
    pub email: String,
    pub password: String,
}

/// A log entry forwarded to the logging backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogPayload {
    pub name: String,
    pub data: String,
}

/// A message forwarded to the mail backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailPayload {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message: String,
}

/// Inbound document as received on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Action tag selecting backend and transport.
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailPayload>,
}

impl RequestPayload {
    /// Decode a request body.
    ///
    /// Trailing data after the document is rejected.
    pub fn decode(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| BrokerError::Decode(e.to_string()))
    }

    /// Narrow into a typed request. The action is checked before the
    /// payload, so an unknown tag is reported even when no payload is set.
    pub fn into_request(self) -> Result<BrokerRequest> {
        match self.action.parse::<Action>()? {
            Action::Auth => self
                .auth
                .map(BrokerRequest::Auth)
                .ok_or(BrokerError::MissingPayload("auth")),
            Action::Log(transport) => self
                .log
                .map(|entry| BrokerRequest::Log { transport, entry })
                .ok_or(BrokerError::MissingPayload("log")),
            Action::Mail => self
                .mail
                .map(BrokerRequest::Mail)
                .ok_or(BrokerError::MissingPayload("mail")),
        }
    }
}

/// Transport used to deliver a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTransport {
    Http,
    Queue,
    Rpc,
    Grpc,
}

impl LogTransport {
    /// All log transports, in dispatch-table order.
    pub const ALL: [LogTransport; 4] = [
        LogTransport::Http,
        LogTransport::Queue,
        LogTransport::Rpc,
        LogTransport::Grpc,
    ];
}

/// Parsed action tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Auth,
    Log(LogTransport),
    Mail,
}

impl Action {
    /// Canonical tag for this action.
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Auth => "auth",
            Action::Log(LogTransport::Http) => "log",
            Action::Log(LogTransport::Queue) => "log-via-queue",
            Action::Log(LogTransport::Rpc) => "log-via-rpc",
            Action::Log(LogTransport::Grpc) => "log-via-grpc",
            Action::Mail => "mail",
        }
    }
}

impl FromStr for Action {
    type Err = BrokerError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "auth" => Ok(Action::Auth),
            "log" => Ok(Action::Log(LogTransport::Http)),
            // "log-via-rabbit" is the historical name of the queue route.
            "log-via-queue" | "log-via-rabbit" => Ok(Action::Log(LogTransport::Queue)),
            "log-via-rpc" => Ok(Action::Log(LogTransport::Rpc)),
            "log-via-grpc" => Ok(Action::Log(LogTransport::Grpc)),
            "mail" => Ok(Action::Mail),
            other => Err(BrokerError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A validated request: one case per action, each with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerRequest {
    Auth(AuthPayload),
    Log {
        transport: LogTransport,
        entry: LogPayload,
    },
    Mail(MailPayload),
}

impl BrokerRequest {
    pub fn action(&self) -> Action {
        match self {
            BrokerRequest::Auth(_) => Action::Auth,
            BrokerRequest::Log { transport, .. } => Action::Log(*transport),
            BrokerRequest::Mail(_) => Action::Mail,
        }
    }
}
