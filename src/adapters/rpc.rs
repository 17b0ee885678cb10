//! Binary-RPC adapter.
//!
//! Calls a named procedure on the logging backend over plain TCP. Frames
//! are a 4-byte big-endian length followed by a protobuf message
//! ([`RpcRequest`] out, [`RpcResponse`] back). Each call dials a fresh
//! connection and closes it when the reply has been read.
//!
//! Dialing per call keeps calls fully independent but costs a TCP
//! handshake each time; a pooled connection is the obvious upgrade if
//! log volume over this route grows.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

use super::{Backend, LogSink, TransportKind};
use crate::envelope::JsonResponse;
use crate::error::{BrokerError, Result, TransportFailure};
use crate::payload::LogPayload;
use crate::proto::rpc::{RpcLogPayload, RpcRequest, RpcResponse, RpcStringResult};

/// Procedure that records a log entry at INFO level.
pub const LOG_INFO_METHOD: &str = "RPCServer.LogInfo";

/// Sequence number of the single call made on each connection.
const CALL_SEQ: u64 = 1;

/// Failure of one RPC call.
enum CallError {
    Transport(TransportFailure),
    /// The procedure ran and reported an error.
    Remote(String),
}

impl From<TransportFailure> for CallError {
    fn from(failure: TransportFailure) -> Self {
        CallError::Transport(failure)
    }
}

/// Length-delimited frame codec shared by client and server ends.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::new()
}

/// Minimal client for the binary RPC protocol.
#[derive(Debug, Clone)]
pub struct RpcClient {
    address: String,
    deadline: Duration,
}

impl RpcClient {
    pub fn new(address: impl Into<String>, deadline: Duration) -> Self {
        Self {
            address: address.into(),
            deadline,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Invoke `method` with `args`, decoding the result as `R`.
    async fn call<A, R>(&self, method: &str, args: &A) -> std::result::Result<R, CallError>
    where
        A: Message,
        R: Message + Default,
    {
        match tokio::time::timeout(self.deadline, self.exchange(method, args)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CallError::Transport(TransportFailure::DeadlineExceeded(
                self.deadline,
            ))),
        }
    }

    async fn exchange<A, R>(&self, method: &str, args: &A) -> std::result::Result<R, CallError>
    where
        A: Message,
        R: Message + Default,
    {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| TransportFailure::Connect(format!("{}: {}", self.address, e)))?;
        let mut framed = Framed::new(stream, frame_codec());

        let request = RpcRequest {
            seq: CALL_SEQ,
            service_method: method.to_string(),
            body: args.encode_to_vec(),
        };
        framed
            .send(Bytes::from(request.encode_to_vec()))
            .await
            .map_err(|e| TransportFailure::Io(e.to_string()))?;

        let frame = framed
            .next()
            .await
            .ok_or_else(|| TransportFailure::Io("connection closed before reply".to_string()))?
            .map_err(|e| TransportFailure::Io(e.to_string()))?;

        let response = RpcResponse::decode(frame.freeze())
            .map_err(|e| TransportFailure::Protocol(format!("undecodable reply: {}", e)))?;

        if response.seq != CALL_SEQ {
            return Err(TransportFailure::Protocol(format!(
                "reply seq {} does not match request seq {}",
                response.seq, CALL_SEQ
            ))
            .into());
        }
        if !response.error.is_empty() {
            return Err(CallError::Remote(response.error));
        }

        R::decode(response.body.as_slice())
            .map_err(|e| TransportFailure::Protocol(format!("undecodable result: {}", e)).into())
    }
}

/// Log delivery through `RPCServer.LogInfo`. The procedure's string
/// result becomes the response message.
#[derive(Debug, Clone)]
pub struct RpcLogSink {
    client: RpcClient,
}

impl RpcLogSink {
    pub fn new(address: impl Into<String>, deadline: Duration) -> Self {
        Self {
            client: RpcClient::new(address, deadline),
        }
    }
}

#[async_trait]
impl LogSink for RpcLogSink {
    fn transport(&self) -> TransportKind {
        TransportKind::Rpc
    }

    #[tracing::instrument(name = "adapter.rpc", skip_all, fields(address = %self.client.address()))]
    async fn write_log(&self, entry: &LogPayload) -> Result<JsonResponse> {
        let args = RpcLogPayload {
            name: entry.name.clone(),
            data: entry.data.clone(),
        };

        match self
            .client
            .call::<_, RpcStringResult>(LOG_INFO_METHOD, &args)
            .await
        {
            Ok(result) => {
                debug!(result = %result.value, "RPC call returned");
                Ok(JsonResponse::success(result.value))
            }
            Err(CallError::Remote(message)) => {
                warn!(error = %message, "RPC procedure failed");
                Err(BrokerError::call_failed(Backend::Logger, message))
            }
            Err(CallError::Transport(failure)) => {
                warn!(error = %failure, "RPC transport failed");
                Err(BrokerError::transport(TransportKind::Rpc, failure))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn entry() -> LogPayload {
        LogPayload {
            name: "event".to_string(),
            data: "via rpc".to_string(),
        }
    }

    /// Accept one connection and answer its request with `reply`.
    async fn serve_once(reply: RpcResponse) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, frame_codec());
            let _request = framed.next().await.unwrap().unwrap();
            framed.send(Bytes::from(reply.encode_to_vec())).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_remote_error_is_backend_failure() {
        let addr = serve_once(RpcResponse {
            seq: CALL_SEQ,
            error: "mongo unavailable".to_string(),
            body: vec![],
        })
        .await;

        let sink = RpcLogSink::new(addr, Duration::from_secs(2));
        let err = sink.write_log(&entry()).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::BackendCallFailed {
                backend: Backend::Logger,
                ref detail,
            } if detail == "mongo unavailable"
        ));
    }

    #[tokio::test]
    async fn test_seq_mismatch_is_protocol_error() {
        let addr = serve_once(RpcResponse {
            seq: 42,
            error: String::new(),
            body: RpcStringResult {
                value: "ok".to_string(),
            }
            .encode_to_vec(),
        })
        .await;

        let sink = RpcLogSink::new(addr, Duration::from_secs(2));
        let err = sink.write_log(&entry()).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Transport {
                transport: TransportKind::Rpc,
                source: TransportFailure::Protocol(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_silent_server_hits_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let sink = RpcLogSink::new(addr, Duration::from_millis(200));
        let err = sink.write_log(&entry()).await.unwrap_err();
        assert!(err.is_deadline());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let sink = RpcLogSink::new("127.0.0.1:1", Duration::from_secs(2));
        let err = sink.write_log(&entry()).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Transport {
                transport: TransportKind::Rpc,
                source: TransportFailure::Connect(_)
            }
        ));
    }
}
