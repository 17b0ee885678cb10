//! gRPC adapter for the log service.
//!
//! Every call dials its own insecure (plaintext) channel, is bounded by a
//! wall-clock deadline measured from issuance, and drops the channel when
//! it returns, whatever the outcome.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status};
use tracing::{debug, warn};

use super::{Backend, LogSink, TransportKind};
use crate::envelope::JsonResponse;
use crate::error::{BrokerError, Result, TransportFailure};
use crate::payload::LogPayload;
use crate::proto::logs::log_service_client::LogServiceClient;
use crate::proto::logs::{Log, LogRequest};

/// Writes log entries through `logs.LogService/WriteLog`.
#[derive(Debug, Clone)]
pub struct GrpcLogSink {
    address: String,
    deadline: Duration,
}

impl GrpcLogSink {
    /// `address` is `host:port`; a scheme is added when missing.
    pub fn new(address: impl Into<String>, deadline: Duration) -> Self {
        Self {
            address: address.into(),
            deadline,
        }
    }

    fn endpoint(&self) -> std::result::Result<Endpoint, TransportFailure> {
        let uri = if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        };
        Endpoint::from_shared(uri)
            .map(|e| e.connect_timeout(self.deadline).timeout(self.deadline))
            .map_err(|e| TransportFailure::Encode(format!("Invalid URI: {}", e)))
    }

    async fn connect(&self) -> std::result::Result<Channel, TransportFailure> {
        self.endpoint()?
            .connect()
            .await
            .map_err(|e| TransportFailure::Connect(format!("{}: {}", self.address, e)))
    }

    async fn call(&self, entry: &LogPayload) -> Result<String> {
        let channel = self
            .connect()
            .await
            .map_err(|f| BrokerError::transport(TransportKind::Grpc, f))?;
        let mut client = LogServiceClient::new(channel);

        let mut request = Request::new(LogRequest {
            log_entry: Some(Log {
                name: entry.name.clone(),
                data: entry.data.clone(),
            }),
        });
        request.set_timeout(self.deadline);

        let response = client
            .write_log(request)
            .await
            .map_err(|status| self.status_error(status))?;

        Ok(response.into_inner().result)
    }

    fn status_error(&self, status: Status) -> BrokerError {
        match status.code() {
            Code::DeadlineExceeded | Code::Cancelled => BrokerError::transport(
                TransportKind::Grpc,
                TransportFailure::DeadlineExceeded(self.deadline),
            ),
            Code::Unavailable => BrokerError::transport(
                TransportKind::Grpc,
                TransportFailure::Connect(status.message().to_string()),
            ),
            _ => BrokerError::call_failed(
                Backend::Logger,
                format!("{:?}: {}", status.code(), status.message()),
            ),
        }
    }
}

#[async_trait]
impl LogSink for GrpcLogSink {
    fn transport(&self) -> TransportKind {
        TransportKind::Grpc
    }

    #[tracing::instrument(
        name = "adapter.grpc",
        skip_all,
        fields(address = %self.address, deadline_ms = self.deadline.as_millis() as u64)
    )]
    async fn write_log(&self, entry: &LogPayload) -> Result<JsonResponse> {
        // The channel lives inside `call`, so it is dropped here on timeout too.
        let outcome = match tokio::time::timeout(self.deadline, self.call(entry)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BrokerError::transport(
                TransportKind::Grpc,
                TransportFailure::DeadlineExceeded(self.deadline),
            )),
        };

        match outcome {
            Ok(result) => {
                debug!(result = %result, "gRPC log written");
                Ok(JsonResponse::success("Logged"))
            }
            Err(e) => {
                warn!(error = %e, "gRPC log write failed");
                Err(e)
            }
        }
    }
}
