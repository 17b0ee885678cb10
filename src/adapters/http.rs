//! HTTP-JSON adapter.
//!
//! POSTs a JSON document to one backend path and classifies the reply.
//! All HTTP backends signal success with `202 Accepted`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use super::{Authenticator, Backend, LogSink, Mailer, TransportKind};
use crate::envelope::JsonResponse;
use crate::error::{BrokerError, Result, TransportFailure};
use crate::payload::{AuthPayload, LogPayload, MailPayload};

/// Path of the credential check on the authentication backend.
pub const AUTHENTICATE_PATH: &str = "/authenticate";
/// Path of the log-write endpoint on the logging backend.
pub const LOG_PATH: &str = "/log";
/// Path of the send endpoint on the mail backend.
pub const SEND_PATH: &str = "/send";

/// Status every HTTP backend answers with on success.
pub const BACKEND_SUCCESS: StatusCode = StatusCode::ACCEPTED;

/// A fully consumed backend reply.
#[derive(Debug)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpReply {
    /// Backend envelope carried by the body, if it parses as one.
    fn envelope(&self) -> Option<JsonResponse> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// JSON-over-HTTP client bound to a single backend.
///
/// The reqwest client is injected and only read; it is safe to share one
/// adapter across concurrent requests.
#[derive(Debug, Clone)]
pub struct HttpJsonAdapter {
    client: Client,
    backend: Backend,
    base_url: String,
    deadline: Duration,
}

impl HttpJsonAdapter {
    /// Build an adapter with its own client, bounded by `deadline` per call.
    pub fn new(backend: Backend, base_url: impl Into<String>, deadline: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(deadline)
            .build()
            .map_err(client_setup_error)?;
        Ok(Self::with_client(client, backend, base_url, deadline))
    }

    /// Build an adapter around an existing client.
    pub fn with_client(
        client: Client,
        backend: Backend,
        base_url: impl Into<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            client,
            backend,
            base_url: base_url.into(),
            deadline,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// POST `payload` as JSON to `path`.
    ///
    /// The response body is read to completion before returning, so the
    /// connection goes back to the client on every path out of here.
    pub async fn post_json<T>(&self, path: &str, payload: &T) -> Result<HttpReply>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload).map_err(|e| {
            BrokerError::transport(TransportKind::Http, TransportFailure::Encode(e.to_string()))
        })?;

        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.request_error(e))?;

        debug!(
            backend = %self.backend,
            url = %url,
            status = %status,
            "Backend replied"
        );

        Ok(HttpReply { status, body })
    }

    fn request_error(&self, err: reqwest::Error) -> BrokerError {
        let failure = if err.is_timeout() {
            TransportFailure::DeadlineExceeded(self.deadline)
        } else if err.is_connect() {
            TransportFailure::Connect(err.to_string())
        } else if err.is_builder() {
            TransportFailure::Encode(err.to_string())
        } else {
            TransportFailure::Io(err.to_string())
        };
        warn!(backend = %self.backend, error = %err, "HTTP call failed");
        BrokerError::transport(TransportKind::Http, failure)
    }

    /// Accept a `202` reply, surfacing a backend envelope with `error: true`.
    ///
    /// Bodies that are not an envelope are taken as plain success.
    fn accept(&self, reply: &HttpReply) -> Result<()> {
        if reply.status != BACKEND_SUCCESS {
            warn!(backend = %self.backend, status = %reply.status, "Unexpected backend status");
            return Err(BrokerError::call_failed(
                self.backend,
                format!("unexpected status {}", reply.status),
            ));
        }
        match reply.envelope() {
            Some(envelope) if envelope.error => Err(BrokerError::BackendRejected {
                backend: self.backend,
                message: envelope.message,
            }),
            _ => Ok(()),
        }
    }
}

/// The client could not be set up (TLS backend, resolver), so no call can
/// be placed.
fn client_setup_error(err: impl std::fmt::Display) -> BrokerError {
    BrokerError::transport(
        TransportKind::Http,
        TransportFailure::Connect(format!("Failed to build client: {}", err)),
    )
}

/// Authentication over `POST /authenticate`.
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    http: HttpJsonAdapter,
}

impl HttpAuthenticator {
    pub fn new(http: HttpJsonAdapter) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    #[tracing::instrument(name = "adapter.http", skip_all, fields(backend = "auth"))]
    async fn authenticate(&self, credentials: &AuthPayload) -> Result<JsonResponse> {
        let reply = self.http.post_json(AUTHENTICATE_PATH, credentials).await?;

        if reply.status == StatusCode::UNAUTHORIZED {
            return Err(BrokerError::InvalidCredentials);
        }
        if reply.status != BACKEND_SUCCESS {
            warn!(status = %reply.status, "Unexpected auth status");
            return Err(BrokerError::call_failed(
                Backend::Auth,
                format!("unexpected status {}", reply.status),
            ));
        }

        // Unlike log and mail, the reply body must be an envelope.
        let envelope: JsonResponse = serde_json::from_slice(&reply.body)
            .map_err(|e| BrokerError::call_failed(Backend::Auth, e.to_string()))?;

        if envelope.error {
            if envelope.message.is_empty() {
                return Err(BrokerError::InvalidCredentials);
            }
            return Err(BrokerError::BackendRejected {
                backend: Backend::Auth,
                message: envelope.message,
            });
        }

        Ok(JsonResponse::success("Authenticated!").with_data(envelope.data))
    }
}

/// Log delivery over `POST /log`.
#[derive(Debug, Clone)]
pub struct HttpLogSink {
    http: HttpJsonAdapter,
}

impl HttpLogSink {
    pub fn new(http: HttpJsonAdapter) -> Self {
        Self { http }
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    fn transport(&self) -> TransportKind {
        TransportKind::Http
    }

    #[tracing::instrument(
        name = "adapter.http",
        skip_all,
        fields(backend = "logger", name = %entry.name)
    )]
    async fn write_log(&self, entry: &LogPayload) -> Result<JsonResponse> {
        let reply = self.http.post_json(LOG_PATH, entry).await?;
        self.http.accept(&reply)?;
        Ok(JsonResponse::success("Logged"))
    }
}

/// Mail hand-off over `POST /send`.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    http: HttpJsonAdapter,
}

impl HttpMailer {
    pub fn new(http: HttpJsonAdapter) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[tracing::instrument(
        name = "adapter.http",
        skip_all,
        fields(backend = "mail", to = %message.to)
    )]
    async fn send_mail(&self, message: &MailPayload) -> Result<JsonResponse> {
        let reply = self.http.post_json(SEND_PATH, message).await?;
        self.http.accept(&reply)?;
        Ok(JsonResponse::success(format!("Message sent to {}", message.to)))
    }
}
