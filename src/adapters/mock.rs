//! Recording in-memory adapters for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Authenticator, Backend, LogSink, Mailer, TransportKind};
use crate::envelope::JsonResponse;
use crate::error::{BrokerError, Result, TransportFailure};
use crate::payload::{AuthPayload, LogPayload, MailPayload};

/// Mock log sink that records every entry it is handed.
pub struct MockLogSink {
    transport: TransportKind,
    written: RwLock<Vec<LogPayload>>,
    fail_on_write: RwLock<bool>,
}

impl MockLogSink {
    pub fn new(transport: TransportKind) -> Self {
        Self {
            transport,
            written: RwLock::new(Vec::new()),
            fail_on_write: RwLock::new(false),
        }
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn written_count(&self) -> usize {
        self.written.read().await.len()
    }

    pub async fn take_written(&self) -> Vec<LogPayload> {
        std::mem::take(&mut *self.written.write().await)
    }
}

#[async_trait]
impl LogSink for MockLogSink {
    fn transport(&self) -> TransportKind {
        self.transport
    }

    async fn write_log(&self, entry: &LogPayload) -> Result<JsonResponse> {
        self.written.write().await.push(entry.clone());
        if *self.fail_on_write.read().await {
            return Err(BrokerError::transport(
                self.transport,
                TransportFailure::Connect("Mock write failure".to_string()),
            ));
        }
        Ok(JsonResponse::success(format!("Logged via {}", self.transport)))
    }
}

/// Mock authenticator accepting one email/password pair.
pub struct MockAuthenticator {
    email: String,
    password: String,
    calls: RwLock<Vec<AuthPayload>>,
}

impl MockAuthenticator {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            calls: RwLock::new(Vec::new()),
        }
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate(&self, credentials: &AuthPayload) -> Result<JsonResponse> {
        self.calls.write().await.push(credentials.clone());
        if credentials.email != self.email || credentials.password != self.password {
            return Err(BrokerError::InvalidCredentials);
        }
        Ok(JsonResponse::success("Authenticated!")
            .with_data(Some(serde_json::json!({ "email": credentials.email }))))
    }
}

/// Mock mailer that records every message.
#[derive(Default)]
pub struct MockMailer {
    sent: RwLock<Vec<MailPayload>>,
    fail_on_send: RwLock<bool>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_send(&self, fail: bool) {
        *self.fail_on_send.write().await = fail;
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.len()
    }

    pub async fn take_sent(&self) -> Vec<MailPayload> {
        std::mem::take(&mut *self.sent.write().await)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_mail(&self, message: &MailPayload) -> Result<JsonResponse> {
        self.sent.write().await.push(message.clone());
        if *self.fail_on_send.read().await {
            return Err(BrokerError::call_failed(Backend::Mail, "Mock send failure"));
        }
        Ok(JsonResponse::success(format!("Message sent to {}", message.to)))
    }
}
