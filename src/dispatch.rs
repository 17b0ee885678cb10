//! Action dispatcher.
//!
//! Routes a validated [`BrokerRequest`] to exactly one adapter. The match
//! over request variants is exhaustive, so every action has a route at
//! compile time; unknown tags never get this far. Adapter results are
//! relayed untouched.

use std::sync::Arc;

use tracing::{debug, info};

use crate::adapters::{
    Authenticator, Backend, GrpcLogSink, HttpAuthenticator, HttpJsonAdapter, HttpLogSink,
    HttpMailer, LogSink, Mailer, QueueLogSink, RpcLogSink,
};
use crate::config::Config;
use crate::envelope::JsonResponse;
use crate::error::Result;
use crate::payload::{BrokerRequest, LogPayload, LogTransport, RequestPayload};

/// One log sink per transport that reaches the logging backend.
#[derive(Clone)]
pub struct LogRoutes {
    pub http: Arc<dyn LogSink>,
    pub queue: Arc<dyn LogSink>,
    pub rpc: Arc<dyn LogSink>,
    pub grpc: Arc<dyn LogSink>,
}

impl LogRoutes {
    pub fn sink(&self, transport: LogTransport) -> &dyn LogSink {
        match transport {
            LogTransport::Http => self.http.as_ref(),
            LogTransport::Queue => self.queue.as_ref(),
            LogTransport::Rpc => self.rpc.as_ref(),
            LogTransport::Grpc => self.grpc.as_ref(),
        }
    }
}

/// Routes requests to adapters. Holds no per-request state and is shared
/// read-only across concurrent requests.
#[derive(Clone)]
pub struct Dispatcher {
    auth: Arc<dyn Authenticator>,
    mail: Arc<dyn Mailer>,
    logs: LogRoutes,
}

impl Dispatcher {
    pub fn new(auth: Arc<dyn Authenticator>, mail: Arc<dyn Mailer>, logs: LogRoutes) -> Self {
        Self { auth, mail, logs }
    }

    /// Wire the production adapters from configuration.
    ///
    /// The queue sink is passed in so the caller can warm its pool first.
    pub fn from_config(config: &Config, queue: Arc<QueueLogSink>) -> Result<Self> {
        let backends = &config.backends;
        let deadlines = &config.deadlines;

        let auth = HttpAuthenticator::new(HttpJsonAdapter::new(
            Backend::Auth,
            &backends.auth.url,
            deadlines.http(),
        )?);
        let mail = HttpMailer::new(HttpJsonAdapter::new(
            Backend::Mail,
            &backends.mail.url,
            deadlines.http(),
        )?);
        let http_log = HttpLogSink::new(HttpJsonAdapter::new(
            Backend::Logger,
            &backends.logger.url,
            deadlines.http(),
        )?);

        let logs = LogRoutes {
            http: Arc::new(http_log),
            queue,
            rpc: Arc::new(RpcLogSink::new(
                &backends.logger.rpc_address,
                deadlines.rpc(),
            )),
            grpc: Arc::new(GrpcLogSink::new(
                &backends.logger.grpc_address,
                deadlines.grpc(),
            )),
        };

        info!(
            auth = %backends.auth.url,
            logger = %backends.logger.url,
            mail = %backends.mail.url,
            "Dispatcher wired"
        );

        Ok(Self::new(Arc::new(auth), Arc::new(mail), logs))
    }

    /// Validate a decoded document and dispatch it.
    pub async fn handle(&self, payload: RequestPayload) -> Result<JsonResponse> {
        let request = payload.into_request()?;
        self.dispatch(request).await
    }

    /// Make the single outbound call `request` calls for.
    #[tracing::instrument(name = "dispatch", skip_all, fields(action = %request.action()))]
    pub async fn dispatch(&self, request: BrokerRequest) -> Result<JsonResponse> {
        debug!("Dispatching request");
        match request {
            BrokerRequest::Auth(credentials) => self.auth.authenticate(&credentials).await,
            BrokerRequest::Log { transport, entry } => self.log_via(transport, &entry).await,
            BrokerRequest::Mail(message) => self.mail.send_mail(&message).await,
        }
    }

    /// Deliver a log entry over a specific transport.
    pub async fn log_via(
        &self,
        transport: LogTransport,
        entry: &LogPayload,
    ) -> Result<JsonResponse> {
        self.logs.sink(transport).write_log(entry).await
    }
}
