//! In-process stub backends for integration tests.
//!
//! Each stub binds to a random loopback port, records what it receives and
//! answers with a configurable reply.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use prost::Message;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::codec::Framed;
use tonic::transport::Server;

use broker::adapters::rpc::{frame_codec, LOG_INFO_METHOD};
use broker::proto::logs::log_service_server::{LogService, LogServiceServer};
use broker::proto::logs::{Log, LogRequest, LogResponse};
use broker::proto::rpc::{RpcLogPayload, RpcRequest, RpcResponse, RpcStringResult};

// ============================================================================
// HTTP backend
// ============================================================================

struct HttpStubState {
    reply: RwLock<(StatusCode, Value)>,
    delay: RwLock<Duration>,
    received: RwLock<Vec<(String, Value)>>,
}

/// Stub HTTP backend answering every POST with one configured reply.
pub struct StubHttpBackend {
    state: Arc<HttpStubState>,
    _handle: JoinHandle<()>,
    addr: SocketAddr,
}

impl StubHttpBackend {
    /// Start with the given reply. A `Value::Null` body is sent empty.
    pub async fn start(status: StatusCode, body: Value) -> Self {
        let state = Arc::new(HttpStubState {
            reply: RwLock::new((status, body)),
            delay: RwLock::new(Duration::ZERO),
            received: RwLock::new(Vec::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub HTTP backend");
        let addr = listener.local_addr().expect("Failed to get local address");

        let app = Router::new()
            .fallback(record_and_reply)
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Stub HTTP backend failed");
        });

        Self {
            state,
            _handle: handle,
            addr,
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:12345`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn set_reply(&self, status: StatusCode, body: Value) {
        *self.state.reply.write().await = (status, body);
    }

    /// Sleep for `delay` after recording each request, before replying.
    pub async fn set_delay(&self, delay: Duration) {
        *self.state.delay.write().await = delay;
    }

    /// `(path, json body)` of every request received so far.
    pub async fn received(&self) -> Vec<(String, Value)> {
        self.state.received.read().await.clone()
    }
}

async fn record_and_reply(
    State(state): State<Arc<HttpStubState>>,
    uri: Uri,
    body: Bytes,
) -> Response {
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state
        .received
        .write()
        .await
        .push((uri.path().to_string(), json));

    let delay = *state.delay.read().await;
    tokio::time::sleep(delay).await;

    let (status, reply) = state.reply.read().await.clone();
    if reply.is_null() {
        status.into_response()
    } else {
        (status, Json(reply)).into_response()
    }
}

// ============================================================================
// gRPC log service
// ============================================================================

/// Decrements the in-flight counter when a handler finishes or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct StubLogService {
    received: Arc<RwLock<Vec<Log>>>,
    in_flight: Arc<AtomicUsize>,
    delay: Duration,
}

#[tonic::async_trait]
impl LogService for StubLogService {
    async fn write_log(
        &self,
        request: tonic::Request<LogRequest>,
    ) -> Result<tonic::Response<LogResponse>, tonic::Status> {
        let _guard = InFlight::enter(&self.in_flight);
        let entry = request
            .into_inner()
            .log_entry
            .ok_or_else(|| tonic::Status::invalid_argument("missing log entry"))?;
        self.received.write().await.push(entry.clone());

        tokio::time::sleep(self.delay).await;

        Ok(tonic::Response::new(LogResponse {
            result: format!("logged {}", entry.name),
        }))
    }
}

/// Stub gRPC logging backend.
pub struct StubGrpcLogger {
    service: StubLogService,
    _handle: JoinHandle<()>,
    addr: SocketAddr,
}

impl StubGrpcLogger {
    /// Start a logger that answers immediately.
    pub async fn start() -> Self {
        Self::start_with_delay(Duration::ZERO).await
    }

    /// Start a logger that sleeps for `delay` before answering.
    pub async fn start_with_delay(delay: Duration) -> Self {
        let service = StubLogService {
            received: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            delay,
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub gRPC logger");
        let addr = listener.local_addr().expect("Failed to get local address");

        let server = Server::builder()
            .add_service(LogServiceServer::new(service.clone()))
            .serve_with_incoming(TcpListenerStream::new(listener));
        let handle = tokio::spawn(async move {
            server.await.expect("Stub gRPC logger failed");
        });

        Self {
            service,
            _handle: handle,
            addr,
        }
    }

    /// `host:port` of the listener.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub async fn received(&self) -> Vec<Log> {
        self.service.received.read().await.clone()
    }

    /// Handlers currently executing.
    pub fn in_flight(&self) -> usize {
        self.service.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no handler is executing, up to `limit`.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if self.in_flight() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.in_flight() == 0
    }
}

// ============================================================================
// Binary RPC logger
// ============================================================================

/// Stub binary-RPC logging backend serving `RPCServer.LogInfo`.
pub struct StubRpcLogger {
    received: Arc<RwLock<Vec<RpcLogPayload>>>,
    connections: Arc<AtomicUsize>,
    _handle: JoinHandle<()>,
    addr: SocketAddr,
}

impl StubRpcLogger {
    pub async fn start() -> Self {
        let received = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub RPC logger");
        let addr = listener.local_addr().expect("Failed to get local address");

        let handle = {
            let received = received.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let received = received.clone();
                    tokio::spawn(async move {
                        let mut framed = Framed::new(stream, frame_codec());
                        while let Some(Ok(frame)) = framed.next().await {
                            let reply = answer(&received, &frame).await;
                            if framed.send(Bytes::from(reply.encode_to_vec())).await.is_err() {
                                break;
                            }
                        }
                    });
                }
            })
        };

        Self {
            received,
            connections,
            _handle: handle,
            addr,
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub async fn received(&self) -> Vec<RpcLogPayload> {
        self.received.read().await.clone()
    }

    /// TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn answer(received: &RwLock<Vec<RpcLogPayload>>, frame: &[u8]) -> RpcResponse {
    let request = match RpcRequest::decode(frame) {
        Ok(request) => request,
        Err(e) => {
            return RpcResponse {
                seq: 0,
                error: format!("bad request: {}", e),
                body: vec![],
            }
        }
    };

    if request.service_method != LOG_INFO_METHOD {
        return RpcResponse {
            seq: request.seq,
            error: format!("rpc: can't find method {}", request.service_method),
            body: vec![],
        };
    }

    match RpcLogPayload::decode(request.body.as_slice()) {
        Ok(payload) => {
            let value = format!("Processed payload via RPC: {}", payload.name);
            received.write().await.push(payload);
            RpcResponse {
                seq: request.seq,
                error: String::new(),
                body: RpcStringResult { value }.encode_to_vec(),
            }
        }
        Err(e) => RpcResponse {
            seq: request.seq,
            error: format!("bad payload: {}", e),
            body: vec![],
        },
    }
}
