//! Broker - action-tagged request relay
//!
//! Accepts a single JSON request tagged with an action, forwards it to the
//! authentication, logging or mail backend over HTTP, RabbitMQ, binary RPC
//! or gRPC, and relays the backend's answer in a uniform envelope.

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod server;
pub mod utils;

pub use dispatch::Dispatcher;
pub use envelope::JsonResponse;
pub use error::{BrokerError, Result, TransportFailure};

pub mod proto {
    pub mod logs {
        tonic::include_proto!("logs");
    }

    pub mod rpc {
        tonic::include_proto!("rpc");
    }
}
