//! broker: action-tagged request relay
//!
//! ## Architecture
//! ```text
//! client --(POST /handle)--> [broker] --HTTP--> authentication-service
//!                                     --HTTP--> mail-service
//!                                     --HTTP / AMQP / RPC / gRPC--> logger-service
//! ```
//!
//! ## Configuration
//! - First argument: optional path to a YAML config file
//! - BROKER_CONFIG: path to a YAML config file
//! - BROKER__<SECTION>__<KEY>: per-key overrides (e.g. BROKER__SERVER__PORT)
//! - BROKER_LOG: tracing filter (default: info)

use std::sync::Arc;

use tracing::info;

use broker::adapters::QueueLogSink;
use broker::config::Config;
use broker::server;
use broker::utils::bootstrap::{connect_with_retry, init_tracing};
use broker::Dispatcher;

/// Attempts made to reach RabbitMQ before refusing to start.
const AMQP_CONNECT_ATTEMPTS: usize = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let queue = Arc::new(QueueLogSink::new(&config.amqp, config.deadlines.queue())?);
    if config.amqp.connect_on_startup {
        connect_with_retry("rabbitmq", &config.amqp.url, AMQP_CONNECT_ATTEMPTS, || {
            queue.verify_connection()
        })
        .await?;
    }

    let dispatcher = Arc::new(Dispatcher::from_config(&config, queue)?);

    info!(addr = %config.server.addr(), "Starting broker service");
    server::serve(dispatcher, &config.server)
        .await
        .map_err(|e| -> Box<dyn std::error::Error> { e })?;

    Ok(())
}
