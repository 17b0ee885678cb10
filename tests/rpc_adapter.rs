//! Binary-RPC adapter tests against a stub logger.

mod common;

use std::time::Duration;

use broker::adapters::{LogSink, RpcLogSink};
use broker::payload::LogPayload;

use common::StubRpcLogger;

#[tokio::test]
async fn test_log_info_round_trip() {
    let stub = StubRpcLogger::start().await;
    let sink = RpcLogSink::new(stub.address(), Duration::from_secs(2));
    let entry = LogPayload {
        name: "event".to_string(),
        data: "Some kind of RPC data".to_string(),
    };

    let envelope = sink.write_log(&entry).await.unwrap();

    assert!(!envelope.error);
    assert_eq!(envelope.message, "Processed payload via RPC: event");
    assert_eq!(envelope.data, None);

    let received = stub.received().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].name, entry.name);
    assert_eq!(received[0].data, entry.data);
}

#[tokio::test]
async fn test_each_call_dials_its_own_connection() {
    let stub = StubRpcLogger::start().await;
    let sink = RpcLogSink::new(stub.address(), Duration::from_secs(2));
    let entry = LogPayload {
        name: "event".to_string(),
        data: "twice".to_string(),
    };

    sink.write_log(&entry).await.unwrap();
    sink.write_log(&entry).await.unwrap();

    assert_eq!(stub.received().await.len(), 2);
    assert_eq!(stub.connections(), 2);
}
