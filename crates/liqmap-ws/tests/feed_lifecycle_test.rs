//! Feed connection lifecycle against a local mock stream.

mod common;
use common::mock_ws::{MockWsServer, Script};

use liqmap_core::{LiquidationEvent, Side};
use liqmap_ws::{ConnectionState, FeedConfig, FeedConnection};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn config_for(server: &MockWsServer, symbols: &[&str]) -> FeedConfig {
    FeedConfig {
        url: server.url(),
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        reconnect_delay_ms: 50,
        ..Default::default()
    }
}

fn liquidation_frame(symbol: &str, entries: &[(i64, &str, &str, &str)]) -> String {
    let data: Vec<_> = entries
        .iter()
        .map(|(t, side, size, price)| {
            serde_json::json!({"T": t, "s": symbol, "S": side, "v": size, "p": price})
        })
        .collect();
    serde_json::json!({
        "topic": format!("allLiquidation.{symbol}"),
        "type": "snapshot",
        "ts": 1,
        "data": data,
    })
    .to_string()
}

async fn wait_for_state(conn: &FeedConnection, state: ConnectionState) {
    let mut rx = conn.subscribe_state();
    timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .expect("state should be reached within timeout")
        .unwrap();
}

async fn recv_events(
    rx: &mut mpsc::Receiver<Vec<LiquidationEvent>>,
    want: usize,
) -> Vec<LiquidationEvent> {
    let mut out = Vec::new();
    while out.len() < want {
        let batch = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("events should arrive within timeout")
            .expect("channel open");
        out.extend(batch);
    }
    out
}

#[tokio::test]
async fn test_subscribes_once_to_every_symbol() {
    let server = MockWsServer::start(Script::default()).await;
    let (tx, _rx) = mpsc::channel(16);
    let conn = Arc::new(FeedConnection::new(
        config_for(&server, &["BTCUSDT", "ETHUSDT"]),
        tx,
    ));

    let handle = conn.start().unwrap();
    wait_for_state(&conn, ConnectionState::Subscribed).await;

    let sent = timeout(Duration::from_secs(2), async {
        loop {
            let msgs = server.received_messages().await;
            if !msgs.is_empty() {
                return msgs;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    let subscribe: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(subscribe["op"], "subscribe");
    assert_eq!(
        subscribe["args"],
        serde_json::json!(["allLiquidation.BTCUSDT", "allLiquidation.ETHUSDT"])
    );

    conn.stop();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_delivers_events_in_arrival_order() {
    let script = Script {
        frames: vec![
            liquidation_frame(
                "BTCUSDT",
                &[(1000, "Buy", "0.5", "65000"), (1001, "Sell", "1", "64995")],
            ),
            liquidation_frame("ETHUSDT", &[(1002, "Sell", "3", "3100.5")]),
        ],
        ..Default::default()
    };
    let server = MockWsServer::start(script).await;
    let (tx, mut rx) = mpsc::channel(16);
    let conn = Arc::new(FeedConnection::new(
        config_for(&server, &["BTCUSDT", "ETHUSDT"]),
        tx,
    ));

    let handle = conn.start().unwrap();
    let events = recv_events(&mut rx, 3).await;

    let times: Vec<i64> = events.iter().map(|e| e.event_time_ms).collect();
    assert_eq!(times, vec![1000, 1001, 1002]);
    assert_eq!(events[0].side, Side::Buy);
    assert_eq!(events[1].size.inner(), dec!(1));
    assert_eq!(events[2].symbol, "ETHUSDT");
    assert_eq!(events[2].price.inner(), dec!(3100.5));

    conn.stop();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frames_do_not_end_session() {
    let script = Script {
        frames: vec![
            "{garbage".to_string(),
            r#"{"topic":"allLiquidation.BTCUSDT","data":[{"T":5,"s":"BTCUSDT","S":"Up","v":"1","p":"1"}]}"#
                .to_string(),
            liquidation_frame("BTCUSDT", &[(2000, "Buy", "2", "100")]),
        ],
        ..Default::default()
    };
    let server = MockWsServer::start(script).await;
    let (tx, mut rx) = mpsc::channel(16);
    let conn = Arc::new(FeedConnection::new(config_for(&server, &["BTCUSDT"]), tx));

    let handle = conn.start().unwrap();
    let events = recv_events(&mut rx, 1).await;
    assert_eq!(events[0].event_time_ms, 2000);

    let stats = conn.stats();
    assert_eq!(stats.malformed_messages, 1);
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.sessions, 1);
    assert_eq!(conn.state(), ConnectionState::Subscribed);

    conn.stop();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let server = MockWsServer::start(Script {
        close_immediately: true,
        ..Default::default()
    })
    .await;
    let (tx, _rx) = mpsc::channel(16);
    let conn = Arc::new(FeedConnection::new(config_for(&server, &["BTCUSDT"]), tx));

    let handle = conn.start().unwrap();

    let reconnected = timeout(Duration::from_secs(3), async {
        while server.connection_count().await < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "should keep reconnecting after closes");

    conn.stop();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    let after_stop = server.connection_count().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connection_count().await, after_stop);

    server.shutdown().await;
}

#[tokio::test]
async fn test_unanswered_ping_forces_reconnect() {
    let server = MockWsServer::start(Script {
        ignore_pings: true,
        ..Default::default()
    })
    .await;
    let (tx, _rx) = mpsc::channel(16);
    let config = FeedConfig {
        heartbeat_interval_ms: 100,
        heartbeat_timeout_ms: 100,
        ..config_for(&server, &["BTCUSDT"])
    };
    let conn = Arc::new(FeedConnection::new(config, tx));

    let handle = conn.start().unwrap();

    let reconnected = timeout(Duration::from_secs(3), async {
        while server.connection_count().await < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "silent peer should trigger a reconnect");

    let pings = server
        .received_messages()
        .await
        .iter()
        .filter(|m| m.contains(r#""op":"ping""#))
        .count();
    assert!(pings >= 1);
    assert!(conn.stats().sessions >= 1);

    conn.stop();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_stop_while_subscribed_closes_transport() {
    let server = MockWsServer::start(Script::default()).await;
    let (tx, _rx) = mpsc::channel(16);
    let conn = Arc::new(FeedConnection::new(config_for(&server, &["BTCUSDT"]), tx));

    let handle = conn.start().unwrap();
    wait_for_state(&conn, ConnectionState::Subscribed).await;

    conn.stop();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(server.connection_count().await, 1);
    assert!(conn.start().is_none());

    server.shutdown().await;
}
