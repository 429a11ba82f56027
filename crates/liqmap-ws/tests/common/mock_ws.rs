//! Mock liquidation stream for integration tests.
//!
//! Accepts connections, records every text frame the client sends,
//! acknowledges subscribe commands, then plays back a scripted set of frames.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// What the server does with each accepted connection.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Sent in order once the subscribe command has been acknowledged.
    pub frames: Vec<String>,
    /// Leave application pings unanswered.
    pub ignore_pings: bool,
    /// Close right after the handshake, before reading anything.
    pub close_immediately: bool,
}

pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0u32));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            script.clone(),
                            messages_clone.clone(),
                            connections_clone.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            messages,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    script: Script,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    *connections.lock().await += 1;

    let (mut write, mut read) = ws_stream.split();

    if script.close_immediately {
        let _ = write.send(Message::Close(None)).await;
        return;
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                messages.lock().await.push(text.clone());

                let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) else {
                    continue;
                };
                match parsed.get("op").and_then(|op| op.as_str()) {
                    Some("subscribe") => {
                        let ack = serde_json::json!({
                            "success": true,
                            "ret_msg": "",
                            "conn_id": "mock",
                            "req_id": parsed.get("req_id").cloned().unwrap_or_default(),
                            "op": "subscribe"
                        });
                        let _ = write.send(Message::Text(ack.to_string())).await;

                        for frame in &script.frames {
                            let _ = write.send(Message::Text(frame.clone())).await;
                        }
                    }
                    Some("ping") if !script.ignore_pings => {
                        let pong = serde_json::json!({
                            "success": true,
                            "ret_msg": "pong",
                            "conn_id": "mock",
                            "op": "ping"
                        });
                        let _ = write.send(Message::Text(pong.to_string())).await;
                    }
                    _ => {}
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}
