// Archers relay server
// Fans every text frame out to all other accepted connections; endpoints do the routing
//
// Usage: cargo run --bin relay [bind-addr]

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

type ConnectionId = u64;
type Connections = Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>>;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// First frame every endpoint sends
#[derive(Debug, Deserialize)]
struct Hello {
    guid: String,
}

#[derive(Debug, Serialize)]
struct Accepted {
    accepted: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("Relay listening on {}", addr);

    serve(listener, Arc::new(RwLock::new(HashMap::new()))).await;
    Ok(())
}

async fn serve(listener: TcpListener, connections: Connections) {
    while let Ok((stream, addr)) = listener.accept().await {
        tokio::spawn(handle_connection(stream, addr, connections.clone()));
    }
}

/// Parse a handshake frame; `None` unless it carries a non-empty guid
fn parse_hello(text: &str) -> Option<String> {
    serde_json::from_str::<Hello>(text)
        .ok()
        .map(|hello| hello.guid)
        .filter(|guid| !guid.is_empty())
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, connections: Connections) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Nothing is relayed until the endpoint identified itself
    let guid = loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => match parse_hello(&text) {
                Some(guid) => break guid,
                None => {
                    warn!("Rejecting {}: expected a guid hello", addr);
                    let _ = ws_sender.close().await;
                    return;
                }
            },
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!("Error receiving hello from {}: {}", addr, e);
                return;
            }
        }
    };

    let accepted = match serde_json::to_string(&Accepted { accepted: true }) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to encode handshake reply: {}", e);
            return;
        }
    };
    if ws_sender.send(Message::Text(accepted)).await.is_err() {
        return;
    }

    let id = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::unbounded_channel();
    connections.write().await.insert(id, tx);
    info!("Connection {} from {} accepted (guid {})", id, addr, guid);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => broadcast(&connections, id, text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Error receiving from connection {}: {}", id, e);
                break;
            }
        }
    }

    connections.write().await.remove(&id);
    info!("Connection {} closed", id);
    send_task.abort();
}

async fn broadcast(connections: &Connections, from: ConnectionId, text: String) {
    let connections = connections.read().await;
    debug!(
        "Relaying {} bytes from {} to {} peers",
        text.len(),
        from,
        connections.len().saturating_sub(1)
    );
    for (id, tx) in connections.iter() {
        if *id == from {
            continue;
        }
        if tx.send(Message::Text(text.clone())).is_err() {
            warn!("Connection {} is gone, skipping", id);
        }
    }
}
