// Reconnecting duplex channel to the shared WebSocket relay
// Endpoints are addressed by a self-chosen id; the relay itself only fans frames out

use anyhow::{anyhow, bail, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::protocol::{Envelope, RelayAccepted, RelayHello, RelayPayload};
use crate::config::NetworkConfig;

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Which side of the game an endpoint plays; decides which envelope field is "mine"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Asymmetric envelope addressing for one endpoint
#[derive(Debug, Clone)]
pub struct Addressing {
    pub local_id: String,
    pub role: Role,
}

impl Addressing {
    pub fn new(local_id: String, role: Role) -> Self {
        Self { local_id, role }
    }

    /// Stamp our id into our role's field and the recipient (if any) into the other
    pub fn address(&self, payload: RelayPayload, remote_id: Option<&str>) -> Envelope {
        let local = Some(self.local_id.clone());
        let remote = remote_id.map(str::to_string);
        match self.role {
            Role::Client => Envelope {
                client_id: local,
                server_id: remote,
                payload,
            },
            Role::Server => Envelope {
                client_id: remote,
                server_id: local,
                payload,
            },
        }
    }

    /// Addressed to us, or a broadcast
    pub fn accepts(&self, envelope: &Envelope) -> bool {
        match self.mine(envelope) {
            Some(id) => id == self.local_id,
            None => true,
        }
    }

    /// Id of the endpoint that sent the envelope
    pub fn sender<'a>(&self, envelope: &'a Envelope) -> Option<&'a str> {
        match self.role {
            Role::Client => envelope.server_id.as_deref(),
            Role::Server => envelope.client_id.as_deref(),
        }
    }

    fn mine<'a>(&self, envelope: &'a Envelope) -> Option<&'a str> {
        match self.role {
            Role::Client => envelope.client_id.as_deref(),
            Role::Server => envelope.server_id.as_deref(),
        }
    }
}

/// Link state changes and inbound traffic
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Connected,
    Disconnected,
    Message(Envelope),
}

/// Holds back outbound frames while the link is down.
/// Only the most recent unsent frame survives.
#[derive(Debug, Default)]
pub struct Outbox {
    ready: bool,
    pending: Option<String>,
}

impl Outbox {
    /// Returns the frame if it can go out right away, otherwise keeps it
    pub fn submit(&mut self, frame: String) -> Option<String> {
        if self.ready {
            Some(frame)
        } else {
            self.pending = Some(frame);
            None
        }
    }

    /// Put back a frame whose write failed
    pub fn retain(&mut self, frame: String) {
        self.ready = false;
        self.pending = Some(frame);
    }

    /// Link accepted; hands out the frame to replay, if any
    pub fn on_ready(&mut self) -> Option<String> {
        self.ready = true;
        self.pending.take()
    }

    pub fn on_lost(&mut self) {
        self.ready = false;
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

#[derive(Debug, Clone)]
struct LinkSettings {
    url: String,
    guid: String,
    reconnect: Duration,
}

/// Parts moved into the link task on the first `connect`
struct LinkParts {
    outbound_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<RelayEvent>,
    ready_tx: watch::Sender<bool>,
}

/// Handle to the relay link. Inbound traffic arrives on the receiver
/// returned by [`RelayChannel::new`].
pub struct RelayChannel {
    addressing: Addressing,
    settings: LinkSettings,
    outbound_tx: mpsc::UnboundedSender<String>,
    ready_rx: watch::Receiver<bool>,
    link: Option<LinkParts>,
}

impl RelayChannel {
    pub fn new(
        config: &NetworkConfig,
        role: Role,
        local_id: String,
    ) -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(false);

        let guid = match role {
            Role::Client => config.client_guid.clone(),
            Role::Server => config.server_guid.clone(),
        };

        let channel = Self {
            addressing: Addressing::new(local_id, role),
            settings: LinkSettings {
                url: config.relay_url.clone(),
                guid,
                reconnect: config.relay_reconnect_interval(),
            },
            outbound_tx,
            ready_rx,
            link: Some(LinkParts {
                outbound_rx,
                events_tx,
                ready_tx,
            }),
        };
        (channel, events_rx)
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Start the background link on first use and wait until the relay
    /// accepted our handshake
    pub async fn connect(&mut self) -> Result<()> {
        if let Some(parts) = self.link.take() {
            let settings = self.settings.clone();
            let addressing = self.addressing.clone();
            tokio::spawn(run_link(settings, addressing, parts));
        }

        let mut ready_rx = self.ready_rx.clone();
        ready_rx
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| anyhow!("relay link stopped"))?;
        Ok(())
    }

    /// Address and queue a payload; `None` broadcasts
    pub fn send_message(&self, payload: RelayPayload, remote_id: Option<&str>) -> Result<()> {
        let envelope = self.addressing.address(payload, remote_id);
        let frame = envelope.to_json()?;
        self.outbound_tx
            .send(frame)
            .map_err(|_| anyhow!("relay link stopped"))
    }
}

/// Why a connected link ended
enum LinkEnd {
    Shutdown,
    Lost(anyhow::Error),
}

async fn run_link(settings: LinkSettings, addressing: Addressing, parts: LinkParts) {
    let LinkParts {
        mut outbound_rx,
        events_tx,
        ready_tx,
    } = parts;
    let mut outbox = Outbox::default();

    loop {
        match open_link(&settings).await {
            Ok(ws) => {
                info!("Relay accepted {} at {}", addressing.local_id, settings.url);

                // Anything queued while we were down collapses to the latest frame
                while let Ok(frame) = outbound_rx.try_recv() {
                    outbox.submit(frame);
                }

                ready_tx.send_replace(true);
                let _ = events_tx.send(RelayEvent::Connected);

                let end = pump(ws, &addressing, &mut outbox, &mut outbound_rx, &events_tx).await;

                outbox.on_lost();
                ready_tx.send_replace(false);
                let _ = events_tx.send(RelayEvent::Disconnected);

                match end {
                    LinkEnd::Shutdown => {
                        debug!("Relay link for {} shut down", addressing.local_id);
                        return;
                    }
                    LinkEnd::Lost(e) => error!("Relay link lost: {}", e),
                }
            }
            Err(e) => {
                warn!("Failed to reach relay at {}: {}", settings.url, e);
                let _ = events_tx.send(RelayEvent::Disconnected);
            }
        }

        info!("Reconnecting to relay in {:?}", settings.reconnect);
        let sleep = tokio::time::sleep(settings.reconnect);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => {
                        outbox.submit(frame);
                    }
                    None => return,
                },
            }
        }
    }
}

/// Open the socket and run the guid handshake
async fn open_link(settings: &LinkSettings) -> Result<RelayStream> {
    let (mut ws, _) = connect_async(settings.url.as_str()).await?;

    let hello = RelayHello {
        guid: settings.guid.clone(),
    };
    ws.send(Message::Text(serde_json::to_string(&hello)?)).await?;

    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let reply: RelayAccepted = serde_json::from_str(&text)?;
                if reply.accepted {
                    return Ok(ws);
                }
                bail!("relay rejected the handshake");
            }
            Some(Ok(Message::Close(_))) | None => bail!("relay closed during handshake"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn pump(
    ws: RelayStream,
    addressing: &Addressing,
    outbox: &mut Outbox,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    events_tx: &mpsc::UnboundedSender<RelayEvent>,
) -> LinkEnd {
    let (mut sink, mut stream) = ws.split();

    if let Some(frame) = outbox.on_ready() {
        debug!("Replaying held relay frame");
        if let Err(e) = sink.send(Message::Text(frame.clone())).await {
            outbox.retain(frame);
            return LinkEnd::Lost(e.into());
        }
    }

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    if let Some(frame) = outbox.submit(frame) {
                        if let Err(e) = sink.send(Message::Text(frame.clone())).await {
                            outbox.retain(frame);
                            return LinkEnd::Lost(e.into());
                        }
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return LinkEnd::Shutdown;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => match Envelope::from_json(&text) {
                    Ok(envelope) => {
                        if addressing.accepts(&envelope) {
                            let _ = events_tx.send(RelayEvent::Message(envelope));
                        }
                    }
                    Err(e) => debug!("Ignoring relay frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return LinkEnd::Lost(anyhow!("relay closed the connection"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return LinkEnd::Lost(e.into()),
            },
        }
    }
}
