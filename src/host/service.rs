// Hosting session: one task owning the relay link, the registry and the engine

use anyhow::Result;
use std::future::Future;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::registry::HostRegistry;
use crate::config::Config;
use crate::game::{RoomEngine, RoomEvent};
use crate::network::directory;
use crate::network::peer_driver::{spawn_peer, NoticeKind, PeerNotice, PeerSettings};
use crate::network::protocol::SessionDescription;
use crate::network::relay::{RelayChannel, RelayEvent, Role};
use crate::network::signaling::{Signal, SignalingExchange};

pub struct GameHost {
    relay: RelayChannel,
    relay_events: mpsc::UnboundedReceiver<RelayEvent>,
    signaling: SignalingExchange,
    registry: HostRegistry,
    engine: RoomEngine,
    peer_settings: PeerSettings,
    notices_tx: mpsc::UnboundedSender<PeerNotice>,
    notices_rx: mpsc::UnboundedReceiver<PeerNotice>,
    config: Config,
}

impl GameHost {
    pub fn new(config: Config, host_username: String) -> Self {
        let server_id = uuid::Uuid::new_v4().to_string();
        let (relay, relay_events) =
            RelayChannel::new(&config.network, Role::Server, server_id.clone());
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        Self {
            signaling: SignalingExchange::new(relay.addressing().clone()),
            relay,
            relay_events,
            registry: HostRegistry::new(server_id, host_username),
            engine: RoomEngine::new(config.game.clone()),
            peer_settings: PeerSettings::from_config(&config.network),
            notices_tx,
            notices_rx,
            config,
        }
    }

    pub fn server_id(&self) -> &str {
        self.registry.server_id()
    }

    /// Serve until `shutdown` resolves
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        info!("Connecting to relay at {}", self.config.network.relay_url);
        tokio::select! {
            connected = self.relay.connect() => connected?,
            _ = &mut shutdown => return Ok(()),
        }
        info!("Hosting as server {}", self.server_id());

        let mut tick = tokio::time::interval(self.config.game.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let grace_deadline = self.engine.poll_timeout();

            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = self.relay_events.recv() => self.handle_relay_event(event),
                Some(notice) = self.notices_rx.recv() => self.handle_notice(notice),
                _ = tick.tick() => self.engine.tick(&mut self.registry),
                _ = sleep_until(grace_deadline) => self.engine.handle_timeout(Instant::now()),
            }

            self.log_room_changes();
        }

        info!("Shutting down host {}", self.server_id());
        self.registry.close_all();
        Ok(())
    }

    fn handle_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connected => info!("Relay link up"),
            RelayEvent::Disconnected => warn!("Relay link down, waiting for reconnect"),
            RelayEvent::Message(envelope) => {
                let registry = &self.registry;
                match directory::answer_discovery(&self.relay, &envelope, || registry.summary()) {
                    Ok(true) => return,
                    Ok(false) => {}
                    Err(e) => {
                        error!("Failed to answer discovery: {}", e);
                        return;
                    }
                }

                match self.signaling.handle(&envelope) {
                    Some(signal) => self.handle_signal(signal),
                    None => debug!("Ignoring relay payload {:?}", envelope.payload),
                }
            }
        }
    }

    /// Every offer gets a fresh acceptor, replacing any earlier one for that remote
    fn handle_signal(&mut self, signal: Signal) {
        let Signal { offer, remote_id } = signal;
        if !matches!(offer, SessionDescription::Offer { .. }) {
            debug!("Host ignoring non-offer description from {}", remote_id);
            return;
        }

        info!("Offer from {}, creating session", remote_id);
        let handle = spawn_peer(
            self.peer_settings.clone(),
            remote_id.clone(),
            false,
            self.notices_tx.clone(),
        );
        handle.signal(&remote_id, offer);

        let events = self.registry.attach_session(&remote_id, handle);
        self.apply(events);
    }

    fn handle_notice(&mut self, notice: PeerNotice) {
        match notice.kind {
            NoticeKind::Signal(description) => {
                if let Err(e) =
                    self.signaling
                        .signal_offer(&self.relay, description, &notice.remote_id)
                {
                    error!("Failed to signal {}: {}", notice.remote_id, e);
                }
            }
            NoticeKind::Event(event) => {
                let events = self.registry.handle_peer_event(&notice.session, event);
                self.apply(events);
            }
        }
    }

    fn apply(&mut self, events: Vec<RoomEvent>) {
        let now = Instant::now();
        for event in events {
            self.engine.handle(event, now, &mut self.registry);
        }
    }

    fn log_room_changes(&mut self) {
        if !self.engine.take_rooms_changed() {
            return;
        }
        let rooms = self.engine.room_summaries();
        if rooms.is_empty() {
            info!("No open rooms");
            return;
        }
        for room in rooms {
            info!("Room {}: {} players", room.room_id, room.num_players);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
