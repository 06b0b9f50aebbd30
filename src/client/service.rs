// Client counterpart of the host: discovery, one peer session to a host,
// and the game commands sent over it. Server traffic comes back as ClientEvents.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::game::Room;
use crate::network::directory::DirectoryCollector;
use crate::network::peer::PeerEvent;
use crate::network::peer_driver::{spawn_peer, NoticeKind, PeerHandle, PeerNotice, PeerSettings};
use crate::network::protocol::{
    ClientId, ClientMessage, GridPoint, RelayPayload, RoomId, ServerId, ServerMessage,
    ServerSummary, ZombieId,
};
use crate::network::relay::{RelayChannel, RelayEvent, Role};
use crate::network::signaling::SignalingExchange;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not started")]
    NotStarted,

    #[error("already joined a room, leave it first")]
    AlreadyJoined,

    #[error("not joined to any room")]
    NotJoined,

    #[error("data channel to the server is not open yet")]
    NotConnected,

    #[error("relay error: {0}")]
    Relay(String),
}

/// What the game UI gets told
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ConnectionSuccess,
    ConnectionError(String),
    ServerDiscovered(ServerSummary),
    OtherUserJoined {
        client_id: ClientId,
        username: String,
    },
    OtherUserLeft {
        client_id: ClientId,
    },
    MapChanged(Room),
    UserShot {
        shooter_client_id: ClientId,
        point: GridPoint,
        zombie_id: Option<ZombieId>,
        is_killed: Option<bool>,
    },
    GameOver {
        reason: String,
    },
}

/// The one peer session a client holds
struct HostSession {
    handle: PeerHandle,
    server_id: ServerId,
    room_id: RoomId,
    /// Data channel open; set by `Connect`, cleared by a link error
    connected: bool,
}

pub struct GameClient {
    client_id: ClientId,
    username: String,
    arrow_damage: i32,
    discovery_window: Duration,
    relay: RelayChannel,
    relay_events: mpsc::UnboundedReceiver<RelayEvent>,
    signaling: SignalingExchange,
    directory: DirectoryCollector,
    peer_settings: PeerSettings,
    notices_tx: mpsc::UnboundedSender<PeerNotice>,
    notices_rx: mpsc::UnboundedReceiver<PeerNotice>,
    session: Option<HostSession>,
    started: bool,
    events: VecDeque<ClientEvent>,
}

impl GameClient {
    pub fn new(config: &Config, username: String) -> Self {
        let client_id = uuid::Uuid::new_v4().to_string();
        let (relay, relay_events) =
            RelayChannel::new(&config.network, Role::Client, client_id.clone());
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        Self {
            signaling: SignalingExchange::new(relay.addressing().clone()),
            client_id,
            username,
            arrow_damage: config.game.arrow_damage,
            discovery_window: config.network.discovery_window(),
            relay,
            relay_events,
            directory: DirectoryCollector::new(),
            peer_settings: PeerSettings::from_config(&config.network),
            notices_tx,
            notices_rx,
            session: None,
            started: false,
            events: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[cfg(test)]
    pub fn room_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.room_id.as_str())
    }

    /// Connect to the relay; later calls return at once
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if self.started {
            return Ok(());
        }
        self.relay
            .connect()
            .await
            .map_err(|e| ClientError::Relay(e.to_string()))?;
        self.started = true;
        info!("Client {} connected to relay", self.client_id);
        Ok(())
    }

    /// Broadcast a discovery request and collect answers for the discovery window
    pub async fn discover_servers(
        &mut self,
    ) -> Result<HashMap<ServerId, ServerSummary>, ClientError> {
        if !self.started {
            return Err(ClientError::NotStarted);
        }

        self.directory.begin();
        self.relay
            .send_message(RelayPayload::DiscoveryRequest, None)
            .map_err(|e| ClientError::Relay(e.to_string()))?;

        let window = tokio::time::sleep(self.discovery_window);
        tokio::pin!(window);
        loop {
            tokio::select! {
                _ = &mut window => break,
                Some(event) = self.relay_events.recv() => self.handle_relay_event(event),
                Some(notice) = self.notices_rx.recv() => self.handle_notice(notice),
            }
        }

        let servers = self.directory.finish();
        debug!("Discovery found {} servers", servers.len());
        Ok(servers)
    }

    /// Open a peer session to `server_id`; the join is sent once the channel opens
    pub fn join_room(&mut self, server_id: &str, room_id: &str) -> Result<(), ClientError> {
        if !self.started {
            return Err(ClientError::NotStarted);
        }
        if self.session.is_some() {
            return Err(ClientError::AlreadyJoined);
        }

        info!("Joining room {} on server {}", room_id, server_id);
        let handle = spawn_peer(
            self.peer_settings.clone(),
            server_id.to_string(),
            true,
            self.notices_tx.clone(),
        );
        self.session = Some(HostSession {
            handle,
            server_id: server_id.to_string(),
            room_id: room_id.to_string(),
            connected: false,
        });
        Ok(())
    }

    /// Join a room nobody is in yet; returns its id
    pub fn join_new_room(&mut self, server_id: &str) -> Result<RoomId, ClientError> {
        let room_id = uuid::Uuid::new_v4().to_string();
        self.join_room(server_id, &room_id)?;
        Ok(room_id)
    }

    /// Tell the host when the channel is up, then tear the session down
    pub fn leave_room(&mut self) -> Result<(), ClientError> {
        let session = self.session.take().ok_or(ClientError::NotJoined)?;
        if session.connected {
            self.send(
                &session,
                &ClientMessage::LeaveRoom {
                    client_id: self.client_id.clone(),
                },
            );
        }
        session.handle.close();
        info!("Left room {}", session.room_id);
        Ok(())
    }

    pub fn start_game(&mut self) -> Result<(), ClientError> {
        let session = self.connected_session()?;
        self.send(
            session,
            &ClientMessage::StartGame {
                client_id: self.client_id.clone(),
            },
        );
        Ok(())
    }

    /// Fire one arrow; the room and name ride along so the host can re-register us
    pub fn shoot(&mut self, point: GridPoint) -> Result<(), ClientError> {
        let session = self.connected_session()?;
        self.send(
            session,
            &ClientMessage::Shoot {
                client_id: self.client_id.clone(),
                point,
                damage: self.arrow_damage,
                room_id: Some(session.room_id.clone()),
                username: Some(self.username.clone()),
            },
        );
        Ok(())
    }

    /// Next event for the UI, pumping relay and peer traffic as needed.
    /// `None` once every source is gone.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            tokio::select! {
                event = self.relay_events.recv() => match event {
                    Some(event) => self.handle_relay_event(event),
                    None => return None,
                },
                Some(notice) = self.notices_rx.recv() => self.handle_notice(notice),
            }
        }
    }

    fn connected_session(&self) -> Result<&HostSession, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NotJoined)?;
        if !session.connected {
            return Err(ClientError::NotConnected);
        }
        Ok(session)
    }

    fn send(&self, session: &HostSession, message: &ClientMessage) {
        if let Err(e) = session.handle.send_message(message) {
            warn!("Failed to send to server {}: {}", session.server_id, e);
        }
    }

    fn handle_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connected => self.events.push_back(ClientEvent::ConnectionSuccess),
            RelayEvent::Disconnected => self
                .events
                .push_back(ClientEvent::ConnectionError("relay link lost".to_string())),
            RelayEvent::Message(envelope) => {
                if let Some(summary) = self.directory.handle(&envelope) {
                    self.events.push_back(ClientEvent::ServerDiscovered(summary));
                    return;
                }
                let Some(signal) = self.signaling.handle(&envelope) else {
                    return;
                };
                match &self.session {
                    Some(session) if session.server_id == signal.remote_id => {
                        session.handle.signal(&signal.remote_id, signal.offer);
                    }
                    _ => debug!("Ignoring signal from {}", signal.remote_id),
                }
            }
        }
    }

    fn handle_notice(&mut self, notice: PeerNotice) {
        let current = self
            .session
            .as_ref()
            .map_or(false, |s| s.handle.key() == notice.session);
        if !current {
            debug!("Ignoring notice from old session {}", notice.session);
            return;
        }

        match notice.kind {
            NoticeKind::Signal(description) => {
                if let Err(e) =
                    self.signaling
                        .signal_offer(&self.relay, description, &notice.remote_id)
                {
                    warn!("Failed to signal {}: {}", notice.remote_id, e);
                }
            }
            NoticeKind::Event(PeerEvent::Connect) => {
                // A rebuilt session rejoins the same room
                if let Some(session) = self.session.as_mut() {
                    session.connected = true;
                }
                if let Some(session) = self.session.as_ref() {
                    self.send(
                        session,
                        &ClientMessage::JoinRoom {
                            client_id: self.client_id.clone(),
                            room_id: Some(session.room_id.clone()),
                            username: self.username.clone(),
                        },
                    );
                }
                self.events.push_back(ClientEvent::ConnectionSuccess);
            }
            NoticeKind::Event(PeerEvent::Message(value)) => {
                match serde_json::from_value::<ServerMessage>(value) {
                    Ok(message) => self.handle_server_message(message),
                    Err(e) => warn!("Ignoring server message: {}", e),
                }
            }
            NoticeKind::Event(PeerEvent::Error(reason)) => {
                if let Some(session) = self.session.as_mut() {
                    session.connected = false;
                }
                self.events.push_back(ClientEvent::ConnectionError(reason));
            }
            NoticeKind::Event(PeerEvent::Close) => {
                self.session = None;
                self.events
                    .push_back(ClientEvent::ConnectionError("session closed".to_string()));
            }
        }
    }

    fn handle_server_message(&mut self, message: ServerMessage) {
        let event = match message {
            ServerMessage::UserJoined {
                joined_client_id,
                joined_username,
            } => ClientEvent::OtherUserJoined {
                client_id: joined_client_id,
                username: joined_username,
            },
            ServerMessage::UserLeft { left_client_id } => ClientEvent::OtherUserLeft {
                client_id: left_client_id,
            },
            ServerMessage::ReportMap { map } => ClientEvent::MapChanged(map),
            ServerMessage::UserShot {
                shooter_client_id,
                point,
                zombie_id,
                is_killed,
            } => ClientEvent::UserShot {
                shooter_client_id,
                point,
                zombie_id,
                is_killed,
            },
            ServerMessage::GameOver { reason } => {
                // The host already dropped us
                if let Some(session) = self.session.take() {
                    session.handle.close();
                }
                ClientEvent::GameOver { reason }
            }
        };
        self.events.push_back(event);
    }
}
