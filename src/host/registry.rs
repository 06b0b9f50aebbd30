// Host-side bookkeeping of client peer sessions and their room membership
// Dispatches data-channel messages into room events and fans engine reports out

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::game::{GameReporter, Room, RoomEvent};
use crate::network::peer::PeerEvent;
use crate::network::peer_driver::PeerHandle;
use crate::network::protocol::{
    ClientId, ClientMessage, GridPoint, RoomId, RoomSummary, ServerMessage, ServerSummary,
    ZombieId,
};

const GAME_OVER_REASON: &str = "The zombies broke through";

/// Registered client: its room and the session it talks through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub room_id: RoomId,
    pub username: String,
    pub session: String,
}

/// clientId → connection, at most one entry per client
#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: HashMap<ClientId, Connection>,
}

impl ConnectionTable {
    pub fn get(&self, client_id: &str) -> Option<&Connection> {
        self.entries.get(client_id)
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.entries.contains_key(client_id)
    }

    pub fn insert(&mut self, client_id: ClientId, connection: Connection) {
        self.entries.insert(client_id, connection);
    }

    pub fn remove(&mut self, client_id: &str) -> Option<Connection> {
        self.entries.remove(client_id)
    }

    /// Members of a room, sorted for stable fan-out
    pub fn clients_in(&self, room_id: &str) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self
            .entries
            .iter()
            .filter(|(_, c)| c.room_id == room_id)
            .map(|(id, _)| id.clone())
            .collect();
        clients.sort();
        clients
    }

    /// Clients currently registered through a session
    pub fn clients_on(&self, session: &str) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self
            .entries
            .iter()
            .filter(|(_, c)| c.session == session)
            .map(|(id, _)| id.clone())
            .collect();
        clients.sort();
        clients
    }

    pub fn room_counts(&self) -> BTreeMap<RoomId, usize> {
        let mut counts = BTreeMap::new();
        for connection in self.entries.values() {
            *counts.entry(connection.room_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct HostRegistry {
    server_id: String,
    host_username: String,
    connections: ConnectionTable,
    /// session key → driver handle
    sessions: HashMap<String, PeerHandle>,
    /// remote endpoint id → session key of its current acceptor
    remotes: HashMap<String, String>,
}

impl HostRegistry {
    pub fn new(server_id: String, host_username: String) -> Self {
        Self {
            server_id,
            host_username,
            connections: ConnectionTable::default(),
            sessions: HashMap::new(),
            remotes: HashMap::new(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    #[cfg(test)]
    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    #[cfg(test)]
    pub fn session_for_remote(&self, remote_id: &str) -> Option<&PeerHandle> {
        self.remotes
            .get(remote_id)
            .and_then(|key| self.sessions.get(key))
    }

    /// Install the acceptor for a remote. An existing one is closed first
    /// and its clients are disconnected.
    pub fn attach_session(&mut self, remote_id: &str, handle: PeerHandle) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        if let Some(old_key) = self.remotes.remove(remote_id) {
            info!("Remote {} re-offered, replacing session {}", remote_id, old_key);
            if let Some(old) = self.sessions.remove(&old_key) {
                old.close();
            }
            events = self.disconnect_session(&old_key);
        }

        debug!("Session {} attached for remote {}", handle.key(), remote_id);
        self.remotes.insert(remote_id.to_string(), handle.key().to_string());
        self.sessions.insert(handle.key().to_string(), handle);
        events
    }

    /// Dispatch one event from a session's driver
    pub fn handle_peer_event(&mut self, session: &str, event: PeerEvent) -> Vec<RoomEvent> {
        if !self.sessions.contains_key(session) {
            debug!("Ignoring event from stale session {}", session);
            return Vec::new();
        }

        match event {
            PeerEvent::Connect => {
                info!("Session {} connected", session);
                Vec::new()
            }
            PeerEvent::Message(value) => match serde_json::from_value::<ClientMessage>(value) {
                Ok(message) => self.handle_message(session, message),
                Err(e) => {
                    warn!("Ignoring message from session {}: {}", session, e);
                    Vec::new()
                }
            },
            PeerEvent::Error(reason) => {
                warn!("Session {} failed: {}", session, reason);
                self.drop_session(session)
            }
            PeerEvent::Close => {
                info!("Session {} closed", session);
                self.drop_session(session)
            }
        }
    }

    fn handle_message(&mut self, session: &str, message: ClientMessage) -> Vec<RoomEvent> {
        match message {
            ClientMessage::JoinRoom {
                client_id,
                room_id,
                username,
            } => self.join(session, client_id, room_id, username),
            ClientMessage::LeaveRoom { client_id } => {
                match self.connections.get(&client_id) {
                    Some(connection) if connection.session == session => {
                        self.disconnect_client(&client_id).into_iter().collect()
                    }
                    _ => {
                        warn!("Client {} left without being registered here", client_id);
                        Vec::new()
                    }
                }
            }
            ClientMessage::StartGame { client_id } => {
                vec![RoomEvent::StartRequested { client_id }]
            }
            ClientMessage::Shoot {
                client_id,
                point,
                damage,
                room_id,
                username,
            } => {
                let mut events = Vec::new();
                if !self.connections.contains(&client_id) {
                    // Best effort: the client believes it is still in a room
                    info!("Re-registering shooter {}", client_id);
                    let username = username.unwrap_or_else(|| client_id.clone());
                    events = self.join(session, client_id.clone(), room_id, username);
                }
                events.push(RoomEvent::Shot {
                    client_id,
                    damage,
                    point,
                });
                events
            }
        }
    }

    fn join(
        &mut self,
        session: &str,
        client_id: ClientId,
        room_id: Option<RoomId>,
        username: String,
    ) -> Vec<RoomEvent> {
        if self.connections.contains(&client_id) {
            warn!("Client {} is already registered, rejecting join", client_id);
            return Vec::new();
        }

        let room_id = room_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        info!("Client {} ({}) joining room {}", client_id, username, room_id);

        for member in self.connections.clients_in(&room_id) {
            self.send_to(
                &member,
                &ServerMessage::UserJoined {
                    joined_client_id: client_id.clone(),
                    joined_username: username.clone(),
                },
            );
        }

        self.connections.insert(
            client_id.clone(),
            Connection {
                room_id: room_id.clone(),
                username: username.clone(),
                session: session.to_string(),
            },
        );

        vec![RoomEvent::Joined {
            client_id,
            username,
            room_id,
        }]
    }

    /// Forget a session and disconnect every client registered through it
    fn drop_session(&mut self, session: &str) -> Vec<RoomEvent> {
        self.sessions.remove(session);
        self.remotes.retain(|_, key| key != session);
        self.disconnect_session(session)
    }

    fn disconnect_session(&mut self, session: &str) -> Vec<RoomEvent> {
        self.connections
            .clients_on(session)
            .into_iter()
            .filter_map(|client_id| self.disconnect_client(&client_id))
            .collect()
    }

    /// Remove the entry, then tell the rest of its room
    fn disconnect_client(&mut self, client_id: &str) -> Option<RoomEvent> {
        let connection = self.connections.remove(client_id)?;
        info!("Client {} left room {}", client_id, connection.room_id);

        for member in self.connections.clients_in(&connection.room_id) {
            self.send_to(
                &member,
                &ServerMessage::UserLeft {
                    left_client_id: client_id.to_string(),
                },
            );
        }

        Some(RoomEvent::Left {
            client_id: client_id.to_string(),
        })
    }

    fn send_to(&self, client_id: &str, message: &ServerMessage) {
        let Some(handle) = self
            .connections
            .get(client_id)
            .and_then(|c| self.sessions.get(&c.session))
        else {
            debug!("No session for client {}, dropping message", client_id);
            return;
        };
        if let Err(e) = handle.send_message(message) {
            warn!("Failed to send to client {}: {}", client_id, e);
        }
    }

    /// What discovery advertises; counts come from live registrations
    pub fn summary(&self) -> ServerSummary {
        ServerSummary {
            server_id: self.server_id.clone(),
            host_username: self.host_username.clone(),
            rooms: self
                .connections
                .room_counts()
                .into_iter()
                .map(|(room_id, num_players)| RoomSummary {
                    room_id,
                    num_players,
                })
                .collect(),
        }
    }

    /// Close every session, for shutdown
    pub fn close_all(&mut self) {
        for handle in self.sessions.values() {
            handle.close();
        }
        self.sessions.clear();
        self.remotes.clear();
    }
}

impl GameReporter for HostRegistry {
    fn report_map(&mut self, room: &Room, client_id: &str) {
        self.send_to(client_id, &ServerMessage::ReportMap { map: room.clone() });
    }

    fn report_game_over(&mut self, client_id: &str) {
        self.send_to(
            client_id,
            &ServerMessage::GameOver {
                reason: GAME_OVER_REASON.to_string(),
            },
        );
        self.connections.remove(client_id);
    }

    fn report_user_shot(
        &mut self,
        client_id: &str,
        point: GridPoint,
        zombie_id: Option<ZombieId>,
        is_killed: Option<bool>,
    ) {
        let Some(room_id) = self.connections.get(client_id).map(|c| c.room_id.clone()) else {
            return;
        };
        let message = ServerMessage::UserShot {
            shooter_client_id: client_id.to_string(),
            point,
            zombie_id,
            is_killed,
        };
        for member in self.connections.clients_in(&room_id) {
            self.send_to(&member, &message);
        }
    }
}
