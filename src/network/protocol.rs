// Archers wire protocol definition
// Relay envelopes, directory/signaling payloads and the game messages
// exchanged over WebRTC data channels (all JSON, `type`-tagged)

use crate::game::Room;
use serde::{Deserialize, Serialize};

pub type ClientId = String;
pub type ServerId = String;
pub type RoomId = String;
pub type ZombieId = u64;

/// Cell on the zombie map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
}

impl GridPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Session description produced by the WebRTC negotiation layer.
/// The relay and the signaling exchange pass it through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionDescription {
    Offer { sdp: String },
    Answer { sdp: String },
}

/// Everything that travels through the relay.
///
/// `client_id`/`server_id` are routing fields only: an endpoint stamps its own
/// id into the field of its role and the recipient id (if any) into the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<ServerId>,
    #[serde(flatten)]
    pub payload: RelayPayload,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Relay payloads, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayPayload {
    /// Signaling blob for a peer session
    SignalOffer { offer: SessionDescription },

    /// Broadcast by clients looking for hosts
    DiscoveryRequest,

    /// A host's answer; the host id rides in the envelope's `serverId`
    #[serde(rename_all = "camelCase")]
    DiscoveryResponse {
        host_username: String,
        rooms: Vec<RoomSummary>,
    },
}

/// Handshake frame an endpoint sends right after the socket opens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayHello {
    pub guid: String,
}

/// Relay's answer to [`RelayHello`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayAccepted {
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub num_players: usize,
}

/// What a host advertises to discovering clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub server_id: ServerId,
    pub host_username: String,
    pub rooms: Vec<RoomSummary>,
}

/// Messages a client sends to the host over its data channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        client_id: ClientId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        username: String,
    },

    #[serde(rename_all = "camelCase")]
    LeaveRoom { client_id: ClientId },

    #[serde(rename_all = "camelCase")]
    StartGame { client_id: ClientId },

    /// `room_id`/`username` are hints so the host can re-register a shooter
    /// it already considers disconnected
    #[serde(rename_all = "camelCase")]
    Shoot {
        client_id: ClientId,
        point: GridPoint,
        damage: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
}

/// Messages the host pushes to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    UserJoined {
        joined_client_id: ClientId,
        joined_username: String,
    },

    #[serde(rename_all = "camelCase")]
    UserLeft { left_client_id: ClientId },

    /// Full room snapshot, re-sent every tick
    ReportMap { map: Room },

    GameOver { reason: String },

    /// Shot resolution; both ids are absent when nothing was hit
    #[serde(rename_all = "camelCase")]
    UserShot {
        shooter_client_id: ClientId,
        point: GridPoint,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zombie_id: Option<ZombieId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_killed: Option<bool>,
    },
}
