use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::network::protocol::{ClientId, GridPoint, RoomId, ZombieId};

/// Member of a room as shown to every client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomClient {
    pub client_id: ClientId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zombie {
    pub id: ZombieId,
    pub x: i32,
    pub y: i32,
    pub vx: i32,
    pub vy: i32,
    pub health: i32,
    /// Death-decay counter; absent while the zombie is alive
    #[serde(rename = "isDead", default, skip_serializing_if = "Option::is_none")]
    pub dead_ticks: Option<u32>,
}

impl Zombie {
    pub fn is_dead(&self) -> bool {
        self.dead_ticks.is_some()
    }

    pub fn position(&self) -> GridPoint {
        GridPoint::new(self.x, self.y)
    }
}

/// Authoritative state of one game session, also the `report-map` snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: RoomId,
    pub is_started: bool,
    pub is_freezed: bool,
    /// Unix millis of the first start
    #[serde(default)]
    pub started_at: Option<u64>,
    /// Unix millis of the last simulated tick
    #[serde(default)]
    pub tick_epoch_ms: Option<u64>,
    pub zombies: Vec<Zombie>,
    pub zombies_per_tick: f64,
    pub total_ticks: u64,
    pub clients: BTreeMap<ClientId, RoomClient>,
}

impl Room {
    pub fn new(room_id: RoomId, zombies_per_tick: f64) -> Self {
        Self {
            room_id,
            is_started: false,
            is_freezed: false,
            started_at: None,
            tick_epoch_ms: None,
            zombies: Vec::new(),
            zombies_per_tick,
            total_ticks: 0,
            clients: BTreeMap::new(),
        }
    }

    /// Started and not frozen: the only rooms the tick advances
    pub fn is_active(&self) -> bool {
        self.is_started && !self.is_freezed
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().cloned().collect()
    }
}

/// Process-unique zombie ids, never reused
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: ZombieId,
}

impl IdGenerator {
    pub fn next_id(&mut self) -> ZombieId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// All rooms of one hosting session plus the zombie id source they share
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: HashMap<RoomId, Room>,
    pub zombie_ids: IdGenerator,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn insert(&mut self, room: Room) {
        self.rooms.insert(room.room_id.clone(), room);
    }

    /// Mutable room together with the shared id source
    pub fn room_with_ids(&mut self, room_id: &str) -> Option<(&mut Room, &mut IdGenerator)> {
        let ids = &mut self.zombie_ids;
        self.rooms.get_mut(room_id).map(|room| (room, ids))
    }

    pub fn remove(&mut self, room_id: &str) -> Option<Room> {
        self.rooms.remove(room_id)
    }

    /// Room currently listing this client as a member
    pub fn room_of(&self, client_id: &str) -> Option<RoomId> {
        self.rooms
            .values()
            .find(|room| room.clients.contains_key(client_id))
            .map(|room| room.room_id.clone())
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }
}
