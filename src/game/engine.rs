// Authoritative room simulation
// Owns every room of a hosting session: membership, start, shots, ticks

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::room::{Room, RoomClient, RoomStore, Zombie};
use super::walk::{self, WalkPolicy};
use crate::config::GameConfig;
use crate::network::protocol::{ClientId, GridPoint, RoomId, RoomSummary, ZombieId};
use crate::utils::now_ms;

/// Room-affecting requests coming out of the host registry
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Joined {
        client_id: ClientId,
        username: String,
        room_id: RoomId,
    },
    Left {
        client_id: ClientId,
    },
    StartRequested {
        client_id: ClientId,
    },
    Shot {
        client_id: ClientId,
        damage: i32,
        point: GridPoint,
    },
}

/// Outbound side of the engine, implemented by the host registry
pub trait GameReporter {
    /// Push a full room snapshot to one client
    fn report_map(&mut self, room: &Room, client_id: &str);

    /// Tell one client its game is lost; the client is deregistered
    fn report_game_over(&mut self, client_id: &str);

    /// Broadcast a shot resolution to the shooter's whole room
    fn report_user_shot(
        &mut self,
        client_id: &str,
        point: GridPoint,
        zombie_id: Option<ZombieId>,
        is_killed: Option<bool>,
    );
}

/// Pending "is this room still empty?" check
#[derive(Debug)]
struct GraceCheck {
    room_id: RoomId,
    due: Instant,
}

pub struct RoomEngine {
    config: GameConfig,
    store: RoomStore,
    rng: StdRng,
    walk: WalkPolicy,
    grace_checks: Vec<GraceCheck>,
    rooms_changed: bool,
}

impl RoomEngine {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: GameConfig, rng: StdRng) -> Self {
        Self {
            config,
            store: RoomStore::new(),
            rng,
            walk: walk::uniform_walk,
            grace_checks: Vec::new(),
            rooms_changed: false,
        }
    }

    #[cfg(test)]
    pub fn with_walk_policy(mut self, walk: WalkPolicy) -> Self {
        self.walk = walk;
        self
    }

    #[cfg(test)]
    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.store.get(room_id)
    }

    #[cfg(test)]
    pub fn rooms(&self) -> &RoomStore {
        &self.store
    }

    /// Single entry point for registry-originated events
    pub fn handle<R: GameReporter>(&mut self, event: RoomEvent, now: Instant, reporter: &mut R) {
        match event {
            RoomEvent::Joined {
                client_id,
                username,
                room_id,
            } => self.join(&client_id, &username, &room_id, now, reporter),
            RoomEvent::Left { client_id } => self.leave(&client_id, now),
            RoomEvent::StartRequested { client_id } => self.start(&client_id),
            RoomEvent::Shot {
                client_id,
                damage,
                point,
            } => self.shoot(&client_id, damage, point, reporter),
        }
    }

    /// Add (or replace) a member, creating the room on first join, and send
    /// the joiner a snapshot
    pub fn join<R: GameReporter>(
        &mut self,
        client_id: &str,
        username: &str,
        room_id: &str,
        now: Instant,
        reporter: &mut R,
    ) {
        // A client is a member of at most one room
        if let Some(previous) = self.store.room_of(client_id) {
            if previous != room_id {
                self.leave(client_id, now);
            }
        }

        let client = RoomClient {
            client_id: client_id.to_string(),
            username: username.to_string(),
        };

        match self.store.get_mut(room_id) {
            Some(room) => {
                room.clients.insert(client_id.to_string(), client);
                if room.is_freezed {
                    info!("Unfreezing room {}", room_id);
                }
                room.is_freezed = false;
            }
            None => {
                let mut room = Room::new(room_id.to_string(), self.config.base_zombies_per_tick);
                room.clients.insert(client_id.to_string(), client);
                self.store.insert(room);
            }
        }
        info!("Client {} joined room {}", client_id, room_id);
        self.rooms_changed = true;

        if let Some(room) = self.store.get(room_id) {
            reporter.report_map(room, client_id);
        }
    }

    /// Drop a member; the last one out freezes the room and arms a grace check
    pub fn leave(&mut self, client_id: &str, now: Instant) {
        let Some(room_id) = self.store.room_of(client_id) else {
            warn!("Client {} left but is not in any room", client_id);
            return;
        };
        let Some(room) = self.store.get_mut(&room_id) else {
            return;
        };

        room.clients.remove(client_id);
        info!("Client {} left room {}", client_id, room_id);

        if room.clients.is_empty() {
            room.is_freezed = true;
            info!(
                "Last client left, freezing room {} for {:?}",
                room_id,
                self.config.rejoin_grace()
            );
            self.grace_checks.push(GraceCheck {
                room_id,
                due: now + self.config.rejoin_grace(),
            });
        }
        self.rooms_changed = true;
    }

    /// Start the client's room; repeated starts are no-ops
    pub fn start(&mut self, client_id: &str) {
        let Some(room_id) = self.store.room_of(client_id) else {
            warn!("Client {} asked to start but is not in any room", client_id);
            return;
        };
        let Some(room) = self.store.get_mut(&room_id) else {
            return;
        };

        if room.is_started {
            debug!("Room {} already started", room_id);
            return;
        }
        room.is_started = true;
        room.started_at = Some(now_ms());
        info!("Starting game for room {}", room_id);
        self.rooms_changed = true;
    }

    /// Resolve a shot against the first living zombie on the target cell.
    /// The resolution is broadcast even on a miss.
    pub fn shoot<R: GameReporter>(
        &mut self,
        client_id: &str,
        damage: i32,
        point: GridPoint,
        reporter: &mut R,
    ) {
        let Some(room_id) = self.store.room_of(client_id) else {
            warn!("Client {} shot but is not in any room", client_id);
            return;
        };
        let Some(room) = self.store.get_mut(&room_id) else {
            return;
        };

        let mut zombie_id = None;
        let mut is_killed = None;
        if let Some(zombie) = room
            .zombies
            .iter_mut()
            .find(|z| !z.is_dead() && z.position() == point)
        {
            zombie.health -= damage;
            let killed = zombie.health <= 0;
            if killed {
                zombie.dead_ticks = Some(1);
            }
            zombie_id = Some(zombie.id);
            is_killed = Some(killed);
            debug!(
                "Client {} hit zombie {} (health {}, killed {})",
                client_id, zombie.id, zombie.health, killed
            );
        }

        reporter.report_user_shot(client_id, point, zombie_id, is_killed);
    }

    /// Advance every started room and push fresh snapshots to its members
    pub fn tick<R: GameReporter>(&mut self, reporter: &mut R) {
        for room_id in self.store.room_ids() {
            let (started, active) = match self.store.get(&room_id) {
                Some(room) => (room.is_started, room.is_active()),
                None => continue,
            };
            if !started {
                continue;
            }
            let lost = active && self.tick_room(&room_id);

            let Some(room) = self.store.get(&room_id) else {
                continue;
            };
            if lost {
                info!("Zombies reached the wall in room {}", room_id);
                for client_id in room.client_ids() {
                    reporter.report_game_over(&client_id);
                }
                self.destroy_room(&room_id);
            } else {
                for client_id in room.clients.keys() {
                    reporter.report_map(room, client_id);
                }
            }
        }
    }

    /// One simulation step; returns true when a zombie crossed the near edge
    fn tick_room(&mut self, room_id: &str) -> bool {
        let config = &self.config;
        let Some((room, ids)) = self.store.room_with_ids(room_id) else {
            return false;
        };

        room.tick_epoch_ms = Some(now_ms());

        // Age the dead, sweep those past their decay
        for zombie in room.zombies.iter_mut() {
            if let Some(ticks) = zombie.dead_ticks.as_mut() {
                *ticks += 1;
            }
        }
        let decay = config.dead_decay_ticks;
        room.zombies
            .retain(|z| z.dead_ticks.map_or(true, |ticks| ticks <= decay));

        for zombie in room.zombies.iter_mut() {
            let turn = (self.walk)(&mut self.rng);
            walk::step_zombie(zombie, turn, config.zombie_step, config.map_height);
        }

        let rate = walk::wave_rate(
            room.zombies_per_tick,
            room.total_ticks,
            config.wave_tick_length,
        );
        let count = walk::spawn_count(rate, self.rng.gen::<f64>());
        for _ in 0..count {
            if room.zombies.len() >= config.max_zombies {
                break;
            }
            let zombie = Zombie {
                id: ids.next_id(),
                x: config.map_width - 1,
                y: self.rng.gen_range(0..config.map_height.max(1)),
                vx: -config.zombie_step,
                vy: 0,
                health: config.zombie_health,
                dead_ticks: None,
            };
            room.zombies.push(zombie);
        }

        room.zombies_per_tick += config.zombies_per_tick_increment;
        room.total_ticks += 1;

        room.zombies.iter().any(|z| z.x < 0)
    }

    /// Earliest pending grace check, for the host loop's timer
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.grace_checks.iter().map(|check| check.due).min()
    }

    /// Fire due grace checks; rooms that are still empty get destroyed
    pub fn handle_timeout(&mut self, now: Instant) {
        let (due, pending): (Vec<GraceCheck>, Vec<GraceCheck>) = self
            .grace_checks
            .drain(..)
            .partition(|check| check.due <= now);
        self.grace_checks = pending;

        for check in due {
            let still_empty = self
                .store
                .get(&check.room_id)
                .map_or(false, |room| room.clients.is_empty());
            if still_empty {
                self.destroy_room(&check.room_id);
            }
        }
    }

    fn destroy_room(&mut self, room_id: &str) {
        if self.store.remove(room_id).is_some() {
            info!("Destroying room {}", room_id);
            self.rooms_changed = true;
        }
    }

    /// True once after any room was created, changed membership, started
    /// or was destroyed
    pub fn take_rooms_changed(&mut self) -> bool {
        std::mem::take(&mut self.rooms_changed)
    }

    pub fn room_summaries(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .store
            .iter()
            .map(|room| RoomSummary {
                room_id: room.room_id.clone(),
                num_players: room.clients.len(),
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Report {
        Map {
            client_id: String,
            room: Room,
        },
        GameOver {
            client_id: String,
        },
        Shot {
            client_id: String,
            point: GridPoint,
            zombie_id: Option<ZombieId>,
            is_killed: Option<bool>,
        },
    }

    #[derive(Default)]
    struct Recorder {
        reports: Vec<Report>,
    }

    impl Recorder {
        fn maps_for(&self, client_id: &str) -> Vec<&Room> {
            self.reports
                .iter()
                .filter_map(|r| match r {
                    Report::Map { client_id: c, room } if c == client_id => Some(room),
                    _ => None,
                })
                .collect()
        }

        fn shots(&self) -> Vec<&Report> {
            self.reports
                .iter()
                .filter(|r| matches!(r, Report::Shot { .. }))
                .collect()
        }
    }

    impl GameReporter for Recorder {
        fn report_map(&mut self, room: &Room, client_id: &str) {
            self.reports.push(Report::Map {
                client_id: client_id.to_string(),
                room: room.clone(),
            });
        }

        fn report_game_over(&mut self, client_id: &str) {
            self.reports.push(Report::GameOver {
                client_id: client_id.to_string(),
            });
        }

        fn report_user_shot(
            &mut self,
            client_id: &str,
            point: GridPoint,
            zombie_id: Option<ZombieId>,
            is_killed: Option<bool>,
        ) {
            self.reports.push(Report::Shot {
                client_id: client_id.to_string(),
                point,
                zombie_id,
                is_killed,
            });
        }
    }

    fn engine() -> RoomEngine {
        RoomEngine::with_rng(GameConfig::default(), StdRng::seed_from_u64(42))
            .with_walk_policy(walk::straight_walk)
    }

    fn place_zombie(
        engine: &mut RoomEngine,
        room_id: &str,
        x: i32,
        y: i32,
        health: i32,
    ) -> ZombieId {
        let id = engine.store.zombie_ids.next_id();
        engine.store.get_mut(room_id).unwrap().zombies.push(Zombie {
            id,
            x,
            y,
            vx: -1,
            vy: 0,
            health,
            dead_ticks: None,
        });
        id
    }

    #[test]
    fn test_first_join_creates_unstarted_room_and_reports_map() {
        let mut engine = engine();
        let mut recorder = Recorder::default();

        engine.join("A", "alice", "R", Instant::now(), &mut recorder);

        let room = engine.room("R").unwrap();
        assert!(!room.is_started);
        assert!(!room.is_freezed);
        assert!(room.zombies.is_empty());
        assert_eq!(room.zombies_per_tick, 0.5);

        let maps = recorder.maps_for("A");
        assert_eq!(maps.len(), 1);
        assert!(maps[0].zombies.is_empty());
        assert_eq!(maps[0].client_ids(), vec!["A".to_string()]);
    }

    #[test]
    fn test_membership_is_net_effect_of_joins_and_leaves() {
        let mut engine = engine();
        let mut recorder = Recorder::default();
        let now = Instant::now();

        let ops: [(&str, bool); 7] = [
            ("A", true),
            ("B", true),
            ("C", true),
            ("B", false),
            ("A", false),
            ("B", true),
            ("D", true),
        ];
        let mut expected = HashSet::new();
        for (client, join) in ops {
            if join {
                engine.join(client, client, "R", now, &mut recorder);
                expected.insert(client.to_string());
            } else {
                engine.leave(client, now);
                expected.remove(client);
            }
        }

        let members: HashSet<String> = engine.room("R").unwrap().client_ids().into_iter().collect();
        assert_eq!(members, expected);
    }

    #[test]
    fn test_empty_room_freezes_then_dies_after_grace() {
        let mut engine = engine();
        let mut recorder = Recorder::default();
        let now = Instant::now();

        engine.join("A", "alice", "R", now, &mut recorder);
        engine.leave("A", now);

        let room = engine.room("R").unwrap();
        assert!(room.is_freezed);
        assert!(room.clients.is_empty());

        let due = engine.poll_timeout().unwrap();
        assert_eq!(due, now + Duration::from_millis(30_000));

        engine.handle_timeout(now + Duration::from_secs(1));
        assert!(engine.room("R").is_some());

        engine.handle_timeout(due);
        assert!(engine.room("R").is_none());
        assert!(engine.poll_timeout().is_none());
    }

    #[test]
    fn test_rejoin_within_grace_keeps_room() {
        let mut engine = engine();
        let mut recorder = Recorder::default();
        let now = Instant::now();

        engine.join("A", "alice", "R", now, &mut recorder);
        engine.start("A");
        engine.leave("A", now);
        engine.join("A", "alice", "R", now + Duration::from_secs(5), &mut recorder);

        assert!(!engine.room("R").unwrap().is_freezed);

        engine.handle_timeout(now + Duration::from_secs(31));
        let room = engine.room("R").unwrap();
        assert!(room.is_started);
        assert_eq!(room.clients.len(), 1);
    }

    #[test]
    fn test_join_other_room_leaves_previous() {
        let mut engine = engine();
        let mut recorder = Recorder::default();
        let now = Instant::now();

        engine.join("A", "alice", "R1", now, &mut recorder);
        engine.join("A", "alice", "R2", now, &mut recorder);

        assert!(engine.room("R1").unwrap().clients.is_empty());
        assert!(engine.room("R1").unwrap().is_freezed);
        assert_eq!(engine.room("R2").unwrap().clients.len(), 1);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut engine = engine();
        let mut recorder = Recorder::default();

        engine.join("A", "alice", "R", Instant::now(), &mut recorder);
        engine.start("A");
        assert!(engine.room("R").unwrap().is_started);

        // Pin the timestamp so a second start would be visible
        engine.store.get_mut("R").unwrap().started_at = Some(1);
        engine.start("A");

        let room = engine.room("R").unwrap();
        assert!(room.is_started);
        assert_eq!(room.started_at, Some(1));
    }

    #[test]
    fn test_unstarted_room_never_ticks() {
        let mut engine = engine();
        let mut recorder = Recorder::default();

        engine.join("A", "alice", "R", Instant::now(), &mut recorder);
        for _ in 0..5 {
            engine.tick(&mut recorder);
        }

        let room = engine.room("R").unwrap();
        assert_eq!(room.total_ticks, 0);
        assert!(room.zombies.is_empty());
        // Only the join snapshot
        assert_eq!(recorder.maps_for("A").len(), 1);
    }

    #[test]
    fn test_frozen_room_does_not_move_or_spawn() {
        let mut engine = engine();
        let mut recorder = Recorder::default();
        let now = Instant::now();

        engine.join("A", "alice", "R", now, &mut recorder);
        engine.start("A");
        let id = place_zombie(&mut engine, "R", 10, 2, 100);
        engine.leave("A", now);

        engine.tick(&mut recorder);
        engine.tick(&mut recorder);

        let room = engine.room("R").unwrap();
        assert_eq!(room.total_ticks, 0);
        assert_eq!(room.zombies.len(), 1);
        assert_eq!(room.zombies[0].id, id);
        assert_eq!(room.zombies[0].x, 10);
    }

    #[test]
    fn test_ticks_advance_and_report_to_every_member() {
        let mut engine = engine();
        let mut recorder = Recorder::default();
        let now = Instant::now();

        engine.join("A", "alice", "R", now, &mut recorder);
        engine.join("B", "bob", "R", now, &mut recorder);
        engine.start("A");

        let mut last_ticks = 0;
        for _ in 0..10 {
            engine.tick(&mut recorder);
            let ticks = engine.room("R").unwrap().total_ticks;
            assert!(ticks > last_ticks);
            last_ticks = ticks;
        }

        let room = engine.room("R").unwrap();
        assert!(room.zombies_per_tick > 0.5);
        assert!(room.tick_epoch_ms.is_some());
        // join snapshot + one per tick
        assert_eq!(recorder.maps_for("A").len(), 11);
        assert_eq!(recorder.maps_for("B").len(), 11);
    }

    #[test]
    fn test_population_never_exceeds_cap() {
        let config = GameConfig {
            max_zombies: 3,
            base_zombies_per_tick: 50.0,
            ..GameConfig::default()
        };
        let mut engine = RoomEngine::with_rng(config, StdRng::seed_from_u64(3))
            .with_walk_policy(walk::straight_walk);
        let mut recorder = Recorder::default();

        engine.join("A", "alice", "R", Instant::now(), &mut recorder);
        engine.start("A");
        for _ in 0..20 {
            engine.tick(&mut recorder);
            assert!(engine.room("R").unwrap().zombies.len() <= 3);
        }
    }

    #[test]
    fn test_new_zombies_enter_at_far_edge() {
        let config = GameConfig {
            base_zombies_per_tick: 4.0,
            ..GameConfig::default()
        };
        let mut engine = RoomEngine::with_rng(config, StdRng::seed_from_u64(5))
            .with_walk_policy(walk::straight_walk);
        let mut recorder = Recorder::default();

        engine.join("A", "alice", "R", Instant::now(), &mut recorder);
        engine.start("A");
        engine.tick(&mut recorder);

        let room = engine.room("R").unwrap();
        assert!(!room.zombies.is_empty());
        for zombie in &room.zombies {
            assert_eq!(zombie.x, 31);
            assert_eq!(zombie.vx, -1);
            assert!((0..10).contains(&zombie.y));
            assert_eq!(zombie.health, 100);
        }
    }

    #[test]
    fn test_missed_shot_broadcasts_without_zombie() {
        let mut engine = engine();
        let mut recorder = Recorder::default();

        engine.join("A", "alice", "R", Instant::now(), &mut recorder);
        place_zombie(&mut engine, "R", 10, 2, 100);
        let before = engine.room("R").unwrap().zombies.clone();

        engine.shoot("A", 100, GridPoint::new(4, 4), &mut recorder);

        assert_eq!(
            recorder.shots(),
            vec![&Report::Shot {
                client_id: "A".to_string(),
                point: GridPoint::new(4, 4),
                zombie_id: None,
                is_killed: None,
            }]
        );
        assert_eq!(engine.room("R").unwrap().zombies, before);
    }

    #[test]
    fn test_wounding_shot_reports_not_killed() {
        let mut engine = engine();
        let mut recorder = Recorder::default();

        engine.join("A", "alice", "R", Instant::now(), &mut recorder);
        let id = place_zombie(&mut engine, "R", 10, 2, 100);

        engine.shoot("A", 40, GridPoint::new(10, 2), &mut recorder);

        let zombie = &engine.room("R").unwrap().zombies[0];
        assert_eq!(zombie.health, 60);
        assert!(!zombie.is_dead());
        assert_eq!(
            recorder.shots(),
            vec![&Report::Shot {
                client_id: "A".to_string(),
                point: GridPoint::new(10, 2),
                zombie_id: Some(id),
                is_killed: Some(false),
            }]
        );
    }

    #[test]
    fn test_killed_zombie_decays_before_removal() {
        let mut engine = engine();
        let mut recorder = Recorder::default();

        engine.join("A", "alice", "R", Instant::now(), &mut recorder);
        engine.start("A");
        let target = place_zombie(&mut engine, "R", 10, 2, 100);
        let other = place_zombie(&mut engine, "R", 10, 2, 100);

        engine.shoot("A", 100, GridPoint::new(10, 2), &mut recorder);

        let room = engine.room("R").unwrap();
        let dead: Vec<&Zombie> = room.zombies.iter().filter(|z| z.is_dead()).collect();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, target);
        assert!(dead[0].health <= 0);
        assert!(room.zombies.iter().any(|z| z.id == other && !z.is_dead()));

        // Still there one tick later, gone the tick after
        engine.tick(&mut recorder);
        let room = engine.room("R").unwrap();
        let zombie = room.zombies.iter().find(|z| z.id == target).unwrap();
        assert_eq!(zombie.dead_ticks, Some(2));
        assert_eq!(zombie.x, 10);

        engine.tick(&mut recorder);
        assert!(!engine.room("R").unwrap().zombies.iter().any(|z| z.id == target));
    }

    #[test]
    fn test_kill_is_broadcast_to_whole_room() {
        let mut engine = engine();
        let mut recorder = Recorder::default();
        let now = Instant::now();

        engine.join("A", "alice", "R", now, &mut recorder);
        engine.join("B", "bob", "R", now, &mut recorder);
        let id = place_zombie(&mut engine, "R", 7, 7, 100);

        engine.shoot("A", 150, GridPoint::new(7, 7), &mut recorder);

        // The reporter fans the shot out; the engine reports it once
        assert_eq!(
            recorder.shots(),
            vec![&Report::Shot {
                client_id: "A".to_string(),
                point: GridPoint::new(7, 7),
                zombie_id: Some(id),
                is_killed: Some(true),
            }]
        );
    }

    #[test]
    fn test_zombie_crossing_edge_ends_game() {
        let mut engine = engine();
        let mut recorder = Recorder::default();
        let now = Instant::now();

        engine.join("A", "alice", "R", now, &mut recorder);
        engine.join("B", "bob", "R", now, &mut recorder);
        engine.start("A");
        place_zombie(&mut engine, "R", 0, 5, 100);
        let maps_before = recorder.maps_for("A").len();

        engine.tick(&mut recorder);

        assert!(engine.room("R").is_none());
        let game_overs: Vec<&Report> = recorder
            .reports
            .iter()
            .filter(|r| matches!(r, Report::GameOver { .. }))
            .collect();
        assert_eq!(
            game_overs,
            vec![
                &Report::GameOver {
                    client_id: "A".to_string()
                },
                &Report::GameOver {
                    client_id: "B".to_string()
                },
            ]
        );
        assert_eq!(recorder.maps_for("A").len(), maps_before);
        assert!(engine.take_rooms_changed());
    }

    #[test]
    fn test_dead_zombie_at_edge_does_not_end_game() {
        let mut engine = engine();
        let mut recorder = Recorder::default();

        engine.join("A", "alice", "R", Instant::now(), &mut recorder);
        engine.start("A");
        place_zombie(&mut engine, "R", 0, 5, 100);
        engine.shoot("A", 100, GridPoint::new(0, 5), &mut recorder);

        engine.tick(&mut recorder);
        assert!(engine.room("R").is_some());
    }

    #[test]
    fn test_zombie_ids_unique_across_rooms() {
        let config = GameConfig {
            base_zombies_per_tick: 3.0,
            ..GameConfig::default()
        };
        let mut engine = RoomEngine::with_rng(config, StdRng::seed_from_u64(9))
            .with_walk_policy(walk::straight_walk);
        let mut recorder = Recorder::default();
        let now = Instant::now();

        engine.join("A", "alice", "R1", now, &mut recorder);
        engine.join("B", "bob", "R2", now, &mut recorder);
        engine.start("A");
        engine.start("B");
        for _ in 0..5 {
            engine.tick(&mut recorder);
        }

        let ids: Vec<ZombieId> = engine
            .rooms()
            .iter()
            .flat_map(|room| room.zombies.iter().map(|z| z.id))
            .collect();
        let unique: HashSet<ZombieId> = ids.iter().copied().collect();
        assert!(!ids.is_empty());
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn test_leave_without_room_is_ignored() {
        let mut engine = engine();
        engine.leave("ghost", Instant::now());
        assert!(engine.rooms().is_empty());
        assert!(!engine.take_rooms_changed());
    }

    #[test]
    fn test_room_summaries_count_members() {
        let mut engine = engine();
        let mut recorder = Recorder::default();
        let now = Instant::now();

        engine.join("A", "alice", "R1", now, &mut recorder);
        engine.join("B", "bob", "R1", now, &mut recorder);
        engine.join("C", "carol", "R2", now, &mut recorder);

        assert_eq!(
            engine.room_summaries(),
            vec![
                RoomSummary {
                    room_id: "R1".to_string(),
                    num_players: 2
                },
                RoomSummary {
                    room_id: "R2".to_string(),
                    num_players: 1
                },
            ]
        );
    }
}
