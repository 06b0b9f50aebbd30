// Zombie movement and spawn pressure
// Random walk instead of path-finding keeps every tick O(zombies)

use rand::rngs::StdRng;
use rand::Rng;
use std::f64::consts::PI;

use super::room::Zombie;

/// Lane change a zombie takes after stepping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// Towards row 0
    Up,
    /// Towards the last row
    Down,
    Straight,
}

/// Decides the next lane change; swap it out for deterministic tests
pub type WalkPolicy = fn(&mut StdRng) -> Turn;

/// Default policy: uniform over {-2, -1, 0, 1, 2}, so Up and Down each come
/// up with probability 1/5 and Straight with 3/5
pub fn uniform_walk(rng: &mut StdRng) -> Turn {
    match rng.gen_range(-2..3) {
        2 => Turn::Down,
        -2 => Turn::Up,
        _ => Turn::Straight,
    }
}

/// Always keeps the lane
#[cfg(test)]
pub fn straight_walk(_rng: &mut StdRng) -> Turn {
    Turn::Straight
}

/// Advance a living zombie one tick, then pick its next vertical velocity.
///
/// x may go one cell past the near edge (-1) so the loss check can see it;
/// y stays inside the map and a turn into a wall becomes Straight.
pub fn step_zombie(zombie: &mut Zombie, turn: Turn, step: i32, map_height: i32) {
    if zombie.is_dead() {
        return;
    }

    zombie.x = (zombie.x + zombie.vx).max(-1);
    zombie.y = (zombie.y + zombie.vy).clamp(0, map_height - 1);

    zombie.vy = match turn {
        Turn::Down if zombie.y < map_height - 1 => step,
        Turn::Up if zombie.y > 0 => -step,
        _ => 0,
    };
}

/// Spawn rate for this tick: the base rate modulated by a sine over elapsed
/// ticks, which gives rising and falling waves
pub fn wave_rate(zombies_per_tick: f64, total_ticks: u64, wave_tick_length: u64) -> f64 {
    let phase = total_ticks as f64 * PI / wave_tick_length.max(1) as f64;
    (zombies_per_tick * (phase.sin() + 1.0) / 2.0).max(0.0)
}

/// Whole part of the rate plus one more zombie when `roll` (uniform in
/// [0, 1)) lands above the fractional part
pub fn spawn_count(rate: f64, roll: f64) -> usize {
    let rate = rate.max(0.0);
    let extra = if roll > rate.fract() { 1 } else { 0 };
    rate.floor() as usize + extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn zombie_at(x: i32, y: i32) -> Zombie {
        Zombie {
            id: 0,
            x,
            y,
            vx: -1,
            vy: 0,
            health: 100,
            dead_ticks: None,
        }
    }

    #[test]
    fn test_uniform_walk_produces_every_turn() {
        let mut rng = StdRng::seed_from_u64(11);
        let turns: Vec<Turn> = (0..200).map(|_| uniform_walk(&mut rng)).collect();

        assert!(turns.contains(&Turn::Up));
        assert!(turns.contains(&Turn::Down));
        assert!(turns.contains(&Turn::Straight));

        let straight = turns.iter().filter(|t| **t == Turn::Straight).count();
        assert!(straight > turns.len() / 3);
    }

    #[test]
    fn test_step_moves_towards_near_edge() {
        let mut zombie = zombie_at(5, 3);
        step_zombie(&mut zombie, Turn::Straight, 1, 10);
        assert_eq!((zombie.x, zombie.y, zombie.vy), (4, 3, 0));
    }

    #[test]
    fn test_step_clamps_x_at_minus_one() {
        let mut zombie = zombie_at(-1, 3);
        step_zombie(&mut zombie, Turn::Straight, 1, 10);
        assert_eq!(zombie.x, -1);
    }

    #[test]
    fn test_turns_into_walls_go_straight() {
        let mut top = zombie_at(5, 0);
        step_zombie(&mut top, Turn::Up, 1, 10);
        assert_eq!(top.vy, 0);

        let mut bottom = zombie_at(5, 9);
        step_zombie(&mut bottom, Turn::Down, 1, 10);
        assert_eq!(bottom.vy, 0);

        let mut middle = zombie_at(5, 5);
        step_zombie(&mut middle, Turn::Down, 1, 10);
        assert_eq!(middle.vy, 1);
    }

    #[test]
    fn test_vertical_move_stays_on_map() {
        let mut zombie = zombie_at(5, 9);
        zombie.vy = 1;
        step_zombie(&mut zombie, Turn::Straight, 1, 10);
        assert_eq!(zombie.y, 9);
    }

    #[test]
    fn test_dead_zombies_do_not_walk() {
        let mut zombie = zombie_at(5, 3);
        zombie.dead_ticks = Some(1);
        step_zombie(&mut zombie, Turn::Down, 1, 10);
        assert_eq!((zombie.x, zombie.y), (5, 3));
    }

    #[test]
    fn test_wave_rate_rises_and_falls() {
        let start = wave_rate(2.0, 0, 10);
        let crest = wave_rate(2.0, 5, 10);
        let trough = wave_rate(2.0, 15, 10);

        assert!((start - 1.0).abs() < 1e-9);
        assert!(crest > start);
        assert!(trough < start);
        assert!(trough >= 0.0);
    }

    #[test]
    fn test_spawn_count_never_negative() {
        assert_eq!(spawn_count(-3.0, 0.5), 1);
        assert_eq!(spawn_count(0.0, 0.0), 0);
        assert_eq!(spawn_count(2.25, 0.1), 2);
        assert_eq!(spawn_count(2.25, 0.9), 3);
    }
}
