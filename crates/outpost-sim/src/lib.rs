//! Deterministic fixed-rate simulation of player kinematics.
//!
//! [`WorldSim`] owns every joined player's position and latest input. Each
//! call to [`WorldSim::advance_one_tick`] integrates all players by exactly
//! `1 / tick_rate_hz` seconds. No collision or terrain is consulted, so two
//! instances fed the same ordered calls produce identical trajectories.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use outpost_protocol::{InputState, JoinRequest, PlayerSnapshot, WorldSnapshot};

pub use outpost_config::SimConfig;

// ---------------------------------------------------------------------------
// Clock helpers
// ---------------------------------------------------------------------------

/// Tick rate with zero clamped to one.
pub fn effective_tick_rate(config: &SimConfig) -> u32 {
    config.tick_rate_hz.max(1)
}

/// Wall-clock interval between ticks.
pub fn tick_interval(config: &SimConfig) -> Duration {
    Duration::from_secs_f64(1.0 / effective_tick_rate(config) as f64)
}

// ---------------------------------------------------------------------------
// Player state
// ---------------------------------------------------------------------------

/// Simulator-owned kinematic state for one player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRuntimeState {
    pub player_id: String,
    pub x: f64,
    pub z: f64,
    pub input: InputState,
}

/// Unit vector along `(move_x, move_z)`, or zero.
fn normalize_movement(move_x: f64, move_z: f64) -> (f64, f64) {
    let length = move_x.hypot(move_z);
    if length > 0.0 {
        (move_x / length, move_z / length)
    } else {
        (0.0, 0.0)
    }
}

/// Scalar speed for an input, ignoring direction.
fn speed_for(config: &SimConfig, input: &InputState) -> f64 {
    let multiplier = if input.running { config.run_multiplier } else { 1.0 };
    config.walk_speed * multiplier
}

// ---------------------------------------------------------------------------
// WorldSim
// ---------------------------------------------------------------------------

pub struct WorldSim {
    world_seed: String,
    config: SimConfig,
    players: HashMap<String, PlayerRuntimeState>,
    tick: u64,
}

impl WorldSim {
    pub fn new(world_seed: impl Into<String>, config: SimConfig) -> Self {
        Self {
            world_seed: world_seed.into(),
            config,
            players: HashMap::new(),
            tick: 0,
        }
    }

    pub fn world_seed(&self) -> &str {
        &self.world_seed
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Add a player at the requested start position.
    ///
    /// A player that is already joined keeps its position and has its input
    /// reset. Returns `true` when the player was newly added.
    pub fn join_player(&mut self, request: &JoinRequest) -> bool {
        if let Some(existing) = self.players.get_mut(&request.player_id) {
            existing.input = InputState::default();
            tracing::debug!(player = %request.player_id, "re-join keeps position");
            return false;
        }
        self.players.insert(
            request.player_id.clone(),
            PlayerRuntimeState {
                player_id: request.player_id.clone(),
                x: request.start_x,
                z: request.start_z,
                input: InputState::default(),
            },
        );
        tracing::debug!(player = %request.player_id, x = request.start_x, z = request.start_z, "player joined sim");
        true
    }

    /// Remove a player. Returns `true` if it was present.
    pub fn leave_player(&mut self, player_id: &str) -> bool {
        self.players.remove(player_id).is_some()
    }

    /// Replace a joined player's input. Unknown players are ignored.
    pub fn set_input(&mut self, player_id: &str, input: InputState) {
        if let Some(player) = self.players.get_mut(player_id) {
            player.input = input.sanitized();
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerRuntimeState> {
        self.players.get(player_id)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    /// Ids of every joined player.
    pub fn player_ids(&self) -> impl Iterator<Item = &str> {
        self.players.keys().map(String::as_str)
    }

    /// Integrate every player by one tick and return the resulting snapshot.
    pub fn advance_one_tick(&mut self) -> WorldSnapshot {
        self.tick += 1;
        let delta_seconds = 1.0 / effective_tick_rate(&self.config) as f64;

        for player in self.players.values_mut() {
            let (dir_x, dir_z) = normalize_movement(player.input.move_x, player.input.move_z);
            let speed = speed_for(&self.config, &player.input);
            player.x += dir_x * speed * delta_seconds;
            player.z += dir_z * speed * delta_seconds;
        }

        self.snapshot()
    }

    /// Current state without advancing.
    pub fn snapshot(&self) -> WorldSnapshot {
        let players: BTreeMap<String, PlayerSnapshot> = self
            .players
            .values()
            .map(|player| {
                let (dir_x, dir_z) = normalize_movement(player.input.move_x, player.input.move_z);
                let speed = if dir_x == 0.0 && dir_z == 0.0 {
                    0.0
                } else {
                    speed_for(&self.config, &player.input)
                };
                (
                    player.player_id.clone(),
                    PlayerSnapshot {
                        player_id: player.player_id.clone(),
                        x: player.x,
                        z: player.z,
                        speed,
                    },
                )
            })
            .collect();

        WorldSnapshot {
            world_seed: self.world_seed.clone(),
            tick: self.tick,
            players,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(sim: &mut WorldSim, id: &str, x: f64, z: f64) {
        sim.join_player(&JoinRequest {
            world_seed: sim.world_seed().to_string(),
            player_id: id.to_string(),
            start_x: x,
            start_z: z,
        });
    }

    fn input(move_x: f64, move_z: f64, running: bool) -> InputState {
        InputState {
            move_x,
            move_z,
            running,
            jump: false,
        }
    }

    #[test]
    fn test_two_instances_produce_identical_trajectories() {
        let mut a = WorldSim::new("seed", SimConfig::default());
        let mut b = WorldSim::new("seed", SimConfig::default());
        for sim in [&mut a, &mut b] {
            join(sim, "p1", 0.0, 0.0);
            join(sim, "p2", 5.0, -3.0);
        }

        for tick in 0..120u32 {
            let p1 = match tick % 4 {
                0 => input(0.0, 1.0, false),
                1 => input(1.0, 0.0, true),
                2 => input(0.7, -0.3, tick % 3 == 0),
                _ => input(0.0, 0.0, false),
            };
            let p2 = input(-1.0, 0.5, tick % 2 == 0);
            for sim in [&mut a, &mut b] {
                sim.set_input("p1", p1);
                sim.set_input("p2", p2);
                sim.advance_one_tick();
            }
        }

        assert_eq!(a.tick(), 120);
        assert_eq!(a.snapshot(), b.snapshot());
        let moved = a.player("p1").unwrap();
        assert!(moved.x != 0.0 && moved.z != 0.0);
    }

    #[test]
    fn test_running_outpaces_walking() {
        let mut walker = WorldSim::new("seed", SimConfig::default());
        let mut runner = WorldSim::new("seed", SimConfig::default());
        join(&mut walker, "p", 0.0, 0.0);
        join(&mut runner, "p", 0.0, 0.0);
        walker.set_input("p", input(1.0, 0.0, false));
        runner.set_input("p", input(1.0, 0.0, true));

        for _ in 0..20 {
            walker.advance_one_tick();
            runner.advance_one_tick();
        }

        let walked = walker.player("p").unwrap().x;
        let ran = runner.player("p").unwrap().x;
        assert!((walked - 6.0).abs() < 1e-9, "20 ticks at 20 Hz walks 6 units, got {walked}");
        assert!(ran > walked);
    }

    #[test]
    fn test_diagonal_input_is_normalized() {
        let mut sim = WorldSim::new("seed", SimConfig::default());
        join(&mut sim, "p", 0.0, 0.0);
        sim.set_input("p", input(3.0, 4.0, false));
        sim.advance_one_tick();

        let player = sim.player("p").unwrap();
        let distance = player.x.hypot(player.z);
        assert!((distance - 0.3).abs() < 1e-12);
        assert!((player.x - 0.18).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_input_is_zeroed() {
        let mut sim = WorldSim::new("seed", SimConfig::default());
        join(&mut sim, "p", 1.0, 1.0);
        sim.set_input("p", input(f64::NAN, f64::INFINITY, true));
        let snapshot = sim.advance_one_tick();
        assert_eq!(snapshot.players["p"].x, 1.0);
        assert_eq!(snapshot.players["p"].speed, 0.0);
    }

    #[test]
    fn test_snapshot_speed_reflects_input() {
        let mut sim = WorldSim::new("seed", SimConfig::default());
        join(&mut sim, "idle", 0.0, 0.0);
        join(&mut sim, "runner", 0.0, 0.0);
        sim.set_input("runner", input(0.0, -1.0, true));

        let snapshot = sim.snapshot();
        assert_eq!(snapshot.players["idle"].speed, 0.0);
        assert!((snapshot.players["runner"].speed - 8.1).abs() < 1e-12);
        assert_eq!(snapshot.tick, 0);
    }

    #[test]
    fn test_rejoin_keeps_position_and_resets_input() {
        let mut sim = WorldSim::new("seed", SimConfig::default());
        join(&mut sim, "p", 0.0, 0.0);
        sim.set_input("p", input(1.0, 0.0, false));
        sim.advance_one_tick();

        join(&mut sim, "p", 50.0, 50.0);
        let player = sim.player("p").unwrap();
        assert!((player.x - 0.3).abs() < 1e-12);
        assert!(!player.input.is_moving());
    }

    #[test]
    fn test_leave_removes_player_and_input_for_unknown_is_ignored() {
        let mut sim = WorldSim::new("seed", SimConfig::default());
        join(&mut sim, "p", 0.0, 0.0);
        assert!(sim.leave_player("p"));
        assert!(!sim.leave_player("p"));
        sim.set_input("p", input(1.0, 0.0, false));
        assert!(sim.advance_one_tick().players.is_empty());
    }

    #[test]
    fn test_zero_tick_rate_clamped() {
        let config = SimConfig {
            tick_rate_hz: 0,
            ..SimConfig::default()
        };
        assert_eq!(tick_interval(&config), Duration::from_secs(1));
        assert_eq!(tick_interval(&SimConfig::default()), Duration::from_millis(50));
    }
}
