//! Remote entity tracking: dead reckoning and display interpolation.
//!
//! Remote players and enemies are not predicted - the server is the only
//! authority on them. What this module smooths over is the *arrival pattern*
//! of that authority: snapshots come at irregular intervals, so rendering
//! the raw positions would stutter. Each entity keeps an authoritative
//! `target_position` and a rendered `display_position` that chases it:
//! exponential smoothing for ordinary motion, an exact snap when the target
//! jumps farther than the teleport threshold (respawns must not glide).
//!
//! Velocity is estimated from the last two server samples and drives facing:
//! the sprite only flips when the horizontal velocity clearly exceeds a
//! small epsilon, so jitter around zero cannot make it flicker.

use glam::Vec2;
use smallvec::SmallVec;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::sessions::config::TrackerConfig;

/// Identifies one remote networked entity.
///
/// Players and enemies come from different id namespaces on the wire; the
/// tagged form lets one tracker hold both without collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityId {
    /// A remote player, by server-assigned player id.
    Player(i32),
    /// An enemy, by server-assigned enemy id.
    Enemy(i32),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Player(id) => write!(f, "player/{id}"),
            EntityId::Enemy(id) => write!(f, "enemy/{id}"),
        }
    }
}

/// One entity's slice of a snapshot broadcast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteUpdate {
    /// Which entity this update describes.
    pub id: EntityId,
    /// Authoritative position.
    pub position: Vec2,
    /// Authoritative rotation in degrees.
    pub rotation: f32,
    /// Whether the entity is alive in this snapshot.
    pub alive: bool,
}

/// The tracked state of one remote entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteEntityState {
    /// The entity this state belongs to.
    pub id: EntityId,
    /// Latest authoritative position.
    pub target_position: Vec2,
    /// Smoothed position to render at.
    pub display_position: Vec2,
    /// Dead-reckoned velocity in units per second.
    pub estimated_velocity: Vec2,
    /// Latest authoritative rotation in degrees.
    pub rotation: f32,
    /// Server timestamp of the latest update, in milliseconds.
    pub last_update_ms: u64,
    /// Whether the entity was alive in the latest snapshot that mentioned
    /// it.
    pub alive: bool,
    /// Render-facing derived from horizontal velocity, with hysteresis.
    pub facing_right: bool,
    last_server_position: Vec2,
    missed_snapshots: u32,
}

impl RemoteEntityState {
    fn first_sighting(update: &RemoteUpdate, server_time_ms: u64) -> Self {
        Self {
            id: update.id,
            target_position: update.position,
            display_position: update.position,
            estimated_velocity: Vec2::ZERO,
            rotation: update.rotation,
            last_update_ms: server_time_ms,
            alive: update.alive,
            facing_right: true,
            last_server_position: update.position,
            missed_snapshots: 0,
        }
    }

    fn apply_update(&mut self, update: &RemoteUpdate, server_time_ms: u64, config: &TrackerConfig) {
        let delta_ms = server_time_ms.saturating_sub(self.last_update_ms).max(1);
        self.estimated_velocity =
            (update.position - self.last_server_position) * (1000.0 / delta_ms as f32);

        if self.estimated_velocity.x.abs() > config.facing_epsilon {
            self.facing_right = self.estimated_velocity.x >= 0.0;
        }

        self.target_position = update.position;
        self.last_server_position = update.position;
        self.last_update_ms = server_time_ms;
        self.rotation = update.rotation;
        self.alive = update.alive;
        self.missed_snapshots = if update.alive {
            0
        } else {
            self.missed_snapshots + 1
        };
    }

    /// Advances the display position one render tick toward the target.
    fn advance_display(&mut self, dt: f32, config: &TrackerConfig) {
        if !self.alive || dt <= 0.0 {
            return;
        }
        let distance_sq = self.display_position.distance_squared(self.target_position);
        if distance_sq > config.snap_distance * config.snap_distance {
            // A jump this large is a teleport or respawn; gliding across it
            // would look worse than the cut.
            self.display_position = self.target_position;
        } else {
            let alpha = (dt * config.lerp_rate).clamp(0.0, 1.0);
            self.display_position = self.display_position.lerp(self.target_position, alpha);
        }
    }
}

/// Tracks every remote entity seen in snapshot broadcasts.
///
/// Owned and driven solely by the simulation thread; there is no
/// cross-entity locking because there is no cross-thread access.
#[derive(Debug)]
pub struct RemoteEntityTracker {
    entities: BTreeMap<EntityId, RemoteEntityState>,
    config: TrackerConfig,
}

impl RemoteEntityTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            entities: BTreeMap::new(),
            config,
        }
    }

    /// Applies one snapshot's worth of remote updates.
    ///
    /// Entities seen for the first time are initialized with `display ==
    /// target` and zero velocity. Entities absent from the snapshot (or
    /// present but dead) accumulate a miss count; once it exceeds the
    /// configured limit they are dropped. Callers that want a death
    /// animation before that can read the retained last pose, or call
    /// [`remove`](Self::remove) themselves.
    pub fn apply_snapshot(&mut self, updates: &[RemoteUpdate], server_time_ms: u64) {
        let mut seen: SmallVec<[EntityId; 16]> = SmallVec::new();
        for update in updates {
            seen.push(update.id);
            match self.entities.entry(update.id) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().apply_update(update, server_time_ms, &self.config);
                }
                Entry::Vacant(entry) => {
                    trace!(id = %update.id, "first sighting of remote entity");
                    entry.insert(RemoteEntityState::first_sighting(update, server_time_ms));
                }
            }
        }

        for (id, entity) in &mut self.entities {
            if !seen.contains(id) {
                entity.missed_snapshots += 1;
            }
        }

        let limit = self.config.stale_snapshot_limit;
        let before = self.entities.len();
        self.entities
            .retain(|_, entity| entity.missed_snapshots <= limit);
        let expired = before - self.entities.len();
        if expired > 0 {
            debug!(expired, "dropped stale remote entities");
        }
    }

    /// Advances every alive entity's display position by one render tick.
    pub fn advance(&mut self, dt: f32) {
        for entity in self.entities.values_mut() {
            entity.advance_display(dt, &self.config);
        }
    }

    /// Looks up one entity's tracked state.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&RemoteEntityState> {
        self.entities.get(&id)
    }

    /// Iterates over all tracked entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &RemoteEntityState> + '_ {
        self.entities.values()
    }

    /// Removes an entity immediately, returning its last state.
    pub fn remove(&mut self, id: EntityId) -> Option<RemoteEntityState> {
        self.entities.remove(&id)
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> TrackerConfig {
        TrackerConfig::default()
    }

    fn update(id: EntityId, position: Vec2, alive: bool) -> RemoteUpdate {
        RemoteUpdate {
            id,
            position,
            rotation: 0.0,
            alive,
        }
    }

    const ENEMY: EntityId = EntityId::Enemy(1);

    // ==========================================
    // First sighting and velocity estimation
    // ==========================================

    #[test]
    fn first_sighting_initializes_without_velocity() {
        let mut tracker = RemoteEntityTracker::new(config());
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(10.0, 20.0), true)], 1_000);

        let entity = tracker.get(ENEMY).unwrap();
        assert_eq!(entity.target_position, Vec2::new(10.0, 20.0));
        assert_eq!(entity.display_position, Vec2::new(10.0, 20.0));
        assert_eq!(entity.estimated_velocity, Vec2::ZERO);
    }

    #[test]
    fn velocity_comes_from_two_samples() {
        let mut tracker = RemoteEntityTracker::new(config());
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(0.0, 0.0), true)], 1_000);
        // 5 units in 100 ms = 50 units/s.
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(5.0, 0.0), true)], 1_100);

        let entity = tracker.get(ENEMY).unwrap();
        assert_eq!(entity.estimated_velocity, Vec2::new(50.0, 0.0));
    }

    #[test]
    fn velocity_denominator_is_floored_at_one_millisecond() {
        let mut tracker = RemoteEntityTracker::new(config());
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(0.0, 0.0), true)], 1_000);
        // Same timestamp; without the floor this would divide by zero.
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(2.0, 0.0), true)], 1_000);

        let entity = tracker.get(ENEMY).unwrap();
        assert_eq!(entity.estimated_velocity, Vec2::new(2_000.0, 0.0));
    }

    // ==========================================
    // Facing hysteresis
    // ==========================================

    #[test]
    fn facing_flips_only_beyond_epsilon() {
        let mut tracker = RemoteEntityTracker::new(config());
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(100.0, 0.0), true)], 1_000);
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(90.0, 0.0), true)], 1_100);
        assert!(!tracker.get(ENEMY).unwrap().facing_right);

        // A sub-epsilon wiggle to the right must not flip the facing back.
        let tiny = 90.0 + 1e-8;
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(tiny, 0.0), true)], 1_200);
        assert!(!tracker.get(ENEMY).unwrap().facing_right);

        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(120.0, 0.0), true)], 1_300);
        assert!(tracker.get(ENEMY).unwrap().facing_right);
    }

    // ==========================================
    // Display interpolation
    // ==========================================

    #[test]
    fn display_lerps_toward_target() {
        let cfg = config();
        let mut tracker = RemoteEntityTracker::new(cfg);
        tracker.apply_snapshot(&[update(ENEMY, Vec2::ZERO, true)], 1_000);
        // Move the target a sub-snap distance away.
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(4.0, 0.0), true)], 1_100);

        tracker.advance(0.016);
        let entity = tracker.get(ENEMY).unwrap();
        let expected = 4.0 * (0.016 * cfg.lerp_rate).clamp(0.0, 1.0);
        assert!((entity.display_position.x - expected).abs() < 1e-5);
        assert!(entity.display_position.x < 4.0);
    }

    #[test]
    fn display_snaps_across_teleports() {
        let cfg = config();
        let mut tracker = RemoteEntityTracker::new(cfg);
        tracker.apply_snapshot(&[update(ENEMY, Vec2::ZERO, true)], 1_000);
        let teleport = Vec2::new(cfg.snap_distance * 3.0, 0.0);
        tracker.apply_snapshot(&[update(ENEMY, teleport, true)], 1_100);

        tracker.advance(0.001);
        // Next tick's display position equals the target exactly.
        assert_eq!(tracker.get(ENEMY).unwrap().display_position, teleport);
    }

    #[test]
    fn large_dt_clamps_to_full_catchup_without_overshoot() {
        let mut tracker = RemoteEntityTracker::new(config());
        tracker.apply_snapshot(&[update(ENEMY, Vec2::ZERO, true)], 1_000);
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(3.0, 0.0), true)], 1_100);

        tracker.advance(10.0);
        assert_eq!(
            tracker.get(ENEMY).unwrap().display_position,
            Vec2::new(3.0, 0.0)
        );
    }

    #[test]
    fn dead_entities_stop_smoothing_but_keep_their_pose() {
        let mut tracker = RemoteEntityTracker::new(config());
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(5.0, 5.0), true)], 1_000);
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(8.0, 5.0), false)], 1_100);

        tracker.advance(0.5);
        let entity = tracker.get(ENEMY).unwrap();
        assert!(!entity.alive);
        // Display stays at the last rendered pose; no drift toward target.
        assert_eq!(entity.display_position, Vec2::new(5.0, 5.0));
    }

    // ==========================================
    // Stale expiry
    // ==========================================

    #[test]
    fn absent_entities_expire_after_the_limit() {
        let cfg = TrackerConfig {
            stale_snapshot_limit: 3,
            ..TrackerConfig::default()
        };
        let mut tracker = RemoteEntityTracker::new(cfg);
        tracker.apply_snapshot(&[update(ENEMY, Vec2::ZERO, true)], 1_000);

        for i in 0..3 {
            tracker.apply_snapshot(&[], 1_100 + i * 100);
            assert!(tracker.get(ENEMY).is_some(), "still within the limit");
        }
        tracker.apply_snapshot(&[], 1_500);
        assert!(tracker.get(ENEMY).is_none());
    }

    #[test]
    fn dead_entities_expire_after_the_limit() {
        let cfg = TrackerConfig {
            stale_snapshot_limit: 2,
            ..TrackerConfig::default()
        };
        let mut tracker = RemoteEntityTracker::new(cfg);
        tracker.apply_snapshot(&[update(ENEMY, Vec2::ZERO, true)], 1_000);
        for i in 0..2 {
            tracker.apply_snapshot(&[update(ENEMY, Vec2::ZERO, false)], 1_100 + i * 100);
            assert!(tracker.get(ENEMY).is_some());
        }
        tracker.apply_snapshot(&[update(ENEMY, Vec2::ZERO, false)], 1_400);
        assert!(tracker.get(ENEMY).is_none());
    }

    #[test]
    fn reappearing_entity_resets_the_miss_count() {
        let cfg = TrackerConfig {
            stale_snapshot_limit: 2,
            ..TrackerConfig::default()
        };
        let mut tracker = RemoteEntityTracker::new(cfg);
        tracker.apply_snapshot(&[update(ENEMY, Vec2::ZERO, true)], 1_000);
        tracker.apply_snapshot(&[], 1_100);
        tracker.apply_snapshot(&[], 1_200);
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(1.0, 0.0), true)], 1_300);
        tracker.apply_snapshot(&[], 1_400);
        assert!(tracker.get(ENEMY).is_some());
    }

    #[test]
    fn explicit_remove_returns_the_last_state() {
        let mut tracker = RemoteEntityTracker::new(config());
        tracker.apply_snapshot(&[update(ENEMY, Vec2::new(9.0, 9.0), true)], 1_000);
        let removed = tracker.remove(ENEMY).unwrap();
        assert_eq!(removed.target_position, Vec2::new(9.0, 9.0));
        assert!(tracker.is_empty());
    }

    // ==========================================
    // Mixed entity kinds
    // ==========================================

    #[test]
    fn players_and_enemies_share_the_tracker_without_collision() {
        let mut tracker = RemoteEntityTracker::new(config());
        tracker.apply_snapshot(
            &[
                update(EntityId::Player(1), Vec2::new(1.0, 0.0), true),
                update(EntityId::Enemy(1), Vec2::new(2.0, 0.0), true),
            ],
            1_000,
        );
        assert_eq!(tracker.len(), 2);
        assert_eq!(
            tracker.get(EntityId::Player(1)).unwrap().target_position.x,
            1.0
        );
        assert_eq!(
            tracker.get(EntityId::Enemy(1)).unwrap().target_position.x,
            2.0
        );
    }
}
