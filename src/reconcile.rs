//! Server reconciliation: rewind-and-replay against authoritative snapshots.
//!
//! The server periodically broadcasts full state, including - for the local
//! player - the last input sequence it has applied. Reconciliation hard-
//! rewinds the predicted state to that authoritative baseline, replays every
//! still-unacknowledged command through the same deterministic
//! [`apply_locally`] used for original prediction, and prunes the
//! acknowledged prefix from the log.
//!
//! After a replay, the predicted state equals what plain prediction would
//! have produced had every input been applied in order starting from the
//! server's baseline; visual divergence is therefore bounded by one round
//! trip's worth of unacknowledged input.
//!
//! Replay uses a fixed timestep rather than wall-clock deltas so the result
//! is reproducible regardless of when the snapshot arrives.

use glam::Vec2;
use std::collections::VecDeque;
use tracing::{debug, trace};

use crate::input::InputCommand;
use crate::prediction::{apply_locally, PredictedState, UnconfirmedInputLog};
use crate::sessions::config::PredictionConfig;
use crate::InputSeq;

/// Capacity of the local-entity snapshot history ring.
pub const SNAPSHOT_HISTORY_CAPACITY: usize = 10;

/// The authoritative state of the local player extracted from one snapshot
/// broadcast. Transient: superseded by the next snapshot, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalSnapshot {
    /// Authoritative position.
    pub position: Vec2,
    /// Authoritative rotation in degrees.
    pub rotation: f32,
    /// Whether the local player is alive in this snapshot.
    pub alive: bool,
    /// The newest input sequence the server has applied, or `None` if it has
    /// not applied any.
    pub last_processed_input: Option<InputSeq>,
}

/// Bounded ring of the most recent local-entity snapshots.
///
/// Diagnostics and smoothing only - reconciliation correctness never reads
/// it.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHistory {
    entries: VecDeque<LocalSnapshot>,
}

impl SnapshotHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a snapshot, evicting the oldest once
    /// [`SNAPSHOT_HISTORY_CAPACITY`] is exceeded.
    pub fn push(&mut self, snapshot: LocalSnapshot) {
        self.entries.push_back(snapshot);
        while self.entries.len() > SNAPSHOT_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
    }

    /// The most recent snapshot, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&LocalSnapshot> {
        self.entries.back()
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &LocalSnapshot> + '_ {
        self.entries.iter()
    }

    /// Number of retained snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no snapshots have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns the predicted state and the unconfirmed-input log; the only thing
/// that mutates either.
#[derive(Debug)]
pub struct Reconciler {
    predicted: PredictedState,
    log: UnconfirmedInputLog,
    history: SnapshotHistory,
    config: PredictionConfig,
    has_baseline: bool,
}

impl Reconciler {
    /// Creates a reconciler with no baseline yet.
    #[must_use]
    pub fn new(config: PredictionConfig) -> Self {
        Self {
            predicted: PredictedState::default(),
            log: UnconfirmedInputLog::new(),
            history: SnapshotHistory::new(),
            config,
            has_baseline: false,
        }
    }

    /// Applies `command` to the predicted state for immediate feedback and
    /// appends it to the unconfirmed log.
    pub fn predict(&mut self, command: InputCommand, dt: f32) {
        self.predicted = apply_locally(self.predicted, &command, dt, &self.config);
        self.log.push(command);
    }

    /// Reconciles against one authoritative snapshot.
    ///
    /// Steps, in order: hard rewind to the snapshot pose (no blending),
    /// clamp into world bounds, replay every command newer than the
    /// acknowledged sequence at the fixed replay timestep, prune the
    /// acknowledged prefix, record the snapshot in the history ring.
    ///
    /// If the local player is reported dead, reconciliation for this tick is
    /// skipped entirely - no rewind, no pruning - and the position stays
    /// frozen until revival.
    pub fn apply_snapshot(&mut self, snapshot: &LocalSnapshot) {
        if !snapshot.alive {
            trace!("local player not alive in snapshot; skipping reconciliation");
            return;
        }

        self.predicted = PredictedState {
            position: self.config.bounds.clamp(snapshot.position),
            rotation: snapshot.rotation,
        };

        let timestep = self.config.replay_timestep;
        let mut replayed = 0usize;
        for command in self.log.commands_after(snapshot.last_processed_input) {
            self.predicted = apply_locally(self.predicted, command, timestep, &self.config);
            replayed += 1;
        }

        let pruned = self.log.acknowledge(snapshot.last_processed_input);
        self.history.push(*snapshot);
        self.has_baseline = true;

        debug!(
            ack = ?snapshot.last_processed_input.map(InputSeq::as_u32),
            replayed,
            pruned,
            remaining = self.log.len(),
            "reconciled against snapshot"
        );
    }

    /// The current predicted state.
    #[must_use]
    pub fn predicted(&self) -> PredictedState {
        self.predicted
    }

    /// The retained unconfirmed commands.
    #[must_use]
    pub fn unconfirmed(&self) -> &UnconfirmedInputLog {
        &self.log
    }

    /// The diagnostic snapshot history.
    #[must_use]
    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    /// Returns `true` once at least one live snapshot has been applied.
    ///
    /// Until then there is no authoritative baseline and predicted state is
    /// meaningless to render.
    #[must_use]
    pub fn has_baseline(&self) -> bool {
        self.has_baseline
    }
}
