//! Client-side prediction: the deterministic movement function and the
//! unconfirmed-input log.
//!
//! Prediction applies every sampled command to local state immediately, so
//! the player sees their motion without waiting a round trip. The same
//! function, [`apply_locally`], is reused verbatim by reconciliation replay -
//! its determinism is what makes rewind-and-replay observationally equivalent
//! to having predicted from the server's baseline in the first place.

use glam::Vec2;
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::warn;

use crate::input::InputCommand;
use crate::sessions::config::PredictionConfig;
use crate::InputSeq;

/// An axis-aligned rectangle positions are clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    /// Minimum corner (inclusive).
    pub min: Vec2,
    /// Maximum corner (inclusive).
    pub max: Vec2,
}

impl WorldBounds {
    /// Creates bounds from two corners.
    #[must_use]
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Clamps `position` into the bounds, component-wise.
    #[must_use]
    pub fn clamp(&self, position: Vec2) -> Vec2 {
        position.clamp(self.min, self.max)
    }

    /// Returns `true` if `position` lies inside the bounds.
    #[must_use]
    pub fn contains(&self, position: Vec2) -> bool {
        position == self.clamp(position)
    }
}

/// The locally predicted pose of the player: the authoritative baseline plus
/// every unconfirmed input applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PredictedState {
    /// Predicted position.
    pub position: Vec2,
    /// Predicted facing rotation in degrees.
    pub rotation: f32,
}

/// Applies one command to a predicted state.
///
/// Pure and deterministic: the output depends only on the
/// `(state, command, dt)` triple and the configuration. A non-zero move
/// direction advances the position by `direction * move_speed * dt` and
/// clamps it into the world bounds; a zero direction leaves the state
/// untouched.
///
/// Replay correctness depends on this determinism, which is pinned by tests.
#[must_use]
pub fn apply_locally(
    state: PredictedState,
    command: &InputCommand,
    dt: f32,
    config: &PredictionConfig,
) -> PredictedState {
    if command.move_direction.length_squared() > config.move_epsilon {
        let position = state.position + command.move_direction * config.move_speed * dt;
        PredictedState {
            position: config.bounds.clamp(position),
            rotation: state.rotation,
        }
    } else {
        state
    }
}

/// The ordered log of commands not yet acknowledged by any snapshot.
///
/// Keyed by sequence number, so iteration order is sequence order. The
/// invariant maintained by [`acknowledge`](Self::acknowledge) is that the log
/// only ever contains commands with `seq` greater than the last acknowledged
/// sequence; entries are removed exactly once.
#[derive(Debug, Clone, Default)]
pub struct UnconfirmedInputLog {
    entries: BTreeMap<InputSeq, InputCommand>,
}

impl UnconfirmedInputLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    ///
    /// The sampler guarantees strictly increasing sequences; a command that
    /// does not extend the log is a caller bug and is dropped with a warning
    /// rather than corrupting the order invariant.
    pub fn push(&mut self, command: InputCommand) {
        if let Some((&last, _)) = self.entries.last_key_value() {
            if command.seq <= last {
                warn!(
                    seq = command.seq.as_u32(),
                    last = last.as_u32(),
                    "dropping out-of-order input command"
                );
                return;
            }
        }
        self.entries.insert(command.seq, command);
    }

    /// Iterates, in ascending sequence order, over the commands newer than
    /// `ack` (all commands when `ack` is `None`).
    pub fn commands_after(
        &self,
        ack: Option<InputSeq>,
    ) -> impl Iterator<Item = &InputCommand> + '_ {
        let lower = match ack {
            None => Bound::Unbounded,
            Some(seq) => Bound::Excluded(seq),
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .map(|(_, command)| command)
    }

    /// Removes every command with `seq <= ack`, returning how many were
    /// removed. A `None` acknowledgment removes nothing.
    pub fn acknowledge(&mut self, ack: Option<InputSeq>) -> usize {
        let Some(ack) = ack else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|seq, _| *seq > ack);
        before - self.entries.len()
    }

    /// Iterates over all retained commands in ascending sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &InputCommand> + '_ {
        self.entries.values()
    }

    /// The oldest retained sequence, if any.
    #[must_use]
    pub fn first_seq(&self) -> Option<InputSeq> {
        self.entries.keys().next().copied()
    }

    /// The newest retained sequence, if any.
    #[must_use]
    pub fn last_seq(&self) -> Option<InputSeq> {
        self.entries.keys().next_back().copied()
    }

    /// Number of retained commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no commands are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
