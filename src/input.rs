//! Per-tick input sampling.
//!
//! Each simulation tick, the caller's input backend reports a
//! [`MovementIntent`]; the [`InputSampler`] stamps it with a strictly
//! increasing sequence number and a capture timestamp, producing the
//! immutable [`InputCommand`] that prediction, the unconfirmed log and the
//! wire all share.

use glam::Vec2;
use web_time::Instant;

use crate::InputSeq;

/// Raw movement intent for one tick, before sequencing.
///
/// `move_direction` is always unit-or-zero; the constructors normalize.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovementIntent {
    /// Unit-length movement direction, or zero when no movement is held.
    pub move_direction: Vec2,
    /// Whether the attack action was pressed this tick.
    pub attacking: bool,
}

impl MovementIntent {
    /// An intent with no movement and no attack.
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    /// Creates an intent from an arbitrary direction vector, normalizing it
    /// to unit-or-zero.
    #[must_use]
    pub fn new(direction: Vec2, attacking: bool) -> Self {
        Self {
            move_direction: normalize_or_zero(direction),
            attacking,
        }
    }

    /// Creates an intent from four directional key states (the usual
    /// WASD/arrow sampling), normalizing diagonals to unit length.
    #[must_use]
    pub fn from_axes(up: bool, down: bool, left: bool, right: bool) -> Self {
        let mut direction = Vec2::ZERO;
        if up {
            direction.y += 1.0;
        }
        if down {
            direction.y -= 1.0;
        }
        if left {
            direction.x -= 1.0;
        }
        if right {
            direction.x += 1.0;
        }
        Self {
            move_direction: normalize_or_zero(direction),
            attacking: false,
        }
    }

    /// Returns a copy with the attack flag set.
    #[must_use]
    pub fn with_attack(mut self, attacking: bool) -> Self {
        self.attacking = attacking;
        self
    }
}

fn normalize_or_zero(direction: Vec2) -> Vec2 {
    if direction.length_squared() > 1e-12 {
        direction.normalize()
    } else {
        Vec2::ZERO
    }
}

/// The seam between this crate and the platform input backend.
///
/// Rendering and windowing are out of scope here; whatever reads the
/// keyboard implements this and hands the result to
/// [`SyncSession::tick`](crate::SyncSession::tick) (or directly to an
/// [`InputSampler`]).
pub trait IntentSource {
    /// Samples the current movement intent.
    fn sample(&mut self) -> MovementIntent;
}

/// A sequenced, timestamped movement command. Immutable once created:
/// prediction and reconciliation read it, never modify it, and it is
/// retained in the unconfirmed log until a snapshot acknowledges it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputCommand {
    /// Session-unique, strictly increasing sequence number.
    pub seq: InputSeq,
    /// Unit-or-zero movement direction.
    pub move_direction: Vec2,
    /// Whether the attack action was pressed.
    pub attacking: bool,
    /// Milliseconds since the sampler was created, at capture time.
    pub captured_at_ms: u64,
}

/// Produces one [`InputCommand`] per simulation tick with a strictly
/// increasing sequence number - no gaps, no reuse.
#[derive(Debug)]
pub struct InputSampler {
    next_seq: InputSeq,
    epoch: Instant,
}

impl InputSampler {
    /// Creates a sampler starting at sequence 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_seq: InputSeq::new(0),
            epoch: Instant::now(),
        }
    }

    /// Stamps `intent` with the next sequence number and the capture time.
    pub fn sample(&mut self, intent: MovementIntent) -> InputCommand {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.next();
        InputCommand {
            seq,
            move_direction: intent.move_direction,
            attacking: intent.attacking,
            captured_at_ms: self.epoch.elapsed().as_millis() as u64,
        }
    }

    /// The sequence number the next sampled command will carry.
    #[must_use]
    pub fn next_seq(&self) -> InputSeq {
        self.next_seq
    }
}

impl Default for InputSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_strictly_increasing_without_gaps() {
        let mut sampler = InputSampler::new();
        for expected in 0..100u32 {
            let cmd = sampler.sample(MovementIntent::idle());
            assert_eq!(cmd.seq, InputSeq::new(expected));
        }
    }

    #[test]
    fn diagonal_intent_is_normalized() {
        let intent = MovementIntent::from_axes(true, false, false, true);
        assert!((intent.move_direction.length() - 1.0).abs() < 1e-6);
        assert!(intent.move_direction.x > 0.0);
        assert!(intent.move_direction.y > 0.0);
    }

    #[test]
    fn opposing_axes_cancel_to_zero() {
        let intent = MovementIntent::from_axes(true, true, false, false);
        assert_eq!(intent.move_direction, Vec2::ZERO);
    }

    #[test]
    fn idle_intent_is_zero() {
        let intent = MovementIntent::idle();
        assert_eq!(intent.move_direction, Vec2::ZERO);
        assert!(!intent.attacking);
    }

    #[test]
    fn arbitrary_direction_is_normalized() {
        let intent = MovementIntent::new(Vec2::new(10.0, 0.0), true);
        assert_eq!(intent.move_direction, Vec2::new(1.0, 0.0));
        assert!(intent.attacking);
    }

    #[test]
    fn capture_timestamps_never_decrease() {
        let mut sampler = InputSampler::new();
        let a = sampler.sample(MovementIntent::idle());
        let b = sampler.sample(MovementIntent::idle());
        assert!(b.captured_at_ms >= a.captured_at_ms);
    }

    #[test]
    fn intent_source_is_object_safe() {
        struct Scripted(Vec<MovementIntent>);
        impl IntentSource for Scripted {
            fn sample(&mut self) -> MovementIntent {
                self.0.pop().unwrap_or_default()
            }
        }
        let mut source: Box<dyn IntentSource> =
            Box::new(Scripted(vec![MovementIntent::from_axes(false, false, false, true)]));
        let mut sampler = InputSampler::new();
        let cmd = sampler.sample(source.sample());
        assert_eq!(cmd.move_direction, Vec2::new(1.0, 0.0));
    }
}
