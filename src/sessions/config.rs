//! Configuration types for the transport, prediction and tracking layers.
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `TransportConfig` | Socket timeouts and HELLO retry | `lan()`, `high_latency()` |
//! | `PredictionConfig` | Movement model and world bounds | — |
//! | `TrackerConfig` | Remote-entity interpolation | `responsive()`, `smooth()` |
//!
//! Every config has a `Default` that works for typical conditions and a
//! `validate()` that the builder runs before starting a session.

use glam::Vec2;
use web_time::Duration;

use crate::network::queue::DEFAULT_QUEUE_CAPACITY;
use crate::prediction::WorldBounds;
use crate::NetsyncError;

/// Configuration for the UDP session transport.
///
/// # Forward Compatibility
///
/// New fields may be added in future versions; construct instances with the
/// `..TransportConfig::default()` pattern.
///
/// # Example
///
/// ```
/// use bastion_netsync::TransportConfig;
/// use web_time::Duration;
///
/// // For a flaky WAN, retry HELLO less aggressively
/// let config = TransportConfig {
///     hello_retry_interval: Duration::from_millis(1000),
///     ..TransportConfig::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "TransportConfig has no effect unless passed to a transport or SessionBuilder"]
pub struct TransportConfig {
    /// Bounded timeout of each socket receive. This is also the cadence at
    /// which the receive loop checks liveness (HELLO retry, stop flag), so
    /// very large values make teardown and retries sluggish.
    ///
    /// Default: 250ms
    pub receive_timeout: Duration,

    /// Minimum time between HELLO transmissions while no inbound traffic
    /// has acknowledged the session.
    ///
    /// Default: 500ms
    pub hello_retry_interval: Duration,

    /// Maximum number of HELLO transmissions before giving up.
    ///
    /// `None` (the default) retries indefinitely: UDP has no connection
    /// concept and the peer address may become reachable at any time. A
    /// finite budget emits one
    /// [`HelloRetriesExhausted`](crate::TransportEvent::HelloRetriesExhausted)
    /// event when spent and stops retrying; inbound traffic still
    /// establishes the session afterwards.
    ///
    /// Default: `None`
    pub max_hello_retries: Option<u32>,

    /// Size of the receive buffer; datagrams larger than this are truncated
    /// by the OS and will fail frame decoding.
    ///
    /// Default: 4096
    pub recv_buffer_size: usize,

    /// Capacity of the inbound event queue between the network thread and
    /// the simulation thread.
    ///
    /// Default: 256
    pub inbound_queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_millis(250),
            hello_retry_interval: Duration::from_millis(500),
            max_hello_retries: None,
            recv_buffer_size: 4096,
            inbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl TransportConfig {
    /// Creates a new `TransportConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for LAN play: tight timeouts, fast handshake.
    pub fn lan() -> Self {
        Self {
            receive_timeout: Duration::from_millis(100),
            hello_retry_interval: Duration::from_millis(250),
            ..Self::default()
        }
    }

    /// Preset for high-latency connections: longer intervals to avoid
    /// flooding a slow path with retries.
    pub fn high_latency() -> Self {
        Self {
            receive_timeout: Duration::from_millis(500),
            hello_retry_interval: Duration::from_millis(1000),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// [`NetsyncError::ConfigOutOfRange`] when a value is outside its
    /// permitted range.
    pub fn validate(&self) -> Result<(), NetsyncError> {
        range_check(
            "receive_timeout",
            self.receive_timeout.as_millis() as u64,
            1,
            10_000,
        )?;
        range_check(
            "hello_retry_interval",
            self.hello_retry_interval.as_millis() as u64,
            1,
            60_000,
        )?;
        if let Some(max) = self.max_hello_retries {
            range_check("max_hello_retries", u64::from(max), 1, u64::from(u32::MAX))?;
        }
        range_check(
            "recv_buffer_size",
            self.recv_buffer_size as u64,
            128,
            65_536,
        )?;
        range_check(
            "inbound_queue_capacity",
            self.inbound_queue_capacity as u64,
            1,
            65_536,
        )?;
        Ok(())
    }
}

/// Configuration for local movement prediction and replay.
///
/// The same values drive original prediction and reconciliation replay; they
/// must match what the server simulates or predicted and authoritative
/// motion will diverge on every snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "PredictionConfig has no effect unless passed to a Reconciler or SessionBuilder"]
pub struct PredictionConfig {
    /// Movement speed in world units per second.
    ///
    /// Default: 200.0
    pub move_speed: f32,

    /// World rectangle positions are clamped into.
    ///
    /// Default: (0, 0) .. (1280, 720)
    pub bounds: WorldBounds,

    /// Fixed timestep used when replaying unconfirmed commands. Replay must
    /// be reproducible independent of wall-clock time, so it never uses
    /// frame deltas.
    ///
    /// Default: 1/60 s
    pub replay_timestep: f32,

    /// Squared-length threshold below which a move direction counts as
    /// zero.
    ///
    /// Default: 0.1
    pub move_epsilon: f32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            move_speed: 200.0,
            bounds: WorldBounds::new(Vec2::ZERO, Vec2::new(1280.0, 720.0)),
            replay_timestep: 1.0 / 60.0,
            move_epsilon: 0.1,
        }
    }
}

impl PredictionConfig {
    /// Creates a new `PredictionConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// [`NetsyncError::ConfigInvalid`] for non-finite or non-positive
    /// values, or inverted world bounds.
    pub fn validate(&self) -> Result<(), NetsyncError> {
        positive_finite("move_speed", self.move_speed)?;
        positive_finite("replay_timestep", self.replay_timestep)?;
        if !self.move_epsilon.is_finite() || self.move_epsilon < 0.0 {
            return Err(NetsyncError::ConfigInvalid {
                field: "move_epsilon",
                detail: format!("must be finite and non-negative, got {}", self.move_epsilon),
            });
        }
        let WorldBounds { min, max } = self.bounds;
        if !(min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()) {
            return Err(NetsyncError::ConfigInvalid {
                field: "bounds",
                detail: "bounds must be finite".to_owned(),
            });
        }
        if min.x > max.x || min.y > max.y {
            return Err(NetsyncError::ConfigInvalid {
                field: "bounds",
                detail: format!("min {min} exceeds max {max}"),
            });
        }
        Ok(())
    }
}

/// Configuration for remote-entity dead reckoning and interpolation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "TrackerConfig has no effect unless passed to a tracker or SessionBuilder"]
pub struct TrackerConfig {
    /// Exponential smoothing rate: per render tick the display position
    /// moves `clamp(dt * lerp_rate, 0, 1)` of the way to the target.
    ///
    /// Default: 10.0
    pub lerp_rate: f32,

    /// Distance beyond which a target change is treated as a teleport and
    /// the display position jumps instead of gliding.
    ///
    /// Default: 6.0
    pub snap_distance: f32,

    /// Horizontal-velocity magnitude below which facing does not flip,
    /// so jitter around zero cannot make the sprite flicker.
    ///
    /// Default: 1e-4
    pub facing_epsilon: f32,

    /// Number of consecutive snapshots an entity may be dead or absent
    /// before it is dropped from the tracker.
    ///
    /// Default: 30
    pub stale_snapshot_limit: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            lerp_rate: 10.0,
            snap_distance: 6.0,
            facing_epsilon: 1e-4,
            stale_snapshot_limit: 30,
        }
    }
}

impl TrackerConfig {
    /// Creates a new `TrackerConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset favoring responsiveness: faster catch-up, earlier snapping.
    /// Suits fast-paced play where position accuracy beats smoothness.
    pub fn responsive() -> Self {
        Self {
            lerp_rate: 16.0,
            snap_distance: 4.0,
            ..Self::default()
        }
    }

    /// Preset favoring smoothness: slower catch-up, more tolerance before
    /// snapping. Suits slower games or spectating.
    pub fn smooth() -> Self {
        Self {
            lerp_rate: 6.0,
            snap_distance: 10.0,
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// [`NetsyncError::ConfigInvalid`] /
    /// [`NetsyncError::ConfigOutOfRange`] for out-of-range values.
    pub fn validate(&self) -> Result<(), NetsyncError> {
        positive_finite("lerp_rate", self.lerp_rate)?;
        positive_finite("snap_distance", self.snap_distance)?;
        if !self.facing_epsilon.is_finite() || self.facing_epsilon < 0.0 {
            return Err(NetsyncError::ConfigInvalid {
                field: "facing_epsilon",
                detail: format!(
                    "must be finite and non-negative, got {}",
                    self.facing_epsilon
                ),
            });
        }
        range_check(
            "stale_snapshot_limit",
            u64::from(self.stale_snapshot_limit),
            1,
            100_000,
        )?;
        Ok(())
    }
}

fn range_check(field: &'static str, actual: u64, min: u64, max: u64) -> Result<(), NetsyncError> {
    if actual < min || actual > max {
        return Err(NetsyncError::ConfigOutOfRange {
            field,
            min,
            max,
            actual,
        });
    }
    Ok(())
}

fn positive_finite(field: &'static str, value: f32) -> Result<(), NetsyncError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(NetsyncError::ConfigInvalid {
            field,
            detail: format!("must be finite and positive, got {value}"),
        });
    }
    Ok(())
}
