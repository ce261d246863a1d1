//! # Bastion Netsync
//!
//! Bastion Netsync is the movement-synchronization layer of a snapshot-driven
//! multiplayer action client, written in 100% safe Rust. It reconciles
//! locally-predicted player motion against authoritative server snapshots
//! arriving over a deliberately lossy UDP channel, while remote entities are
//! dead-reckoned and smoothly interpolated toward their latest known
//! positions.
//!
//! The crate covers three tightly coupled pieces:
//!
//! - **Session framing** ([`network`]): a fixed-header UDP envelope with a
//!   HELLO/PACKET handshake, identity demultiplexing and unbounded-by-default
//!   HELLO retry, so a single connectionless socket serves as a per-match
//!   channel through NAT.
//! - **Prediction and reconciliation** ([`prediction`], [`reconcile`]): every
//!   sampled input is applied locally for immediate feedback and logged as
//!   unconfirmed; each authoritative snapshot rewinds local state and replays
//!   the still-unacknowledged tail, bounding visual divergence to one
//!   round-trip's worth of input.
//! - **Remote entity tracking** ([`tracker`]): velocity-estimated dead
//!   reckoning with exponential smoothing toward the latest server position,
//!   snapping across teleports.
//!
//! The pieces are wired together by [`SyncSession`], built via
//! [`SessionBuilder`]:
//!
//! ```no_run
//! use bastion_netsync::{MovementIntent, SessionBuilder, SessionIdentity};
//!
//! # fn main() -> Result<(), bastion_netsync::NetsyncError> {
//! let mut session = SessionBuilder::new().start("203.0.113.7", 7777)?;
//! // The (player_id, room_id, token) triple comes from the reliable
//! // control channel once the match starts.
//! session.join(SessionIdentity::new(3, 1, "match-token"))?;
//!
//! loop {
//!     let intent = MovementIntent::from_axes(true, false, false, false);
//!     for event in session.tick(intent, 1.0 / 60.0) {
//!         println!("{event:?}");
//!     }
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The network thread and the simulation thread only ever meet at a bounded
//! event queue; see [`network::queue`] for the handoff contract.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use error::NetsyncError;
pub use input::{InputCommand, InputSampler, IntentSource, MovementIntent};
pub use network::frame::{DecodedFrame, FrameError, FrameType, SessionIdentity};
pub use network::messages::{AppMessage, ClientInput, EnemyState, PlayerState, StateSync};
pub use network::queue::{InboundQueue, TransportEvent};
pub use network::transport::{SessionTransport, TransportState};
pub use prediction::{apply_locally, PredictedState, UnconfirmedInputLog, WorldBounds};
pub use reconcile::{LocalSnapshot, Reconciler, SnapshotHistory, SNAPSHOT_HISTORY_CAPACITY};
pub use sessions::builder::SessionBuilder;
pub use sessions::config::{PredictionConfig, TrackerConfig, TransportConfig};
pub use sessions::sync_session::{SessionEvent, SyncSession};
pub use tracker::{EntityId, RemoteEntityState, RemoteEntityTracker, RemoteUpdate};

pub mod error;
pub mod input;
pub mod prediction;
pub mod reconcile;
pub mod tracker;

/// Wire protocol: envelope framing, payload codec, transport and the
/// network-to-simulation handoff queue.
pub mod network {
    pub mod codec;
    pub mod frame;
    pub mod messages;
    pub mod queue;
    pub mod transport;
}

/// Session assembly: configuration types, the session builder and the
/// per-tick simulation facade.
pub mod sessions {
    pub mod builder;
    pub mod config;
    pub mod sync_session;
}

// #############
// # CORE TYPE #
// #############

/// A monotonically increasing input sequence number.
///
/// Every [`InputCommand`] sampled during a session carries a strictly
/// increasing `InputSeq` (no gaps, no reuse). Snapshot acknowledgments refer
/// to these numbers: a snapshot acknowledging sequence `K` confirms every
/// command with `seq <= K`, and the unconfirmed-input log retains exactly the
/// commands with `seq > K`.
///
/// "Nothing acknowledged yet" is represented as `Option<InputSeq>` = `None`
/// rather than a sentinel value.
///
/// # Examples
///
/// ```
/// use bastion_netsync::InputSeq;
///
/// let first = InputSeq::new(0);
/// let second = first.next();
/// assert!(second > first);
/// assert_eq!(second.as_u32(), 1);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct InputSeq(u32);

impl InputSeq {
    /// Creates a new `InputSeq` from a raw `u32` value.
    #[inline]
    #[must_use]
    pub const fn new(seq: u32) -> Self {
        InputSeq(seq)
    }

    /// Returns the underlying `u32` value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the sequence number following this one.
    ///
    /// Wraps on `u32::MAX`; at one input per simulation tick a session would
    /// need to run for years to get there.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        InputSeq(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for InputSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
