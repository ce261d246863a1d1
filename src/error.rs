//! The crate-level error type.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// This enum contains the error values returned by this library's fallible
/// API surface. Wire-level decode failures use the dedicated
/// [`FrameError`](crate::network::frame::FrameError) and
/// [`PayloadError`](crate::network::codec::PayloadError) types instead, since
/// those are dropped at the transport boundary rather than propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetsyncError {
    /// A network socket operation failed (bind, connect, configure).
    Socket {
        /// A description of the socket error.
        context: String,
    },
    /// The provided session identity is invalid. Player ids must be positive
    /// and room ids non-negative.
    InvalidIdentity {
        /// The offending player id.
        player_id: i32,
        /// The offending room id.
        room_id: i32,
    },
    /// The session token exceeds the wire limit of 65535 UTF-8 bytes.
    TokenTooLong {
        /// The actual token length in bytes.
        len: usize,
    },
    /// The transport is not running; the requested operation needs a started
    /// session.
    NotRunning,
    /// An integer configuration value is outside its permitted range.
    ConfigOutOfRange {
        /// The configuration field name.
        field: &'static str,
        /// The minimum permitted value.
        min: u64,
        /// The maximum permitted value.
        max: u64,
        /// The value that was provided.
        actual: u64,
    },
    /// A configuration value is invalid for a reason other than an integer
    /// range (non-finite floats, inverted bounds).
    ConfigInvalid {
        /// The configuration field name.
        field: &'static str,
        /// A description of why the value is invalid.
        detail: String,
    },
}

impl Display for NetsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetsyncError::Socket { context } => {
                write!(f, "Socket error: {}", context)
            }
            NetsyncError::InvalidIdentity { player_id, room_id } => {
                write!(
                    f,
                    "Invalid session identity: player_id={} (must be > 0), room_id={} (must be >= 0)",
                    player_id, room_id
                )
            }
            NetsyncError::TokenTooLong { len } => {
                write!(
                    f,
                    "Session token is {} bytes; the wire format allows at most 65535",
                    len
                )
            }
            NetsyncError::NotRunning => {
                write!(f, "The session transport is not running.")
            }
            NetsyncError::ConfigOutOfRange {
                field,
                min,
                max,
                actual,
            } => {
                write!(
                    f,
                    "Configuration value {} = {} is out of range [{}, {}]",
                    field, actual, min, max
                )
            }
            NetsyncError::ConfigInvalid { field, detail } => {
                write!(f, "Configuration value {} is invalid: {}", field, detail)
            }
        }
    }
}

impl Error for NetsyncError {}
