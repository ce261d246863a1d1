//! Binary codec for application payloads.
//!
//! Payloads ride inside the hand-packed wire envelope
//! ([`frame`](crate::network::frame)) and are serialized with bincode. The
//! bincode configuration lives here, in one place, so every payload in the
//! system is encoded identically.
//!
//! Fixed-int encoding keeps message sizes deterministic, which makes
//! bandwidth predictable and lets the transport size its reusable buffers
//! once.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

// One bincode configuration for the whole crate. Computed at compile time.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Errors that can occur while encoding or decoding a payload.
///
/// The underlying bincode errors are opaque (no structured failure reasons,
/// only `Display`), so the message is carried as a `String`. Payload codec
/// failures are exceptional - corrupted data or a protocol-version mismatch -
/// and never on a hot path where the allocation would matter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PayloadError {
    /// The encoding operation failed.
    Encode {
        /// The underlying bincode error message.
        message: String,
    },
    /// The decoding operation failed.
    Decode {
        /// The underlying bincode error message.
        message: String,
    },
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode { message } => write!(f, "payload encoding failed: {message}"),
            Self::Decode { message } => write!(f, "payload decoding failed: {message}"),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Result type for payload codec operations.
pub type PayloadResult<T> = Result<T, PayloadError>;

/// Encodes a value into a new `Vec<u8>`.
///
/// # Examples
///
/// ```
/// use bastion_netsync::network::codec::encode;
///
/// let bytes = encode(&42u32).expect("encoding should succeed");
/// assert!(!bytes.is_empty());
/// ```
pub fn encode<T: Serialize>(value: &T) -> PayloadResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config()).map_err(|e| PayloadError::Encode {
        message: e.to_string(),
    })
}

/// Decodes a value from a byte slice, ignoring any trailing bytes.
///
/// # Examples
///
/// ```
/// use bastion_netsync::network::codec::{decode_value, encode};
///
/// let bytes = encode(&42u32).expect("encoding should succeed");
/// let value: u32 = decode_value(&bytes).expect("decoding should succeed");
/// assert_eq!(value, 42);
/// ```
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> PayloadResult<T> {
    bincode::serde::decode_from_slice(bytes, config())
        .map(|(value, _)| value)
        .map_err(|e| PayloadError::Decode {
            message: e.to_string(),
        })
}
