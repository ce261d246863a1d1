//! Wire envelope codec for the UDP session framing protocol.
//!
//! Every datagram exchanged with the game server is a single frame with a
//! fixed big-endian header carrying the sender's session identity, followed
//! by an opaque payload:
//!
//! ```text
//! | magic:4B | frameType:1B | playerId:4B | roomId:4B | tokenLen:2B | token | payloadLen:4B | payload |
//! |   u32    |      u8      |     i32     |    i32    |     u16     | bytes |      i32      |  bytes  |
//! ```
//!
//! Two frame types exist: [`FrameType::Hello`] (empty payload, establishes or
//! refreshes the session binding and teaches the server the client's return
//! address) and [`FrameType::Packet`] (carries one application message).
//!
//! # Fail-closed decoding
//!
//! UDP datagrams may be corrupted, truncated, reordered or forged, so
//! [`decode`] never accepts a partial frame: any magic mismatch, truncated
//! header, unknown frame type, or `tokenLen`/`payloadLen` exceeding the
//! remaining bytes yields a [`FrameError`] and the datagram is dropped by the
//! caller. Bytes trailing a complete frame are ignored.

use crate::NetsyncError;

/// The 4-byte protocol constant leading every frame ("BNSY").
///
/// A fixed magic lets the receive path cheaply discard datagrams that were
/// never produced by this protocol (port scans, stray traffic).
pub const FRAME_MAGIC: u32 = 0x424E_5359;

/// Fixed header size: every field except the variable-length token and
/// payload bodies.
pub const FRAME_HEADER_LEN: usize = 4 + 1 + 4 + 4 + 2 + 4;

/// Maximum token length representable by the 2-byte length prefix.
pub const MAX_TOKEN_LEN: usize = u16::MAX as usize;

/// The type discriminator of a wire frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Session binding frame. Empty payload; sent on session configuration
    /// and retried until any inbound traffic acknowledges the binding.
    Hello = 1,
    /// Application data frame. The payload is one encoded
    /// [`AppMessage`](crate::network::messages::AppMessage).
    Packet = 2,
}

impl FrameType {
    /// Returns the wire byte for this frame type.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a wire byte into a frame type, if known.
    #[inline]
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(FrameType::Hello),
            2 => Some(FrameType::Packet),
            _ => None,
        }
    }
}

/// The identity triple binding a socket to a match: set once per join,
/// immutable for the session's lifetime, and carried on every outbound frame.
///
/// The triple is issued by the reliable control channel when the client
/// becomes part of a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    /// The server-assigned player id. Valid ids are positive.
    pub player_id: i32,
    /// The room this session belongs to. Valid ids are non-negative.
    pub room_id: i32,
    /// Opaque session token (UTF-8, at most 65535 bytes on the wire).
    pub token: String,
}

impl SessionIdentity {
    /// Creates a new identity triple.
    pub fn new(player_id: i32, room_id: i32, token: impl Into<String>) -> Self {
        Self {
            player_id,
            room_id,
            token: token.into(),
        }
    }

    /// Returns `true` if this identity may be placed on the wire.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.player_id > 0 && self.room_id >= 0 && self.token.len() <= MAX_TOKEN_LEN
    }

    /// Validates this identity.
    ///
    /// # Errors
    ///
    /// [`NetsyncError::InvalidIdentity`] for non-positive player ids or
    /// negative room ids, [`NetsyncError::TokenTooLong`] for oversized tokens.
    pub fn validate(&self) -> Result<(), NetsyncError> {
        if self.player_id <= 0 || self.room_id < 0 {
            return Err(NetsyncError::InvalidIdentity {
                player_id: self.player_id,
                room_id: self.room_id,
            });
        }
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(NetsyncError::TokenTooLong {
                len: self.token.len(),
            });
        }
        Ok(())
    }
}

/// The reason a frame failed to encode or decode.
///
/// Decode-side variants all mean the same thing operationally: drop the
/// datagram and keep receiving. They are distinguished so tests and trace
/// logs can tell corruption modes apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The leading 4 bytes were not [`FRAME_MAGIC`].
    BadMagic {
        /// The value actually found.
        found: u32,
    },
    /// The datagram ended before a fixed header field.
    Truncated {
        /// Bytes needed by the field being read.
        needed: usize,
        /// Bytes actually remaining.
        remaining: usize,
    },
    /// The frame type byte is not a known discriminator.
    UnknownFrameType {
        /// The byte actually found.
        found: u8,
    },
    /// The declared token length exceeds the remaining bytes.
    TokenOverrun {
        /// The declared token length.
        token_len: usize,
        /// Bytes actually remaining.
        remaining: usize,
    },
    /// The declared payload length is negative or exceeds the remaining
    /// bytes.
    PayloadOverrun {
        /// The declared payload length (kept signed to show negatives).
        payload_len: i64,
        /// Bytes actually remaining.
        remaining: usize,
    },
    /// The token bytes are not valid UTF-8.
    TokenNotUtf8,
    /// Encode-side: the token does not fit the 2-byte length prefix.
    TokenTooLong {
        /// The token length in bytes.
        len: usize,
    },
    /// Encode-side: the payload length does not fit the signed 4-byte length
    /// prefix.
    PayloadTooLarge {
        /// The payload length in bytes.
        len: usize,
    },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::BadMagic { found } => {
                write!(f, "bad frame magic 0x{found:08X}")
            }
            FrameError::Truncated { needed, remaining } => {
                write!(
                    f,
                    "truncated frame: needed {needed} bytes, {remaining} remaining"
                )
            }
            FrameError::UnknownFrameType { found } => {
                write!(f, "unknown frame type {found}")
            }
            FrameError::TokenOverrun {
                token_len,
                remaining,
            } => {
                write!(
                    f,
                    "token length {token_len} exceeds {remaining} remaining bytes"
                )
            }
            FrameError::PayloadOverrun {
                payload_len,
                remaining,
            } => {
                write!(
                    f,
                    "payload length {payload_len} invalid for {remaining} remaining bytes"
                )
            }
            FrameError::TokenNotUtf8 => write!(f, "token is not valid UTF-8"),
            FrameError::TokenTooLong { len } => {
                write!(f, "token of {len} bytes exceeds the wire maximum {MAX_TOKEN_LEN}")
            }
            FrameError::PayloadTooLarge { len } => {
                write!(f, "payload of {len} bytes exceeds the signed 32-bit length prefix")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// A successfully decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// The frame type discriminator.
    pub frame_type: FrameType,
    /// The sender's identity as declared in the header.
    pub identity: SessionIdentity,
    /// The opaque payload bytes (empty for HELLO frames).
    pub payload: Vec<u8>,
}

/// Encodes a frame into a new byte vector.
///
/// For the transport's send path, which reuses one buffer under the send
/// lock, prefer [`encode_into`].
///
/// # Errors
///
/// [`FrameError::TokenTooLong`] / [`FrameError::PayloadTooLarge`] when a
/// length prefix would overflow. Identity *values* are not validated here;
/// that is the transport's admission check.
pub fn encode(
    frame_type: FrameType,
    identity: &SessionIdentity,
    payload: &[u8],
) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::new();
    encode_into(&mut buf, frame_type, identity, payload)?;
    Ok(buf)
}

/// Encodes a frame into `buf`, clearing it first.
///
/// # Errors
///
/// See [`encode`].
pub fn encode_into(
    buf: &mut Vec<u8>,
    frame_type: FrameType,
    identity: &SessionIdentity,
    payload: &[u8],
) -> Result<(), FrameError> {
    let token = identity.token.as_bytes();
    if token.len() > MAX_TOKEN_LEN {
        return Err(FrameError::TokenTooLong { len: token.len() });
    }
    let payload_len =
        i32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
            len: payload.len(),
        })?;

    buf.clear();
    buf.reserve(FRAME_HEADER_LEN + token.len() + payload.len());
    buf.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
    buf.push(frame_type.as_u8());
    buf.extend_from_slice(&identity.player_id.to_be_bytes());
    buf.extend_from_slice(&identity.room_id.to_be_bytes());
    buf.extend_from_slice(&(token.len() as u16).to_be_bytes());
    buf.extend_from_slice(token);
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(())
}

/// Decodes one frame from the start of `bytes`.
///
/// Bytes trailing the declared payload are ignored; datagram transports may
/// pad.
///
/// # Errors
///
/// Any malformation yields a [`FrameError`]; no partial frame is ever
/// returned.
pub fn decode(bytes: &[u8]) -> Result<DecodedFrame, FrameError> {
    let mut reader = Reader::new(bytes);

    let magic = reader.read_u32()?;
    if magic != FRAME_MAGIC {
        return Err(FrameError::BadMagic { found: magic });
    }

    let type_byte = reader.read_u8()?;
    let frame_type =
        FrameType::from_u8(type_byte).ok_or(FrameError::UnknownFrameType { found: type_byte })?;

    let player_id = reader.read_i32()?;
    let room_id = reader.read_i32()?;

    let token_len = reader.read_u16()? as usize;
    if token_len > reader.remaining() {
        return Err(FrameError::TokenOverrun {
            token_len,
            remaining: reader.remaining(),
        });
    }
    let token_bytes = reader.read_bytes(token_len)?;
    let token = std::str::from_utf8(token_bytes)
        .map_err(|_| FrameError::TokenNotUtf8)?
        .to_owned();

    let payload_len = reader.read_i32()?;
    if payload_len < 0 || payload_len as usize > reader.remaining() {
        return Err(FrameError::PayloadOverrun {
            payload_len: i64::from(payload_len),
            remaining: reader.remaining(),
        });
    }
    let payload = reader.read_bytes(payload_len as usize)?.to_vec();

    Ok(DecodedFrame {
        frame_type,
        identity: SessionIdentity {
            player_id,
            room_id,
            token,
        },
        payload,
    })
}

/// Bounds-checked big-endian cursor over a received datagram.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FrameError> {
        if self.remaining() < len {
            return Err(FrameError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, FrameError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, FrameError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, FrameError> {
        let bytes = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity::new(7, 2, "session-token")
    }

    // ==========================================
    // Round-trip
    // ==========================================

    #[test]
    fn packet_frame_roundtrip() {
        let payload = b"opaque application bytes";
        let bytes = encode(FrameType::Packet, &identity(), payload).unwrap();
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.frame_type, FrameType::Packet);
        assert_eq!(frame.identity, identity());
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn hello_frame_roundtrip_empty_payload() {
        let bytes = encode(FrameType::Hello, &identity(), &[]).unwrap();
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.frame_type, FrameType::Hello);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn empty_token_roundtrip() {
        let id = SessionIdentity::new(1, 0, "");
        let bytes = encode(FrameType::Packet, &id, b"x").unwrap();
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.identity.token, "");
    }

    #[test]
    fn negative_ids_survive_the_wire() {
        // Identity validation is the transport's admission check, not the
        // codec's; a forged frame with negative ids must still parse so the
        // server side of this layout can inspect and reject it.
        let id = SessionIdentity::new(-3, -1, "t");
        let bytes = encode(FrameType::Packet, &id, b"p").unwrap();
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.identity.player_id, -3);
        assert_eq!(frame.identity.room_id, -1);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = encode(FrameType::Packet, &identity(), b"abc").unwrap();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.payload, b"abc");
    }

    #[test]
    fn encode_into_reuses_buffer() {
        let mut buf = vec![0xFF; 512];
        encode_into(&mut buf, FrameType::Hello, &identity(), &[]).unwrap();
        let first_len = buf.len();
        assert_eq!(decode(&buf).unwrap().frame_type, FrameType::Hello);

        encode_into(&mut buf, FrameType::Packet, &identity(), b"pp").unwrap();
        assert_eq!(decode(&buf).unwrap().payload, b"pp");
        assert!(buf.len() > first_len);
    }

    // ==========================================
    // Fail-closed decoding
    // ==========================================

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode(FrameType::Packet, &identity(), b"abc").unwrap();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            decode(&bytes),
            Err(FrameError::BadMagic { .. })
        ));
    }

    #[test]
    fn rejects_every_truncation() {
        let bytes = encode(FrameType::Packet, &identity(), b"payload").unwrap();
        for cut in 1..bytes.len() {
            let truncated = &bytes[..bytes.len() - cut];
            assert!(
                decode(truncated).is_err(),
                "truncating {} bytes must fail closed",
                cut
            );
        }
    }

    #[test]
    fn rejects_unknown_frame_type() {
        let mut bytes = encode(FrameType::Packet, &identity(), b"abc").unwrap();
        bytes[4] = 99;
        assert_eq!(
            decode(&bytes),
            Err(FrameError::UnknownFrameType { found: 99 })
        );
    }

    #[test]
    fn rejects_token_overrun() {
        let mut bytes = encode(FrameType::Packet, &SessionIdentity::new(1, 0, "ab"), b"p").unwrap();
        // Token length prefix sits after magic(4) + type(1) + ids(8).
        bytes[13] = 0xFF;
        bytes[14] = 0xFF;
        assert!(matches!(
            decode(&bytes),
            Err(FrameError::TokenOverrun { .. })
        ));
    }

    #[test]
    fn rejects_negative_payload_length() {
        let id = SessionIdentity::new(1, 0, "");
        let mut bytes = encode(FrameType::Packet, &id, &[]).unwrap();
        // Payload length prefix is the last 4 header bytes for an empty token.
        let len_offset = bytes.len() - 4;
        bytes[len_offset..].copy_from_slice(&(-5i32).to_be_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(FrameError::PayloadOverrun { payload_len: -5, .. })
        ));
    }

    #[test]
    fn rejects_payload_overrun() {
        let id = SessionIdentity::new(1, 0, "");
        let mut bytes = encode(FrameType::Packet, &id, b"abc").unwrap();
        let len_offset = bytes.len() - 3 - 4;
        bytes[len_offset..len_offset + 4].copy_from_slice(&100i32.to_be_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(FrameError::PayloadOverrun { payload_len: 100, .. })
        ));
    }

    #[test]
    fn rejects_non_utf8_token() {
        let id = SessionIdentity::new(1, 0, "ab");
        let mut bytes = encode(FrameType::Packet, &id, b"p").unwrap();
        bytes[15] = 0xFF; // first token byte, after the 15-byte prefix
        bytes[16] = 0xFE;
        assert_eq!(decode(&bytes), Err(FrameError::TokenNotUtf8));
    }

    #[test]
    fn rejects_empty_datagram() {
        assert!(matches!(decode(&[]), Err(FrameError::Truncated { .. })));
    }

    // ==========================================
    // Encode-side limits
    // ==========================================

    #[test]
    fn encode_rejects_oversized_token() {
        let id = SessionIdentity::new(1, 0, "x".repeat(MAX_TOKEN_LEN + 1));
        assert_eq!(
            encode(FrameType::Hello, &id, &[]),
            Err(FrameError::TokenTooLong {
                len: MAX_TOKEN_LEN + 1
            })
        );
    }

    #[test]
    fn encode_accepts_token_at_limit() {
        let id = SessionIdentity::new(1, 0, "x".repeat(MAX_TOKEN_LEN));
        let bytes = encode(FrameType::Hello, &id, &[]).unwrap();
        assert_eq!(decode(&bytes).unwrap().identity.token.len(), MAX_TOKEN_LEN);
    }

    // ==========================================
    // Identity validation
    // ==========================================

    #[test]
    fn identity_validation() {
        assert!(SessionIdentity::new(1, 0, "t").validate().is_ok());
        assert!(SessionIdentity::new(0, 0, "t").validate().is_err());
        assert!(SessionIdentity::new(-1, 0, "t").validate().is_err());
        assert!(SessionIdentity::new(1, -1, "t").validate().is_err());
    }

    #[test]
    fn identity_validation_rejects_oversized_token() {
        let id = SessionIdentity::new(1, 0, "x".repeat(MAX_TOKEN_LEN + 1));
        assert!(matches!(
            id.validate(),
            Err(crate::NetsyncError::TokenTooLong { .. })
        ));
        assert!(!id.is_valid());
    }

    #[test]
    fn frame_type_wire_values() {
        assert_eq!(FrameType::Hello.as_u8(), 1);
        assert_eq!(FrameType::Packet.as_u8(), 2);
        assert_eq!(FrameType::from_u8(1), Some(FrameType::Hello));
        assert_eq!(FrameType::from_u8(2), Some(FrameType::Packet));
        assert_eq!(FrameType::from_u8(0), None);
        assert_eq!(FrameType::from_u8(3), None);
    }
}
