//! Application payload messages carried inside PACKET frames.
//!
//! The transport treats payloads as opaque bytes; this module defines the
//! tagged union those bytes decode to. Decoding happens exactly once, at the
//! transport boundary, so downstream components pattern-match exhaustively
//! instead of switching on a raw discriminator.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::InputSeq;

/// One player's authoritative state inside a [`StateSync`] broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// The server-assigned player id.
    pub player_id: i32,
    /// Authoritative position.
    pub position: Vec2,
    /// Authoritative facing rotation in degrees.
    pub rotation: f32,
    /// Whether the player is currently alive.
    pub alive: bool,
    /// The most recent input sequence the server has applied for this
    /// player, or `None` if it has not applied any yet.
    pub last_processed_input: Option<InputSeq>,
}

/// One enemy's authoritative state inside a [`StateSync`] broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemyState {
    /// The server-assigned enemy id.
    pub enemy_id: i32,
    /// Authoritative position.
    pub position: Vec2,
    /// Whether the enemy is currently alive.
    pub alive: bool,
}

/// A full-state broadcast describing every networked entity at one server
/// tick. No delta encoding: each broadcast supersedes the previous one, which
/// is what makes the lossy transport self-healing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StateSync {
    /// Server wall-clock milliseconds at the tick this state describes.
    /// Drives remote-entity velocity estimation.
    pub server_time_ms: u64,
    /// All players in the room, including the local one.
    pub players: SmallVec<[PlayerState; 8]>,
    /// All enemies in the room.
    pub enemies: SmallVec<[EnemyState; 16]>,
}

/// A client-to-server movement command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientInput {
    /// The sending player's id.
    pub player_id: i32,
    /// The command's sequence number.
    pub seq: InputSeq,
    /// Unit-or-zero movement direction.
    pub move_direction: Vec2,
    /// Whether the attack action was pressed this tick.
    pub attacking: bool,
}

/// The application message union exchanged inside PACKET frames.
///
/// Marked `#[non_exhaustive]`: the server side may grow new event messages,
/// and old clients must keep decoding the ones they know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AppMessage {
    /// A movement command (client to server).
    Input(ClientInput),
    /// A full-state broadcast (server to client).
    StateSync(StateSync),
    /// A player took damage.
    PlayerHurt {
        /// The damaged player.
        player_id: i32,
        /// Hit points remaining after the damage.
        remaining_health: i32,
    },
    /// An enemy was destroyed.
    EnemyDied {
        /// The destroyed enemy.
        enemy_id: i32,
        /// Where it died.
        position: Vec2,
    },
    /// A player gained a level.
    PlayerLevelUp {
        /// The leveling player.
        player_id: i32,
        /// The level reached.
        new_level: i32,
    },
    /// The match has ended.
    GameOver,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::network::codec;

    #[test]
    fn state_sync_default_is_empty() {
        let sync = StateSync::default();
        assert_eq!(sync.server_time_ms, 0);
        assert!(sync.players.is_empty());
        assert!(sync.enemies.is_empty());
    }

    #[test]
    fn state_sync_roundtrip() {
        let mut sync = StateSync {
            server_time_ms: 123_456,
            ..StateSync::default()
        };
        sync.players.push(PlayerState {
            player_id: 1,
            position: Vec2::new(640.0, 360.0),
            rotation: 90.0,
            alive: true,
            last_processed_input: Some(InputSeq::new(17)),
        });
        sync.enemies.push(EnemyState {
            enemy_id: 100,
            position: Vec2::new(10.0, 20.0),
            alive: false,
        });

        let bytes = codec::encode(&AppMessage::StateSync(sync.clone())).unwrap();
        let decoded: AppMessage = codec::decode_value(&bytes).unwrap();
        assert_eq!(decoded, AppMessage::StateSync(sync));
    }

    #[test]
    fn client_input_roundtrip() {
        let input = ClientInput {
            player_id: 3,
            seq: InputSeq::new(8),
            move_direction: Vec2::new(0.0, 1.0),
            attacking: true,
        };
        let bytes = codec::encode(&AppMessage::Input(input)).unwrap();
        let decoded: AppMessage = codec::decode_value(&bytes).unwrap();
        assert_eq!(decoded, AppMessage::Input(input));
    }

    #[test]
    fn event_messages_roundtrip() {
        let messages = [
            AppMessage::PlayerHurt {
                player_id: 2,
                remaining_health: 40,
            },
            AppMessage::EnemyDied {
                enemy_id: 9,
                position: Vec2::new(5.0, 6.0),
            },
            AppMessage::PlayerLevelUp {
                player_id: 2,
                new_level: 3,
            },
            AppMessage::GameOver,
        ];
        for msg in messages {
            let bytes = codec::encode(&msg).unwrap();
            let decoded: AppMessage = codec::decode_value(&bytes).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn none_acknowledgment_roundtrip() {
        let state = PlayerState {
            player_id: 1,
            position: Vec2::ZERO,
            rotation: 0.0,
            alive: true,
            last_processed_input: None,
        };
        let bytes = codec::encode(&state).unwrap();
        let decoded: PlayerState = codec::decode_value(&bytes).unwrap();
        assert_eq!(decoded.last_processed_input, None);
    }
}
