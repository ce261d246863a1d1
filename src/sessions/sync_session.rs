//! The per-tick simulation facade wiring transport, prediction,
//! reconciliation and tracking together.
//!
//! `SyncSession` is the explicitly-passed context object owned by the
//! simulation loop. The network thread only ever sees the inbound queue's
//! producer side; the simulation loop drains the queue exactly once per
//! tick, *before* sampling input, so every tick observes a deterministic
//! order: authoritative state first, new prediction on top of it.

use glam::Vec2;
use smallvec::SmallVec;
use tracing::trace;

use crate::input::{InputSampler, MovementIntent};
use crate::network::frame::SessionIdentity;
use crate::network::messages::{AppMessage, ClientInput, StateSync};
use crate::network::queue::{InboundQueue, TransportEvent};
use crate::network::transport::{SessionTransport, TransportState};
use crate::prediction::{PredictedState, UnconfirmedInputLog};
use crate::reconcile::{LocalSnapshot, Reconciler, SnapshotHistory};
use crate::sessions::config::{PredictionConfig, TrackerConfig};
use crate::tracker::{EntityId, RemoteEntityState, RemoteEntityTracker, RemoteUpdate};
use crate::{InputSeq, NetsyncError};

/// Events surfaced to the caller by [`SyncSession::tick`].
///
/// Transport lifecycle and game events share one stream so the caller's
/// per-tick handling stays a single exhaustive match.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionEvent {
    /// The first inbound datagram arrived; the server can reach us.
    Established,
    /// The receive loop died on a socket error; the session is broken and
    /// the caller should fall back to a pre-game state.
    TransportError {
        /// A description of the socket error.
        context: String,
    },
    /// The configured finite HELLO retry budget ran out.
    HelloRetriesExhausted {
        /// Total HELLO transmissions attempted.
        attempts: u32,
    },
    /// A player took damage.
    PlayerHurt {
        /// The damaged player.
        player_id: i32,
        /// Hit points remaining.
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

/// Owns every piece of the movement-synchronization layer for one match.
///
/// Built via [`SessionBuilder`](crate::SessionBuilder). Drive it by calling
/// [`tick`](Self::tick) once per simulation tick from a single thread.
#[derive(Debug)]
pub struct SyncSession {
    transport: SessionTransport,
    queue: InboundQueue,
    sampler: InputSampler,
    reconciler: Reconciler,
    tracker: RemoteEntityTracker,
    local_player_id: Option<i32>,
}

impl SyncSession {
    pub(crate) fn new(
        transport: SessionTransport,
        queue: InboundQueue,
        prediction_config: PredictionConfig,
        tracker_config: TrackerConfig,
    ) -> Self {
        Self {
            transport,
            queue,
            sampler: InputSampler::new(),
            reconciler: Reconciler::new(prediction_config),
            tracker: RemoteEntityTracker::new(tracker_config),
            local_player_id: None,
        }
    }

    /// Feeds the `(player_id, room_id, token)` triple obtained from the
    /// reliable control channel into the transport, which sends an immediate
    /// HELLO and starts (or restarts) the handshake.
    ///
    /// # Errors
    ///
    /// Identity validation errors; the session keeps its previous identity
    /// (if any) when validation fails.
    pub fn join(&mut self, identity: SessionIdentity) -> Result<(), NetsyncError> {
        let player_id = identity.player_id;
        self.transport.configure_session(identity)?;
        self.local_player_id = Some(player_id);
        Ok(())
    }

    /// Runs one simulation tick.
    ///
    /// 1. Drains the inbound queue: snapshots reconcile the local player and
    ///    update remote entities; everything else becomes a
    ///    [`SessionEvent`] returned to the caller.
    /// 2. If joined and a baseline snapshot has arrived, samples `intent`
    ///    into a sequenced command, predicts locally, logs it as
    ///    unconfirmed, and transmits it.
    /// 3. Advances remote-entity interpolation by `dt`.
    ///
    /// Nothing here blocks: sends are fire-and-forget and snapshot
    /// application is synchronous local computation.
    pub fn tick(&mut self, intent: MovementIntent, dt: f32) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        for event in self.queue.drain() {
            match event {
                TransportEvent::Established => events.push(SessionEvent::Established),
                TransportEvent::HelloRetriesExhausted { attempts } => {
                    events.push(SessionEvent::HelloRetriesExhausted { attempts });
                }
                TransportEvent::Error { context } => {
                    events.push(SessionEvent::TransportError { context });
                }
                TransportEvent::Message(msg) => self.handle_message(msg, &mut events),
            }
        }

        if let Some(player_id) = self.local_player_id {
            if self.reconciler.has_baseline() {
                let command = self.sampler.sample(intent);
                self.reconciler.predict(command, dt);
                let sent = self.transport.send(&AppMessage::Input(ClientInput {
                    player_id,
                    seq: command.seq,
                    move_direction: command.move_direction,
                    attacking: command.attacking,
                }));
                if !sent {
                    // Movement is lossy-tolerant; the next tick's command
                    // carries fresher intent anyway.
                    trace!(seq = command.seq.as_u32(), "input send failed");
                }
            }
        }

        self.tracker.advance(dt);
        events
    }

    fn handle_message(&mut self, msg: AppMessage, events: &mut Vec<SessionEvent>) {
        match msg {
            AppMessage::StateSync(sync) => self.apply_state_sync(&sync),
            AppMessage::Input(input) => {
                trace!(
                    seq = input.seq.as_u32(),
                    "ignoring client-bound input message"
                );
            }
            AppMessage::PlayerHurt {
                player_id,
                remaining_health,
            } => events.push(SessionEvent::PlayerHurt {
                player_id,
                remaining_health,
            }),
            AppMessage::EnemyDied { enemy_id, position } => {
                events.push(SessionEvent::EnemyDied { enemy_id, position });
            }
            AppMessage::PlayerLevelUp {
                player_id,
                new_level,
            } => events.push(SessionEvent::PlayerLevelUp {
                player_id,
                new_level,
            }),
            AppMessage::GameOver => events.push(SessionEvent::GameOver),
        }
    }

    /// Splits one snapshot broadcast: the local player's entry reconciles
    /// predicted state, every other entity feeds the tracker.
    fn apply_state_sync(&mut self, sync: &StateSync) {
        let mut updates: SmallVec<[RemoteUpdate; 16]> = SmallVec::new();

        for player in &sync.players {
            if Some(player.player_id) == self.local_player_id {
                self.reconciler.apply_snapshot(&LocalSnapshot {
                    position: player.position,
                    rotation: player.rotation,
                    alive: player.alive,
                    last_processed_input: player.last_processed_input,
                });
            } else {
                updates.push(RemoteUpdate {
                    id: EntityId::Player(player.player_id),
                    position: player.position,
                    rotation: player.rotation,
                    alive: player.alive,
                });
            }
        }
        for enemy in &sync.enemies {
            updates.push(RemoteUpdate {
                id: EntityId::Enemy(enemy.enemy_id),
                position: enemy.position,
                rotation: 0.0,
                alive: enemy.alive,
            });
        }

        self.tracker.apply_snapshot(&updates, sync.server_time_ms);
    }

    /// The local player's current predicted pose.
    #[must_use]
    pub fn predicted_state(&self) -> PredictedState {
        self.reconciler.predicted()
    }

    /// Returns `true` once a live authoritative snapshot has arrived;
    /// rendering predicted state before that shows garbage.
    #[must_use]
    pub fn has_baseline(&self) -> bool {
        self.reconciler.has_baseline()
    }

    /// The commands not yet acknowledged by any snapshot.
    #[must_use]
    pub fn unconfirmed(&self) -> &UnconfirmedInputLog {
        self.reconciler.unconfirmed()
    }

    /// The diagnostic ring of recent local-entity snapshots.
    #[must_use]
    pub fn snapshot_history(&self) -> &SnapshotHistory {
        self.reconciler.history()
    }

    /// Iterates over the tracked remote entities in id order.
    pub fn remote_entities(&self) -> impl Iterator<Item = &RemoteEntityState> + '_ {
        self.tracker.iter()
    }

    /// Looks up one remote entity.
    #[must_use]
    pub fn remote_entity(&self, id: EntityId) -> Option<&RemoteEntityState> {
        self.tracker.get(id)
    }

    /// The transport's handshake state.
    #[must_use]
    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    /// Returns `true` while the transport's receive loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    /// The player id provided at [`join`](Self::join), if joined.
    #[must_use]
    pub fn local_player_id(&self) -> Option<i32> {
        self.local_player_id
    }

    /// The sequence number the next sampled command will carry.
    #[must_use]
    pub fn next_input_seq(&self) -> InputSeq {
        self.sampler.next_seq()
    }

    /// Stops the transport and closes the session. Idempotent.
    pub fn stop(&mut self) {
        self.transport.stop();
    }
}
