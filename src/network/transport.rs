//! UDP session transport: socket ownership, handshake state machine and the
//! background receive loop.
//!
//! A single connectionless socket serves as a per-match channel. Identity is
//! demultiplexed per frame instead of per connection: every outbound frame
//! carries the `(player_id, room_id, token)` triple, and the HELLO handshake
//! exists only so the server learns (and can refresh) the client's return
//! address through NAT.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐   start()    ┌─────────────┐  first inbound  ┌─────────────┐
//! │ Disconnected │ ───────────► │ AwaitingAck │ ──────────────► │ Established │
//! └──────────────┘              └─────────────┘    datagram     └─────────────┘
//!        │                            │                                │
//!        │                            │            stop()              │
//!        └────────────────────────────┴───────────────┬────────────────┘
//!                                                     ▼
//!                                               ┌──────────┐
//!                                               │  Closed  │
//!                                               └──────────┘
//! ```
//!
//! | From        | To          | Trigger                                   |
//! |-------------|-------------|-------------------------------------------|
//! | Disconnected| AwaitingAck | `start()` binds the socket                |
//! | AwaitingAck | Established | Any inbound datagram (liveness ack)       |
//! | Established | AwaitingAck | `configure_session()` rebinds identity    |
//! | any         | Closed      | `stop()` (terminal)                       |
//!
//! While in `AwaitingAck` with a configured identity, the receive loop's
//! bounded timeout doubles as the HELLO retry clock: each time the retry
//! interval elapses without inbound traffic, one more HELLO is sent. The
//! default policy never gives up - the peer address may still become
//! reachable - but a finite budget can be configured, after which a
//! [`TransportEvent::HelloRetriesExhausted`] is emitted once.
//!
//! The receive loop never touches simulation state; everything it learns is
//! pushed onto the [`InboundQueue`].

use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, trace, warn};
use web_time::Instant;

use crate::network::codec;
use crate::network::frame::{self, FrameType, SessionIdentity};
use crate::network::messages::AppMessage;
use crate::network::queue::{InboundQueue, TransportEvent};
use crate::sessions::config::TransportConfig;
use crate::NetsyncError;

/// The handshake state of a [`SessionTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// No socket is bound. The transport has not been started.
    Disconnected,
    /// The socket is bound and the receive loop is running, but no inbound
    /// datagram has arrived yet. HELLO frames are (re)sent from this state.
    AwaitingAck,
    /// At least one inbound datagram has arrived; the server knows our
    /// return address.
    Established,
    /// The transport was stopped. Terminal; sends return `false`.
    Closed,
}

struct SendPath {
    buf: Vec<u8>,
}

struct TransportShared {
    socket: UdpSocket,
    config: TransportConfig,
    queue: InboundQueue,
    running: AtomicBool,
    state: Mutex<TransportState>,
    identity: Mutex<Option<SessionIdentity>>,
    // HELLO retries (receive thread) and application sends (simulation
    // thread) race onto the same socket; one lock serializes both writers
    // and lets them share one encode buffer.
    send_path: Mutex<SendPath>,
    last_hello: Mutex<Option<Instant>>,
    hello_attempts: AtomicU32,
    retries_exhausted: AtomicBool,
}

/// Owns the UDP socket and the background receive thread for one session.
///
/// Constructed via [`SessionTransport::start`]; torn down by
/// [`SessionTransport::stop`] or `Drop`. All methods are callable from the
/// simulation thread while the receive loop runs.
pub struct SessionTransport {
    shared: Arc<TransportShared>,
    recv_thread: Option<JoinHandle<()>>,
}

impl SessionTransport {
    /// Binds an OS-assigned local port, connects it to `host:port`, and
    /// starts the receive loop with the configured bounded read timeout.
    ///
    /// Inbound events surface on `queue`.
    ///
    /// # Errors
    ///
    /// [`NetsyncError::Socket`] if binding, address resolution or socket
    /// configuration fails; configuration range errors from
    /// [`TransportConfig::validate`].
    pub fn start(
        host: &str,
        port: u16,
        config: TransportConfig,
        queue: InboundQueue,
    ) -> Result<Self, NetsyncError> {
        config.validate()?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|e| {
            NetsyncError::Socket {
                context: format!("failed to bind local UDP socket: {e}"),
            }
        })?;
        socket.connect((host, port)).map_err(|e| NetsyncError::Socket {
            context: format!("failed to associate socket with {host}:{port}: {e}"),
        })?;
        socket
            .set_read_timeout(Some(config.receive_timeout))
            .map_err(|e| NetsyncError::Socket {
                context: format!("failed to set receive timeout: {e}"),
            })?;

        let shared = Arc::new(TransportShared {
            socket,
            config,
            queue,
            running: AtomicBool::new(true),
            state: Mutex::new(TransportState::AwaitingAck),
            identity: Mutex::new(None),
            send_path: Mutex::new(SendPath { buf: Vec::new() }),
            last_hello: Mutex::new(None),
            hello_attempts: AtomicU32::new(0),
            retries_exhausted: AtomicBool::new(false),
        });

        let thread_shared = Arc::clone(&shared);
        let recv_thread = std::thread::Builder::new()
            .name("netsync-recv".to_owned())
            .spawn(move || receive_loop(&thread_shared))
            .map_err(|e| NetsyncError::Socket {
                context: format!("failed to spawn receive thread: {e}"),
            })?;

        debug!(
            local = ?shared.socket.local_addr().ok(),
            remote = %format!("{host}:{port}"),
            "UDP transport started"
        );

        Ok(Self {
            shared,
            recv_thread: Some(recv_thread),
        })
    }

    /// Stores the session identity and, if the transport is running, sends
    /// an immediate HELLO and restarts the handshake.
    ///
    /// # Errors
    ///
    /// Identity validation errors; the identity is not stored when invalid.
    pub fn configure_session(&self, identity: SessionIdentity) -> Result<(), NetsyncError> {
        identity.validate()?;
        debug!(
            player_id = identity.player_id,
            room_id = identity.room_id,
            token_len = identity.token.len(),
            "configuring session identity"
        );
        *self.shared.identity.lock() = Some(identity);
        self.shared.hello_attempts.store(0, Ordering::Relaxed);
        self.shared.retries_exhausted.store(false, Ordering::Relaxed);

        if self.is_running() {
            let mut state = self.shared.state.lock();
            if *state == TransportState::Established {
                *state = TransportState::AwaitingAck;
            }
            drop(state);
            self.shared.send_hello();
        }
        Ok(())
    }

    /// Encodes `msg` and transmits it inside a PACKET frame.
    ///
    /// Fails silently (returns `false`) when the transport is not running or
    /// no valid identity is configured; the caller decides whether to retry.
    pub fn send(&self, msg: &AppMessage) -> bool {
        match codec::encode(msg) {
            Ok(payload) => self.send_payload(&payload),
            Err(e) => {
                warn!("failed to encode outbound message: {e}");
                false
            }
        }
    }

    /// Transmits an already-encoded payload inside a PACKET frame.
    ///
    /// Same failure semantics as [`send`](Self::send).
    pub fn send_payload(&self, payload: &[u8]) -> bool {
        self.shared.send_frame(FrameType::Packet, payload)
    }

    /// Returns the current handshake state.
    #[must_use]
    pub fn state(&self) -> TransportState {
        *self.shared.state.lock()
    }

    /// Returns `true` while the receive loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// The local address the socket is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.socket.local_addr().ok()
    }

    /// Stops the receive loop and closes the session. Idempotent.
    ///
    /// Blocks for at most one receive timeout while the loop notices the
    /// cleared running flag. Sends after `stop()` are no-ops returning
    /// `false`.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        *self.shared.state.lock() = TransportState::Closed;
        if let Some(handle) = self.recv_thread.take() {
            if handle.join().is_err() {
                error!("receive thread panicked during shutdown");
            }
            debug!("UDP transport stopped");
        }
    }
}

impl Drop for SessionTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SessionTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTransport")
            .field("state", &self.state())
            .field("running", &self.is_running())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

impl TransportShared {
    /// Wraps `payload` in a frame and transmits it under the send lock.
    fn send_frame(&self, frame_type: FrameType, payload: &[u8]) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let identity = {
            let guard = self.identity.lock();
            match guard.as_ref() {
                Some(id) if id.is_valid() => id.clone(),
                _ => return false,
            }
        };

        let mut send_path = self.send_path.lock();
        let SendPath { buf } = &mut *send_path;
        if let Err(e) = frame::encode_into(buf, frame_type, &identity, payload) {
            warn!("failed to encode outbound frame: {e}");
            return false;
        }
        match self.socket.send(buf) {
            Ok(_) => {
                if frame_type == FrameType::Hello {
                    *self.last_hello.lock() = Some(Instant::now());
                }
                true
            }
            Err(e) => {
                // UDP is best-effort; a failed send is the caller's problem,
                // not the session's.
                warn!("failed to send UDP frame: {e}");
                false
            }
        }
    }

    fn send_hello(&self) {
        let attempt = self.hello_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(attempt, "sending HELLO");
        self.send_frame(FrameType::Hello, &[]);
    }

    /// Any inbound datagram proves the server can reach us; decoding is not
    /// required for liveness.
    fn mark_acknowledged(&self) {
        let mut state = self.state.lock();
        if *state == TransportState::AwaitingAck {
            *state = TransportState::Established;
            drop(state);
            debug!("session established");
            self.queue.push(TransportEvent::Established);
        }
    }

    fn maybe_resend_hello(&self) {
        if *self.state.lock() != TransportState::AwaitingAck {
            return;
        }
        {
            let identity = self.identity.lock();
            match identity.as_ref() {
                Some(id) if id.is_valid() => {}
                _ => return,
            }
        }
        let due = match *self.last_hello.lock() {
            None => true,
            Some(at) => at.elapsed() >= self.config.hello_retry_interval,
        };
        if !due {
            return;
        }
        if let Some(max) = self.config.max_hello_retries {
            let sent = self.hello_attempts.load(Ordering::Relaxed);
            if sent >= max {
                if !self.retries_exhausted.swap(true, Ordering::Relaxed) {
                    warn!(
                        attempts = sent,
                        "HELLO retry budget exhausted; waiting for inbound traffic"
                    );
                    self.queue
                        .push(TransportEvent::HelloRetriesExhausted { attempts: sent });
                }
                return;
            }
        }
        self.send_hello();
    }
}

/// The background receive loop. Exits when the running flag clears or a
/// fatal socket error occurs.
fn receive_loop(shared: &TransportShared) {
    let mut buf = vec![0u8; shared.config.recv_buffer_size];
    debug!("receive loop started");

    while shared.running.load(Ordering::SeqCst) {
        match shared.socket.recv(&mut buf) {
            Ok(len) => {
                shared.mark_acknowledged();
                match frame::decode(&buf[..len]) {
                    Ok(decoded) => match decoded.frame_type {
                        FrameType::Hello => {
                            // Pure liveness ack; carries no data.
                            debug!(
                                player_id = decoded.identity.player_id,
                                room_id = decoded.identity.room_id,
                                "received HELLO ack"
                            );
                        }
                        FrameType::Packet => {
                            match codec::decode_value::<AppMessage>(&decoded.payload) {
                                Ok(msg) => {
                                    shared.queue.push(TransportEvent::Message(msg));
                                }
                                Err(e) => {
                                    warn!("dropping undecodable application payload: {e}");
                                }
                            }
                        }
                    },
                    Err(e) => {
                        // Datagrams may be corrupted or forged; never fatal.
                        trace!("dropping malformed datagram: {e}");
                    }
                }
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                shared.maybe_resend_hello();
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused
                ) =>
            {
                // A connected UDP socket surfaces the peer's ICMP unreachable
                // here. The peer may simply not be up yet; the HELLO retry
                // policy covers exactly this case.
                trace!("peer unreachable: {e}");
                shared.maybe_resend_hello();
            }
            Err(e) => {
                if shared.running.load(Ordering::SeqCst) {
                    error!("UDP receive error: {e}");
                    shared.queue.push(TransportEvent::Error {
                        context: e.to_string(),
                    });
                }
                break;
            }
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    let mut state = shared.state.lock();
    if *state != TransportState::Closed {
        *state = TransportState::Disconnected;
    }
    drop(state);
    debug!("receive loop ended");
}
