//! Builder assembling a [`SyncSession`] from per-concern configurations.

use crate::network::queue::InboundQueue;
use crate::network::transport::SessionTransport;
use crate::sessions::config::{PredictionConfig, TrackerConfig, TransportConfig};
use crate::sessions::sync_session::SyncSession;
use crate::NetsyncError;

/// Fluent builder for [`SyncSession`].
///
/// Every configuration defaults to values that work for typical conditions;
/// override the ones that matter and call [`start`](Self::start).
///
/// # Example
///
/// ```no_run
/// use bastion_netsync::{SessionBuilder, TrackerConfig, TransportConfig};
///
/// # fn main() -> Result<(), bastion_netsync::NetsyncError> {
/// let session = SessionBuilder::new()
///     .with_transport_config(TransportConfig::lan())
///     .with_tracker_config(TrackerConfig::responsive())
///     .start("203.0.113.7", 7777)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
#[must_use = "SessionBuilder does nothing until start() is called"]
pub struct SessionBuilder {
    transport: TransportConfig,
    prediction: PredictionConfig,
    tracker: TrackerConfig,
}

impl SessionBuilder {
    /// Creates a builder with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the transport configuration.
    pub fn with_transport_config(mut self, config: TransportConfig) -> Self {
        self.transport = config;
        self
    }

    /// Overrides the prediction configuration.
    pub fn with_prediction_config(mut self, config: PredictionConfig) -> Self {
        self.prediction = config;
        self
    }

    /// Overrides the tracker configuration.
    pub fn with_tracker_config(mut self, config: TrackerConfig) -> Self {
        self.tracker = config;
        self
    }

    /// Validates every configuration, starts the transport against
    /// `host:port`, and returns the assembled session.
    ///
    /// The session is not yet joined to a match; feed the identity triple
    /// from the reliable channel into
    /// [`SyncSession::join`](crate::SyncSession::join) once it arrives.
    ///
    /// # Errors
    ///
    /// Configuration validation errors, or [`NetsyncError::Socket`] when the
    /// transport cannot start.
    pub fn start(self, host: &str, port: u16) -> Result<SyncSession, NetsyncError> {
        self.transport.validate()?;
        self.prediction.validate()?;
        self.tracker.validate()?;

        let queue = InboundQueue::with_capacity(self.transport.inbound_queue_capacity);
        let transport = SessionTransport::start(host, port, self.transport, queue.clone())?;
        Ok(SyncSession::new(
            transport,
            queue,
            self.prediction,
            self.tracker,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use web_time::Duration;

    #[test]
    fn default_builder_carries_default_configs() {
        let builder = SessionBuilder::new();
        assert_eq!(builder.transport, TransportConfig::default());
        assert_eq!(builder.prediction, PredictionConfig::default());
        assert_eq!(builder.tracker, TrackerConfig::default());
    }

    #[test]
    fn with_methods_replace_configs() {
        let builder = SessionBuilder::new()
            .with_transport_config(TransportConfig::lan())
            .with_tracker_config(TrackerConfig::smooth());
        assert_eq!(builder.transport, TransportConfig::lan());
        assert_eq!(builder.tracker, TrackerConfig::smooth());
    }

    #[test]
    #[cfg(not(miri))]
    fn start_rejects_invalid_configuration_before_binding() {
        let builder = SessionBuilder::new().with_transport_config(TransportConfig {
            receive_timeout: Duration::from_millis(0),
            ..TransportConfig::default()
        });
        assert!(builder.start("127.0.0.1", 7777).is_err());
    }

    #[test]
    #[cfg(not(miri))]
    fn start_builds_an_unjoined_session() {
        // Port 9 (discard) as an arbitrary remote; nothing is sent on start.
        let session = SessionBuilder::new().start("127.0.0.1", 9).unwrap();
        assert!(session.is_running());
        assert_eq!(session.local_player_id(), None);
        assert!(!session.has_baseline());
    }
}
