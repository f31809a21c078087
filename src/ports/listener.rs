//! Listener Ports - Observation Routing and Consumer Notification
//!
//! `ObservationHandler` is the seam between a feed connection and the
//! pipeline that buffers and evaluates observations. `StreamListener` is
//! the observer interface registered once by the consuming application.

use crate::domain::alert::AlertRecord;
use crate::domain::observation::Observation;

/// Receives every decoded observation from a feed connection.
///
/// Called concurrently from every connection's task.
pub trait ObservationHandler: Send + Sync + 'static {
  /// Process one observation.
  fn handle(&self, observation: Observation);
}

/// Consumer notified of new observations and alerts.
///
/// Called synchronously from connection tasks, so implementations should
/// hand work off rather than block.
pub trait StreamListener: Send + Sync + 'static {
  /// A new observation was buffered.
  fn on_observation(&self, _observation: &Observation) {}

  /// A new alert was published.
  fn on_alert(&self, _alert: &AlertRecord) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl StreamListener for NoopListener {}
