//! Logging Listener - Structured Trace Output for Observations and Alerts

use tracing::{debug, warn};

use crate::domain::alert::{AlertRecord, Severity};
use crate::domain::observation::Observation;
use crate::ports::listener::StreamListener;

/// Reports observations at `debug` and alerts at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl StreamListener for LoggingListener {
    fn on_observation(&self, observation: &Observation) {
        debug!(
            feed = %observation.feed,
            source = %observation.source,
            timestamp = %observation.timestamp,
            "Observation received"
        );
    }

    fn on_alert(&self, alert: &AlertRecord) {
        let metadata = serde_json::to_string(&alert.metadata).unwrap_or_default();
        if alert.severity >= Severity::High {
            warn!(
                id = %alert.id,
                kind = %alert.kind,
                severity = %alert.severity,
                metadata = %metadata,
                "{}: {}", alert.title, alert.message
            );
        } else {
            debug!(
                id = %alert.id,
                kind = %alert.kind,
                severity = %alert.severity,
                metadata = %metadata,
                "{}: {}", alert.title, alert.message
            );
        }
    }
}
