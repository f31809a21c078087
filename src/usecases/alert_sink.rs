//! Alert Sink - Bounded Most-Recent-First Alert Log
//!
//! Retains the latest alerts for the life of the process. When full, the
//! oldest alert is silently dropped. Publication invokes the registered
//! consumer synchronously, serialized so the consumer sees alerts in the
//! same order as the log.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::domain::alert::AlertRecord;

/// Default number of retained alerts.
pub const DEFAULT_ALERT_CAPACITY: usize = 50;

/// Callback invoked for every published alert.
pub type AlertConsumer = Box<dyn Fn(&AlertRecord) + Send + Sync>;

/// Alert log with acknowledgement state.
pub struct AlertSink {
  /// Maximum retained alerts.
  capacity: usize,
  /// Newest first.
  log: Mutex<VecDeque<AlertRecord>>,
  /// Serializes publication so consumer order matches log order.
  delivery: Mutex<()>,
  /// Registered consumer.
  consumer: Option<AlertConsumer>,
}

impl Default for AlertSink {
  fn default() -> Self {
    Self::new(DEFAULT_ALERT_CAPACITY)
  }
}

impl AlertSink {
  /// Create a sink retaining at most `capacity` alerts (minimum 1).
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      capacity,
      log: Mutex::new(VecDeque::with_capacity(capacity)),
      delivery: Mutex::new(()),
      consumer: None,
    }
  }

  /// Register the consumer callback.
  ///
  /// The consumer may read or acknowledge alerts on this sink but must not
  /// publish to it.
  #[must_use]
  pub fn with_consumer(mut self, consumer: impl Fn(&AlertRecord) + Send + Sync + 'static) -> Self {
    self.consumer = Some(Box::new(consumer));
    self
  }

  /// Prepend `alert`, truncate to capacity, then notify the consumer.
  pub fn publish(&self, alert: AlertRecord) {
    let _ordered = self.delivery.lock();

    debug!(
      id = %alert.id,
      kind = %alert.kind,
      severity = %alert.severity,
      title = %alert.title,
      "Alert published"
    );

    {
      let mut log = self.log.lock();
      log.push_front(alert.clone());
      log.truncate(self.capacity);
    }

    if let Some(consumer) = &self.consumer {
      if catch_unwind(AssertUnwindSafe(|| consumer(&alert))).is_err() {
        error!(id = %alert.id, "Alert consumer panicked, continuing");
      }
    }
  }

  /// Mark the alert with `id` acknowledged. Returns whether it was found.
  pub fn acknowledge(&self, id: &str) -> bool {
    let mut log = self.log.lock();
    match log.iter_mut().find(|a| a.id == id) {
      Some(alert) => {
        alert.acknowledged = true;
        debug!(id, "Alert acknowledged");
        true
      }
      None => false,
    }
  }

  /// Acknowledge every retained alert. Returns how many changed.
  pub fn acknowledge_all(&self) -> usize {
    let mut log = self.log.lock();
    let mut changed = 0;
    for alert in log.iter_mut().filter(|a| !a.acknowledged) {
      alert.acknowledged = true;
      changed += 1;
    }
    changed
  }

  /// Unacknowledged alerts, newest first.
  pub fn unacknowledged(&self) -> Vec<AlertRecord> {
    self
      .log
      .lock()
      .iter()
      .filter(|a| !a.acknowledged)
      .cloned()
      .collect()
  }

  /// Number of unacknowledged alerts.
  pub fn unacknowledged_count(&self) -> usize {
    self.log.lock().iter().filter(|a| !a.acknowledged).count()
  }

  /// Every retained alert, newest first.
  pub fn alerts(&self) -> Vec<AlertRecord> {
    self.log.lock().iter().cloned().collect()
  }

  /// Number of retained alerts.
  pub fn len(&self) -> usize {
    self.log.lock().len()
  }

  /// Whether the log is empty.
  pub fn is_empty(&self) -> bool {
    self.log.lock().is_empty()
  }

  /// Maximum retained alerts.
  pub const fn capacity(&self) -> usize {
    self.capacity
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use chrono::Utc;

  use super::*;
  use crate::domain::alert::{AlertKind, Severity};

  fn alert(title: &str) -> AlertRecord {
    AlertRecord::new(AlertKind::Info, Severity::Low, title, "m", Utc::now())
  }

  #[test]
  fn test_most_recent_first_and_bounded() {
    let sink = AlertSink::new(50);
    for i in 0..51 {
      sink.publish(alert(&format!("a{i}")));
    }

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 50);
    assert_eq!(alerts[0].title, "a50");
    assert_eq!(alerts[49].title, "a1");
    assert!(alerts.iter().all(|a| a.title != "a0"));
  }

  #[test]
  fn test_panicking_consumer_does_not_lose_alerts() {
    let sink = AlertSink::new(10).with_consumer(|alert| {
      assert!(alert.title != "bad", "consumer rejected alert");
    });
    sink.publish(alert("bad"));
    sink.publish(alert("good"));

    let titles: Vec<_> = sink.alerts().into_iter().map(|a| a.title).collect();
    assert_eq!(titles, vec!["good", "bad"]);
  }

  #[test]
  fn test_acknowledge() {
    let sink = AlertSink::default();
    let first = alert("first");
    let id = first.id.clone();
    sink.publish(first);
    sink.publish(alert("second"));

    assert!(sink.acknowledge(&id));
    assert!(!sink.acknowledge("unknown"));

    let open = sink.unacknowledged();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].title, "second");
    assert_eq!(sink.len(), 2);

    assert_eq!(sink.acknowledge_all(), 1);
    assert_eq!(sink.unacknowledged_count(), 0);
  }

  #[test]
  fn test_consumer_sees_publication_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_consumer = Arc::clone(&seen);
    let sink = AlertSink::new(5).with_consumer(move |a| {
      seen_by_consumer.lock().push(a.title.clone());
    });

    sink.publish(alert("one"));
    sink.publish(alert("two"));

    assert_eq!(*seen.lock(), vec!["one".to_string(), "two".to_string()]);
  }
}
