//! Feed Connection - Lifecycle of One Streaming Feed
//!
//! Owns exactly one logical connection to a feed and its private
//! reconnection state. The receive loop runs as its own tokio task:
//!
//! - `Connecting → Open` on a successful dial
//! - `Open → Closed` on remote close, transport error or `stop()`
//! - `Closed → Reconnecting` while attempts remain (unless stopped)
//! - `Reconnecting → Connecting` after `base_delay * 2^attempts`
//! - `Closed` is terminal once `attempts == max_attempts`
//!
//! Every await point races the cancellation token, so `stop()` unblocks
//! a pending receive or backoff sleep immediately.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::backoff::{Backoff, ReconnectPolicy};
use crate::domain::observation::{FeedId, Observation};
use crate::ports::listener::ObservationHandler;
use crate::ports::transport::{FeedDialer, FeedTransport, TransportError};

/// Upper bound on a graceful transport close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
  /// Dial in progress.
  Connecting,
  /// Transport open, receiving.
  Open,
  /// Not connected (transiently, or terminally once finished).
  Closed,
  /// Waiting out the backoff delay.
  Reconnecting,
}

/// Point-in-time view of a connection for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
  /// Feed identifier.
  pub feed: FeedId,
  /// Current lifecycle state.
  pub state: ConnectionState,
  /// Observations decoded and delivered.
  pub messages: u64,
  /// Dial failures, transport errors and undecodable frames.
  pub errors: u64,
  /// Consecutive failed cycles since the last successful open.
  pub attempts: u32,
  /// Configured attempt limit.
  pub max_attempts: u32,
  /// Whether the receive task is still running.
  pub active: bool,
  /// Gave up after exhausting reconnect attempts.
  pub exhausted: bool,
  /// Most recent error message.
  pub last_error: Option<String>,
  /// Timestamp of the most recent observation.
  pub last_message_at: Option<DateTime<Utc>>,
  /// Pending backoff delay while reconnecting.
  pub retry_delay_ms: Option<u64>,
}

impl ConnectionStatus {
  fn new(feed: &str, max_attempts: u32) -> Self {
    Self {
      feed: feed.to_string(),
      state: ConnectionState::Connecting,
      messages: 0,
      errors: 0,
      attempts: 0,
      max_attempts,
      active: true,
      exhausted: false,
      last_error: None,
      last_message_at: None,
      retry_delay_ms: None,
    }
  }
}

/// Everything a connection needs from its owner.
#[derive(Clone)]
pub struct ConnectionContext {
  /// Injected transport factory.
  pub dialer: Arc<dyn FeedDialer>,
  /// Pipeline receiving decoded observations.
  pub handler: Arc<dyn ObservationHandler>,
  /// Reconnect limits.
  pub policy: ReconnectPolicy,
  /// Optional Prometheus metrics.
  pub metrics: Option<Arc<MetricsRegistry>>,
}

/// Handle to a running feed connection.
///
/// Dropping the handle cancels the receive task.
pub struct FeedConnection {
  feed: FeedId,
  status: Arc<Mutex<ConnectionStatus>>,
  cancel: CancellationToken,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl FeedConnection {
  /// Spawn the receive task for `feed`. Must be called within a tokio runtime.
  ///
  /// Dial failures never surface here: they are retried per policy and
  /// reported through `status()`.
  pub fn connect(feed: FeedId, ctx: ConnectionContext) -> Arc<Self> {
    let status = Arc::new(Mutex::new(ConnectionStatus::new(
      &feed,
      ctx.policy.max_attempts,
    )));
    let cancel = CancellationToken::new();

    let worker = Worker {
      feed: feed.clone(),
      backoff: Backoff::new(ctx.policy),
      ctx,
      status: Arc::clone(&status),
      cancel: cancel.clone(),
    };
    let task = tokio::spawn(worker.run());

    Arc::new(Self {
      feed,
      status,
      cancel,
      task: Mutex::new(Some(task)),
    })
  }

  /// Feed identifier.
  pub fn feed(&self) -> &str {
    &self.feed
  }

  /// Current lifecycle state.
  pub fn state(&self) -> ConnectionState {
    self.status.lock().state
  }

  /// Copy of the current status.
  pub fn status(&self) -> ConnectionStatus {
    self.status.lock().clone()
  }

  /// Whether the receive task is still running (not stopped or exhausted).
  pub fn is_active(&self) -> bool {
    !self.cancel.is_cancelled() && self.status.lock().active
  }

  /// Stop the connection and wait for the receive task to finish.
  ///
  /// The transport is closed and no reconnect is attempted afterwards.
  /// Safe to call more than once.
  pub async fn stop(&self) {
    self.cancel.cancel();

    let task = self.task.lock().take();
    if let Some(task) = task {
      if let Err(e) = task.await {
        if e.is_panic() {
          error!(feed = %self.feed, "Feed connection task panicked");
        }
      }
    }
  }
}

impl Drop for FeedConnection {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

impl std::fmt::Debug for FeedConnection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FeedConnection")
      .field("feed", &self.feed)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}

/// How an open session ended.
enum SessionEnd {
  Stopped,
  RemoteClosed,
  Failed(TransportError),
}

/// Marks the connection finished on every exit path, panics included.
struct FinishGuard {
  feed: FeedId,
  status: Arc<Mutex<ConnectionStatus>>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl Drop for FinishGuard {
  fn drop(&mut self) {
    {
      let mut status = self.status.lock();
      status.state = ConnectionState::Closed;
      status.active = false;
      status.retry_delay_ms = None;
    }
    if let Some(metrics) = &self.metrics {
      metrics.record_state(&self.feed, ConnectionState::Closed);
    }
  }
}

/// Receive task state. Lives only inside the spawned task.
struct Worker {
  feed: FeedId,
  ctx: ConnectionContext,
  backoff: Backoff,
  status: Arc<Mutex<ConnectionStatus>>,
  cancel: CancellationToken,
}

impl Worker {
  #[instrument(skip(self), fields(feed = %self.feed))]
  async fn run(mut self) {
    let _finish = FinishGuard {
      feed: self.feed.clone(),
      status: Arc::clone(&self.status),
      metrics: self.ctx.metrics.clone(),
    };

    loop {
      self.transition(ConnectionState::Connecting);

      let dialed = tokio::select! {
        biased;
        () = self.cancel.cancelled() => break,
        result = self.ctx.dialer.dial(&self.feed) => result,
      };

      match dialed {
        Ok(mut transport) => {
          self.backoff.reset();
          self.transition(ConnectionState::Open);
          info!("Feed connected");

          let end = self.receive(transport.as_mut()).await;
          if tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await.is_err() {
            warn!("Transport close timed out, dropping");
          }
          drop(transport);

          match end {
            SessionEnd::Stopped => break,
            SessionEnd::RemoteClosed => info!("Feed closed by remote"),
            SessionEnd::Failed(e) => {
              warn!(error = %e, "Feed transport failed");
              self.record_error(&e.to_string());
            }
          }
        }
        Err(e) => {
          warn!(error = %e, attempts = self.backoff.attempts(), "Feed connect failed");
          self.record_error(&e.to_string());
        }
      }

      self.transition(ConnectionState::Closed);
      if self.cancel.is_cancelled() {
        break;
      }

      let Some(delay) = self.backoff.next_delay() else {
        error!(attempts = self.backoff.attempts(), "Reconnect attempts exhausted, giving up");
        self.status.lock().exhausted = true;
        if let Some(metrics) = &self.ctx.metrics {
          metrics.connections_exhausted.inc();
        }
        return;
      };

      self.schedule_retry(delay);

      tokio::select! {
        biased;
        () = self.cancel.cancelled() => break,
        () = tokio::time::sleep(delay) => {}
      }
    }

    info!("Feed connection stopped");
  }

  /// Pump frames until the session ends. Cancellation wins over data.
  async fn receive(&self, transport: &mut dyn FeedTransport) -> SessionEnd {
    loop {
      let next = tokio::select! {
        biased;
        () = self.cancel.cancelled() => return SessionEnd::Stopped,
        next = transport.next_message() => next,
      };

      match next {
        Some(Ok(text)) => self.dispatch(&text),
        Some(Err(e)) => return SessionEnd::Failed(e),
        None => return SessionEnd::RemoteClosed,
      }
    }
  }

  /// Decode one frame and hand it to the pipeline. Never fails the loop.
  fn dispatch(&self, text: &str) {
    let observation = match Observation::decode(&self.feed, text) {
      Ok(observation) => observation,
      Err(e) => {
        debug!(error = %e, "Dropping undecodable frame");
        self.status.lock().errors += 1;
        if let Some(metrics) = &self.ctx.metrics {
          metrics.decode_errors.with_label_values(&[self.feed.as_str()]).inc();
        }
        return;
      }
    };

    {
      let mut status = self.status.lock();
      status.messages += 1;
      status.last_message_at = Some(observation.timestamp);
    }

    let handler = &self.ctx.handler;
    if catch_unwind(AssertUnwindSafe(|| handler.handle(observation))).is_err() {
      error!("Observation handler panicked, continuing");
    }
  }

  fn transition(&self, state: ConnectionState) {
    let previous = {
      let mut status = self.status.lock();
      let previous = status.state;
      status.state = state;
      status.attempts = self.backoff.attempts();
      if state != ConnectionState::Reconnecting {
        status.retry_delay_ms = None;
      }
      previous
    };

    debug!(from = ?previous, to = ?state, "Connection state transition");
    if let Some(metrics) = &self.ctx.metrics {
      metrics.record_state(&self.feed, state);
    }
  }

  fn schedule_retry(&self, delay: Duration) {
    self.transition(ConnectionState::Reconnecting);
    self.status.lock().retry_delay_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));

    if let Some(metrics) = &self.ctx.metrics {
      metrics.reconnect_attempts.with_label_values(&[self.feed.as_str()]).inc();
    }
    info!(
      attempt = self.backoff.attempts(),
      max_attempts = self.backoff.policy().max_attempts,
      delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
      "Reconnecting after backoff"
    );
  }

  fn record_error(&self, message: &str) {
    {
      let mut status = self.status.lock();
      status.errors += 1;
      status.last_error = Some(message.to_string());
    }
    if let Some(metrics) = &self.ctx.metrics {
      metrics.connection_errors.with_label_values(&[self.feed.as_str()]).inc();
    }
  }
}
