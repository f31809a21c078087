//! Threshold Rules - Alert Detection on Incoming Observations
//!
//! Each rule inspects a new observation plus the recent history of its
//! feed (prior observations only, newest last) and may produce one alert.
//! Rules fire independently; several may fire for the same observation.
//!
//! Canonical rule set (thresholds are fixed):
//! - Performance: `performance_metrics`, `response_time_ms > 5000`
//! - Activity spike: `user_activity`, current users > 2x mean of last 10
//! - Health: `system_health`, `status != "healthy"`
//! - Price change: `pricing_updates`, price differs from the previous one
//! - Error spike: `error_tracking`, current errors > 3x sum of last 5

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use super::alert::{AlertKind, AlertRecord, Severity};
use super::observation::Observation;

/// Feed carrying response times.
pub const PERFORMANCE_METRICS_FEED: &str = "performance_metrics";
/// Feed carrying component status reports.
pub const SYSTEM_HEALTH_FEED: &str = "system_health";
/// Feed carrying active user counts.
pub const USER_ACTIVITY_FEED: &str = "user_activity";
/// Feed carrying price updates.
pub const PRICING_UPDATES_FEED: &str = "pricing_updates";
/// Feed carrying error counts.
pub const ERROR_TRACKING_FEED: &str = "error_tracking";

/// Response time above which a performance alert fires (exclusive).
pub const RESPONSE_TIME_THRESHOLD_MS: f64 = 5000.0;
/// Observations averaged for the activity baseline.
pub const ACTIVITY_WINDOW: usize = 10;
/// Multiple of the mean that counts as an activity spike.
pub const ACTIVITY_SPIKE_FACTOR: f64 = 2.0;
/// Prior observations required before comparing prices.
pub const PRICING_MIN_HISTORY: usize = 2;
/// Observations summed for the error baseline.
pub const ERROR_WINDOW: usize = 5;
/// Multiple of the baseline that counts as an error spike.
pub const ERROR_SPIKE_FACTOR: f64 = 3.0;

/// Longest history any standard rule looks at.
pub const MAX_HISTORY_WINDOW: usize = ACTIVITY_WINDOW;

/// A stateless evaluator over one observation and its feed history.
pub trait AlertRule: Send + Sync {
    /// Short rule name for logging.
    fn name(&self) -> &'static str;

    /// Inspect `observation` against `history` (prior observations of the
    /// same feed, oldest first). Returns an alert if the rule trips.
    fn evaluate(&self, observation: &Observation, history: &[Arc<Observation>]) -> Option<AlertRecord>;
}

/// Fires when a response time exceeds 5000ms.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerformanceRule;

impl AlertRule for PerformanceRule {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn evaluate(&self, observation: &Observation, _history: &[Arc<Observation>]) -> Option<AlertRecord> {
        if observation.feed != PERFORMANCE_METRICS_FEED {
            return None;
        }

        let response_time = observation.number("response_time_ms")?;
        if response_time <= RESPONSE_TIME_THRESHOLD_MS {
            return None;
        }

        Some(
            AlertRecord::new(
                AlertKind::Warning,
                Severity::High,
                "Performance Degradation",
                format!(
                    "Response time {response_time}ms on {} exceeds {RESPONSE_TIME_THRESHOLD_MS}ms",
                    observation.feed
                ),
                observation.timestamp,
            )
            .with_metadata("feed", observation.feed.as_str())
            .with_metadata("response_time_ms", raw_or(observation, "response_time_ms", response_time))
            .with_metadata("threshold_ms", RESPONSE_TIME_THRESHOLD_MS),
        )
    }
}

/// Fires when active users exceed twice the recent mean.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivitySpikeRule;

impl AlertRule for ActivitySpikeRule {
    fn name(&self) -> &'static str {
        "activity_spike"
    }

    fn evaluate(&self, observation: &Observation, history: &[Arc<Observation>]) -> Option<AlertRecord> {
        if observation.feed != USER_ACTIVITY_FEED || history.len() < ACTIVITY_WINDOW {
            return None;
        }

        let current = observation.number("active_users")?;
        let window = &history[history.len() - ACTIVITY_WINDOW..];
        #[allow(clippy::cast_precision_loss)]
        let mean = window
            .iter()
            .map(|o| o.number("active_users").unwrap_or(0.0))
            .sum::<f64>()
            / ACTIVITY_WINDOW as f64;

        // A zero baseline has no meaningful spike ratio.
        if mean <= 0.0 || current <= ACTIVITY_SPIKE_FACTOR * mean {
            return None;
        }

        let spike_percentage = (current / mean - 1.0) * 100.0;
        Some(
            AlertRecord::new(
                AlertKind::Info,
                Severity::Medium,
                "Activity Spike Detected",
                format!("{current} active users is {spike_percentage:.1}% above the recent average of {mean:.1}"),
                observation.timestamp,
            )
            .with_metadata("feed", observation.feed.as_str())
            .with_metadata("current_users", raw_or(observation, "active_users", current))
            .with_metadata("average_users", mean)
            .with_metadata("spike_percentage", spike_percentage),
        )
    }
}

/// Fires when a reported status is anything other than `healthy`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HealthRule;

impl AlertRule for HealthRule {
    fn name(&self) -> &'static str {
        "health"
    }

    fn evaluate(&self, observation: &Observation, _history: &[Arc<Observation>]) -> Option<AlertRecord> {
        if observation.feed != SYSTEM_HEALTH_FEED {
            return None;
        }

        let status = observation.field("status")?;
        if status.as_str() == Some("healthy") {
            return None;
        }

        let label = status.as_str().map_or_else(|| status.to_string(), str::to_string);
        let mut alert = AlertRecord::new(
            AlertKind::Error,
            Severity::Critical,
            "System Health Issue",
            format!("{} reported status '{label}'", observation.feed),
            observation.timestamp,
        )
        .with_metadata("feed", observation.feed.as_str())
        .with_metadata("status", status.clone());

        if let Some(component) = observation.field("component") {
            alert = alert.with_metadata("component", component.clone());
        }
        Some(alert)
    }
}

/// Fires whenever the price differs from the previously stored one.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceChangeRule;

impl AlertRule for PriceChangeRule {
    fn name(&self) -> &'static str {
        "price_change"
    }

    #[allow(clippy::float_cmp)]
    fn evaluate(&self, observation: &Observation, history: &[Arc<Observation>]) -> Option<AlertRecord> {
        if observation.feed != PRICING_UPDATES_FEED || history.len() < PRICING_MIN_HISTORY {
            return None;
        }

        let new_price = observation.number("price")?;
        let old_price = history.last()?.number("price")?;
        if new_price == old_price {
            return None;
        }

        let change_percent = if old_price == 0.0 {
            Value::Null
        } else {
            Value::from((new_price - old_price) / old_price * 100.0)
        };

        let mut alert = AlertRecord::new(
            AlertKind::Info,
            Severity::Low,
            "Price Update Detected",
            format!("Price changed from {old_price} to {new_price}"),
            observation.timestamp,
        )
        .with_metadata("feed", observation.feed.as_str())
        .with_metadata("old_price", old_price)
        .with_metadata("new_price", new_price)
        .with_metadata("change_percent", change_percent);

        if let Some(product) = observation.field("product") {
            alert = alert.with_metadata("product", product.clone());
        }
        Some(alert)
    }
}

/// Fires when errors exceed three times the recent total.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorSpikeRule;

impl AlertRule for ErrorSpikeRule {
    fn name(&self) -> &'static str {
        "error_spike"
    }

    fn evaluate(&self, observation: &Observation, history: &[Arc<Observation>]) -> Option<AlertRecord> {
        if observation.feed != ERROR_TRACKING_FEED || history.len() < ERROR_WINDOW {
            return None;
        }

        let current = observation.number("error_count")?;
        let baseline: f64 = history[history.len() - ERROR_WINDOW..]
            .iter()
            .map(|o| o.number("error_count").unwrap_or(0.0))
            .sum();

        if current <= ERROR_SPIKE_FACTOR * baseline {
            return None;
        }

        Some(
            AlertRecord::new(
                AlertKind::Error,
                Severity::High,
                "Error Spike Detected",
                format!("{current} errors against a baseline of {baseline} over the last {ERROR_WINDOW} reports"),
                observation.timestamp,
            )
            .with_metadata("feed", observation.feed.as_str())
            .with_metadata("current_errors", raw_or(observation, "error_count", current))
            .with_metadata("baseline_errors", baseline)
            .with_metadata("spike_factor", ERROR_SPIKE_FACTOR),
        )
    }
}

/// Keep the payload's own number representation in metadata.
fn raw_or(observation: &Observation, field: &str, parsed: f64) -> Value {
    observation
        .field(field)
        .cloned()
        .unwrap_or_else(|| Value::from(parsed))
}

/// Ordered collection of rules evaluated against every observation.
pub struct RuleEngine {
    rules: Vec<Box<dyn AlertRule>>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleEngine {
    /// Engine with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Engine loaded with the five canonical rules.
    pub fn standard() -> Self {
        Self::empty()
            .with_rule(PerformanceRule)
            .with_rule(ActivitySpikeRule)
            .with_rule(HealthRule)
            .with_rule(PriceChangeRule)
            .with_rule(ErrorSpikeRule)
    }

    /// Append a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: impl AlertRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule; a panicking rule is logged and skipped.
    pub fn evaluate(&self, observation: &Observation, history: &[Arc<Observation>]) -> Vec<AlertRecord> {
        self.rules
            .iter()
            .filter_map(|rule| {
                match catch_unwind(AssertUnwindSafe(|| rule.evaluate(observation, history))) {
                    Ok(alert) => alert,
                    Err(_) => {
                        error!(rule = rule.name(), feed = %observation.feed, "Rule panicked, skipping");
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obs(feed: &str, payload: Value) -> Observation {
        Observation::new(feed, payload)
    }

    fn history(feed: &str, field: &str, values: &[f64]) -> Vec<Arc<Observation>> {
        values
            .iter()
            .map(|v| {
                let mut payload = serde_json::Map::new();
                payload.insert(field.to_string(), json!(v));
                Arc::new(obs(feed, Value::Object(payload)))
            })
            .collect()
    }

    #[test]
    fn test_performance_threshold_is_exclusive() {
        let rule = PerformanceRule;
        assert!(rule.evaluate(&obs(PERFORMANCE_METRICS_FEED, json!({"response_time_ms": 5000})), &[]).is_none());

        let alert = rule
            .evaluate(&obs(PERFORMANCE_METRICS_FEED, json!({"response_time_ms": 5001})), &[])
            .unwrap();
        assert_eq!(alert.title, "Performance Degradation");
        assert_eq!(alert.kind, AlertKind::Warning);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.metadata["response_time_ms"], json!(5001));
    }

    #[test]
    fn test_performance_ignores_other_feeds() {
        let rule = PerformanceRule;
        assert!(rule.evaluate(&obs(SYSTEM_HEALTH_FEED, json!({"response_time_ms": 9000})), &[]).is_none());
    }

    #[test]
    fn test_activity_spike_needs_ten_prior_points() {
        let rule = ActivitySpikeRule;
        let short = history(USER_ACTIVITY_FEED, "active_users", &[100.0; 9]);
        assert!(rule.evaluate(&obs(USER_ACTIVITY_FEED, json!({"active_users": 1000})), &short).is_none());
    }

    #[test]
    fn test_activity_spike_fires_above_double_mean() {
        let rule = ActivitySpikeRule;
        let hist = history(USER_ACTIVITY_FEED, "active_users", &[100.0; 10]);

        assert!(rule.evaluate(&obs(USER_ACTIVITY_FEED, json!({"active_users": 200})), &hist).is_none());

        let alert = rule
            .evaluate(&obs(USER_ACTIVITY_FEED, json!({"active_users": 250})), &hist)
            .unwrap();
        assert_eq!(alert.title, "Activity Spike Detected");
        assert_eq!(alert.kind, AlertKind::Info);
        assert_eq!(alert.severity, Severity::Medium);
        let pct = alert.metadata["spike_percentage"].as_f64().unwrap();
        assert!((pct - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_activity_uses_most_recent_window() {
        let rule = ActivitySpikeRule;
        let mut values = vec![1.0; 5];
        values.extend([100.0; 10]);
        let hist = history(USER_ACTIVITY_FEED, "active_users", &values);
        assert!(rule.evaluate(&obs(USER_ACTIVITY_FEED, json!({"active_users": 150})), &hist).is_none());
    }

    #[test]
    fn test_activity_ignores_other_feeds() {
        let rule = ActivitySpikeRule;
        let hist = history("other", "active_users", &[1.0; 10]);
        assert!(rule.evaluate(&obs("other", json!({"active_users": 100})), &hist).is_none());
    }

    #[test]
    fn test_health_rule() {
        let rule = HealthRule;
        assert!(rule.evaluate(&obs(SYSTEM_HEALTH_FEED, json!({"status": "healthy"})), &[]).is_none());
        assert!(rule.evaluate(&obs(SYSTEM_HEALTH_FEED, json!({"uptime": 3})), &[]).is_none());

        let alert = rule
            .evaluate(&obs(SYSTEM_HEALTH_FEED, json!({"status": "degraded", "component": "db"})), &[])
            .unwrap();
        assert_eq!(alert.title, "System Health Issue");
        assert_eq!(alert.kind, AlertKind::Error);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.metadata["component"], json!("db"));
    }

    #[test]
    fn test_price_change_compares_previous_price() {
        let rule = PriceChangeRule;
        let hist = history(PRICING_UPDATES_FEED, "price", &[10.0, 20.0]);

        assert!(rule.evaluate(&obs(PRICING_UPDATES_FEED, json!({"price": 20.0})), &hist).is_none());

        let alert = rule
            .evaluate(&obs(PRICING_UPDATES_FEED, json!({"price": 25.0})), &hist)
            .unwrap();
        assert_eq!(alert.title, "Price Update Detected");
        assert_eq!(alert.severity, Severity::Low);
        assert_eq!(alert.metadata["old_price"], json!(20.0));
        assert_eq!(alert.metadata["new_price"], json!(25.0));
        assert_eq!(alert.metadata["change_percent"], json!(25.0));
    }

    #[test]
    fn test_price_change_needs_two_prior_points() {
        let rule = PriceChangeRule;
        let hist = history(PRICING_UPDATES_FEED, "price", &[10.0]);
        assert!(rule.evaluate(&obs(PRICING_UPDATES_FEED, json!({"price": 99.0})), &hist).is_none());
    }

    #[test]
    fn test_error_spike_exact_threshold() {
        let rule = ErrorSpikeRule;
        let hist = history(ERROR_TRACKING_FEED, "error_count", &[2.0; 5]);

        assert!(rule.evaluate(&obs(ERROR_TRACKING_FEED, json!({"error_count": 30})), &hist).is_none());

        let alert = rule
            .evaluate(&obs(ERROR_TRACKING_FEED, json!({"error_count": 31})), &hist)
            .unwrap();
        assert_eq!(alert.title, "Error Spike Detected");
        assert_eq!(alert.kind, AlertKind::Error);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.metadata["current_errors"], json!(31));
        assert_eq!(alert.metadata["baseline_errors"], json!(10.0));
    }

    #[test]
    fn test_error_spike_needs_five_prior_points() {
        let rule = ErrorSpikeRule;
        let hist = history(ERROR_TRACKING_FEED, "error_count", &[1.0; 4]);
        assert!(rule.evaluate(&obs(ERROR_TRACKING_FEED, json!({"error_count": 1000})), &hist).is_none());
    }

    #[test]
    fn test_status_field_on_other_feeds_does_not_alert() {
        let engine = RuleEngine::standard();
        let pricing = history(PRICING_UPDATES_FEED, "price", &[29.0, 29.0]);

        let alerts = engine.evaluate(&obs(PRICING_UPDATES_FEED, json!({"price": 29.0, "status": "active"})), &pricing);
        assert!(alerts.is_empty());

        let alerts = engine.evaluate(&obs(USER_ACTIVITY_FEED, json!({"active_users": 10, "status": "online"})), &[]);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_multiple_rules_fire_for_one_observation() {
        let engine = RuleEngine::standard().with_rule(PerformanceRule);
        let alerts = engine.evaluate(
            &obs(PERFORMANCE_METRICS_FEED, json!({"response_time_ms": 9000})),
            &[],
        );
        let titles: Vec<_> = alerts.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Performance Degradation", "Performance Degradation"]);
    }

    struct PanickingRule;

    impl AlertRule for PanickingRule {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn evaluate(&self, _: &Observation, _: &[Arc<Observation>]) -> Option<AlertRecord> {
            panic!("boom")
        }
    }

    #[test]
    fn test_panicking_rule_is_isolated() {
        let engine = RuleEngine::empty().with_rule(PanickingRule).with_rule(PerformanceRule);
        let alerts = engine.evaluate(&obs(PERFORMANCE_METRICS_FEED, json!({"response_time_ms": 6000})), &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(engine.len(), 2);
    }
}
