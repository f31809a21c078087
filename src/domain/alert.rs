//! Alert records produced by the rule engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Presentation category of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Urgency of an alert, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A structured notification produced when an observation trips a rule.
///
/// Only `acknowledged` ever changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Unique alert identifier (UUID v4).
    pub id: String,
    /// Presentation category.
    pub kind: AlertKind,
    /// Urgency.
    pub severity: Severity,
    /// Short headline, e.g. "Error Spike Detected".
    pub title: String,
    /// Human-readable detail.
    pub message: String,
    /// Timestamp of the observation that triggered the alert.
    pub timestamp: DateTime<Utc>,
    /// Whether an operator has acknowledged the alert.
    pub acknowledged: bool,
    /// Rule-specific values (thresholds, measured values, feed).
    pub metadata: BTreeMap<String, Value>,
}

impl AlertRecord {
    /// Create an unacknowledged alert with a fresh id.
    pub fn new(
        kind: AlertKind,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            severity,
            title: title.into(),
            message: message.into(),
            timestamp,
            acknowledged: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
