//! Alert event types for certificate lifecycle and impact notifications.
//!
//! Events are dispatched through the `Alerter` contract (webhook, fan-out)
//! by the certificate scheduler and any other component that needs to raise
//! operator attention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::NodeType;

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Expired,
}

/// The asset an alert is about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertAsset {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
}

/// Optional blast-radius context attached to an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertImpact {
    pub affected_count: usize,
    pub affected_services: Vec<String>,
}

/// An event delivered to alert transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Which component raised the alert (e.g. "cert-scheduler").
    pub source: String,
    /// What happened (e.g. "certificate_expiring").
    pub event_type: String,
    pub severity: AlertSeverity,
    pub asset: AlertAsset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<AlertImpact>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(
        source: &str,
        event_type: &str,
        severity: AlertSeverity,
        asset: AlertAsset,
        message: String,
    ) -> Self {
        Self {
            source: source.to_string(),
            event_type: event_type.to_string(),
            severity,
            asset,
            impact: None,
            message,
            timestamp: Utc::now(),
        }
    }
}
