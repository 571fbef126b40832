//! Certificate lifetime classification.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a certificate sits in its lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CertStatus {
    Ok,
    Warning,
    Critical,
    Expired,
    /// No expiry recorded for the asset.
    Unknown,
}

impl CertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertStatus::Ok => "ok",
            CertStatus::Warning => "warning",
            CertStatus::Critical => "critical",
            CertStatus::Expired => "expired",
            CertStatus::Unknown => "unknown",
        }
    }

    /// Whether this status warrants an alert.
    pub fn is_alertable(&self) -> bool {
        matches!(
            self,
            CertStatus::Warning | CertStatus::Critical | CertStatus::Expired
        )
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify by whole days remaining.
pub fn classify_days(days: i64) -> CertStatus {
    if days < 0 {
        CertStatus::Expired
    } else if days <= 7 {
        CertStatus::Critical
    } else if days <= 30 {
        CertStatus::Warning
    } else {
        CertStatus::Ok
    }
}

/// Whole days from `now` until `expires_at`, floored so that any partial
/// day already past counts as expired.
pub fn days_until(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().div_euclid(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn classification_table() {
        assert_eq!(classify_days(-1), CertStatus::Expired);
        assert_eq!(classify_days(0), CertStatus::Critical);
        assert_eq!(classify_days(7), CertStatus::Critical);
        assert_eq!(classify_days(8), CertStatus::Warning);
        assert_eq!(classify_days(30), CertStatus::Warning);
        assert_eq!(classify_days(31), CertStatus::Ok);
        assert_eq!(classify_days(365), CertStatus::Ok);
    }

    #[test]
    fn days_until_floors_partial_days() {
        let now = Utc::now();
        assert_eq!(days_until(now, now + Duration::hours(12)), 0);
        assert_eq!(days_until(now, now + Duration::days(3)), 3);
        // Half a day past expiry is already expired, not "0 days left".
        assert_eq!(days_until(now, now - Duration::hours(12)), -1);
    }

    #[test]
    fn alertable_statuses() {
        assert!(!CertStatus::Ok.is_alertable());
        assert!(!CertStatus::Unknown.is_alertable());
        assert!(CertStatus::Warning.is_alertable());
        assert!(CertStatus::Critical.is_alertable());
        assert!(CertStatus::Expired.is_alertable());
    }
}
