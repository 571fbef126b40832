//! Periodic drivers: discovery sweeps and certificate probes.
//!
//! Both schedulers tick on a fixed interval (duration text, at least one
//! minute), stop cooperatively, and drain the in-flight tick before
//! `stop()` returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use atlas_core::{AlertAsset, AlertEvent, AlertSeverity, ConfigError};
use atlas_store::AssetStore;

use atlas_certs::{discover_endpoints, probe_and_store, CertRecord, CertStatus};

use crate::alert::Alerter;
use crate::scanner::{ScanRequest, Scanner};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Parse a duration text, rejecting anything under one minute.
pub fn parse_interval(text: &str) -> Result<Duration, ConfigError> {
    let interval = humantime::parse_duration(text).map_err(|e| ConfigError::InvalidInterval {
        value: text.to_string(),
        reason: e.to_string(),
    })?;

    if interval < Duration::from_secs(60) {
        return Err(ConfigError::InvalidInterval {
            value: text.to_string(),
            reason: "must be at least 1 minute".to_string(),
        });
    }

    Ok(interval)
}

/// A running scheduler loop; dropping it detaches the loop, `stop()`
/// cancels it and waits for the in-flight tick.
pub struct SchedulerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel the loop and wait for the current tick to drain.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

// ── Scan scheduler ───────────────────────────────────────────────

/// Runs the aggregate scan on a fixed interval, skipping ticks while any
/// scan is already in flight.
pub struct ScanScheduler {
    scanner: Scanner,
    interval: Duration,
}

impl ScanScheduler {
    pub fn new(scanner: Scanner, interval_text: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            scanner,
            interval: parse_interval(interval_text)?,
        })
    }

    /// Spawn the tick loop. The first tick fires immediately.
    pub fn start(self) -> SchedulerHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => self.tick().await,
                }
            }
            tracing::info!("Scan scheduler stopped");
        });

        SchedulerHandle { token, handle }
    }

    async fn tick(&self) {
        if self.scanner.is_running() {
            tracing::info!("Scan already in flight, skipping scheduled run");
            return;
        }

        if let Err(e) = self.scanner.run_scan(&ScanRequest::all()).await {
            tracing::error!(error = %e, "Scheduled scan failed");
        }
    }
}

// ── Certificate scheduler ────────────────────────────────────────

/// Re-probes every TLS endpoint known to the graph and alerts on
/// certificates at warning severity or worse.
pub struct CertScheduler {
    store: Arc<AssetStore>,
    alerter: Arc<dyn Alerter>,
    interval: Duration,
}

impl CertScheduler {
    pub fn new(
        store: Arc<AssetStore>,
        alerter: Arc<dyn Alerter>,
        interval_text: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            store,
            alerter,
            interval: parse_interval(interval_text)?,
        })
    }

    /// Spawn the tick loop. The first tick fires immediately.
    pub fn start(self) -> SchedulerHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => self.tick().await,
                }
            }
            tracing::info!("Certificate scheduler stopped");
        });

        SchedulerHandle { token, handle }
    }

    async fn tick(&self) {
        let endpoints = match discover_endpoints(&self.store).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                tracing::error!(error = %e, "Endpoint discovery failed");
                return;
            }
        };

        tracing::debug!(count = endpoints.len(), "Probing TLS endpoints");

        for endpoint in endpoints {
            let node = match probe_and_store(&self.store, &endpoint, PROBE_TIMEOUT).await {
                Ok(node) => node,
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "Certificate probe failed");
                    continue;
                }
            };

            let record = classify_node(node);
            if !record.status.is_alertable() {
                continue;
            }

            let event = build_alert(&record);
            if let Err(e) = self.alerter.send(&event).await {
                tracing::error!(endpoint = %endpoint, error = %e, "Alert dispatch failed");
            }
        }
    }
}

fn classify_node(node: atlas_core::Node) -> CertRecord {
    let now = chrono::Utc::now();
    let days_remaining = node.expires_at.map(|exp| atlas_certs::days_until(now, exp));
    let status = days_remaining.map_or(CertStatus::Unknown, atlas_certs::classify_days);
    CertRecord {
        node,
        days_remaining,
        status,
    }
}

pub(crate) fn build_alert(record: &CertRecord) -> AlertEvent {
    let days = record.days_remaining.unwrap_or_default();
    let (event_type, severity, message) = match record.status {
        CertStatus::Expired => (
            "certificate_expired",
            AlertSeverity::Expired,
            format!("certificate {} expired {} days ago", record.node.name, -days),
        ),
        CertStatus::Critical => (
            "certificate_expiring",
            AlertSeverity::Critical,
            format!("certificate {} expires in {days} days", record.node.name),
        ),
        _ => (
            "certificate_expiring",
            AlertSeverity::Warning,
            format!("certificate {} expires in {days} days", record.node.name),
        ),
    };

    AlertEvent::new(
        "cert-scheduler",
        event_type,
        severity,
        AlertAsset {
            id: record.node.id.clone(),
            name: record.node.name.clone(),
            asset_type: record.node.node_type,
            expires_at: record.node.expires_at,
            days_remaining: record.days_remaining,
        },
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use atlas_core::config::SourceSettings;
    use atlas_core::{Node, NodeType, ScanStatus};

    use crate::alert::AlertError;
    use crate::parser::{ParseResult, SourceParser};
    use crate::scanner::ScanOptions;

    #[test]
    fn interval_parsing_enforces_floor() {
        assert!(parse_interval("5m").is_ok());
        assert!(parse_interval("1h").is_ok());
        assert!(parse_interval("60s").is_ok());

        assert!(matches!(
            parse_interval("30s"),
            Err(ConfigError::InvalidInterval { .. })
        ));
        assert!(matches!(
            parse_interval("soon"),
            Err(ConfigError::InvalidInterval { .. })
        ));
    }

    struct SlowParser;

    #[async_trait]
    impl SourceParser for SlowParser {
        fn name(&self) -> &str {
            "slow"
        }

        fn supported(&self, _path: &str) -> bool {
            true
        }

        async fn parse(
            &self,
            _path: &str,
            _options: &ScanOptions,
        ) -> crate::error::Result<ParseResult> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ParseResult::default())
        }
    }

    #[tokio::test]
    async fn tick_skips_while_scan_is_running() {
        let store = Arc::new(AssetStore::open_in_memory().await.unwrap());
        let scanner = Scanner::new(
            store.clone(),
            store.clone(),
            vec![Arc::new(SlowParser)],
            vec![],
        );

        let scan_id = scanner
            .run_scan_async(ScanRequest::new("slow", vec![]))
            .await
            .unwrap();
        assert!(scanner.is_running());
        let rows_before = store.list_scans(100).await.unwrap().len();

        let scheduler = ScanScheduler::new(scanner.clone(), "5m").unwrap();
        scheduler.tick().await;

        // The skipped tick must not have recorded a new scan.
        assert_eq!(store.list_scans(100).await.unwrap().len(), rows_before);

        scanner.cancel(scan_id);
    }

    #[tokio::test]
    async fn tick_runs_aggregate_when_idle() {
        let store = Arc::new(AssetStore::open_in_memory().await.unwrap());
        let scanner = Scanner::new(
            store.clone(),
            store.clone(),
            vec![],
            Vec::<SourceSettings>::new(),
        );

        let scheduler = ScanScheduler::new(scanner, "5m").unwrap();
        scheduler.tick().await;

        let scans = store.list_scans(10).await.unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].source, "all");
        assert_eq!(scans[0].status, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn scheduler_stop_drains_and_returns() {
        let store = Arc::new(AssetStore::open_in_memory().await.unwrap());
        let scanner = Scanner::new(store.clone(), store.clone(), vec![], vec![]);

        let handle = ScanScheduler::new(scanner, "5m").unwrap().start();
        // The first tick fires immediately; give it a moment to land.
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        let scans = store.list_scans(10).await.unwrap();
        assert_eq!(scans.len(), 1);
    }

    struct CountingAlerter {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Alerter for CountingAlerter {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, _event: &AlertEvent) -> Result<(), AlertError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn cert_tick_with_no_endpoints_sends_nothing() {
        let store = Arc::new(AssetStore::open_in_memory().await.unwrap());
        let alerter = Arc::new(CountingAlerter {
            sent: AtomicUsize::new(0),
        });

        let scheduler =
            CertScheduler::new(store, alerter.clone() as Arc<dyn Alerter>, "12h").unwrap();
        scheduler.tick().await;

        assert_eq!(alerter.sent.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn alert_shape_follows_status() {
        let mut node = Node::new("probe", NodeType::Certificate, "api.example.com");
        node.expires_at =
            Some(chrono::Utc::now() + chrono::Duration::days(3) + chrono::Duration::hours(1));
        let record = classify_node(node);

        let event = build_alert(&record);
        assert_eq!(event.severity, AlertSeverity::Critical);
        assert_eq!(event.event_type, "certificate_expiring");
        assert_eq!(event.asset.days_remaining, Some(3));
        assert!(event.message.contains("expires in 3 days"));

        let mut expired = Node::new("probe", NodeType::Certificate, "old.example.com");
        expired.expires_at = Some(chrono::Utc::now() - chrono::Duration::days(2));
        let event = build_alert(&classify_node(expired));
        assert_eq!(event.severity, AlertSeverity::Expired);
        assert_eq!(event.event_type, "certificate_expired");
    }
}
