//! Alert dispatch: the `Alerter` contract plus the webhook and fan-out
//! implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use atlas_core::AlertEvent;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("webhook error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{alerter}: {message}")]
    Send { alerter: String, message: String },
}

/// An alert transport.
#[async_trait]
pub trait Alerter: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &AlertEvent) -> Result<(), AlertError>;
}

/// POSTs the JSON event to a webhook URL.
pub struct WebhookAlerter {
    url: String,
    client: reqwest::Client,
}

impl WebhookAlerter {
    pub fn new(url: &str) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), AlertError> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Fans an event out to several alerters. Every transport is attempted;
/// the last error observed is returned.
pub struct MultiAlerter {
    alerters: Vec<Arc<dyn Alerter>>,
}

impl MultiAlerter {
    pub fn new(alerters: Vec<Arc<dyn Alerter>>) -> Self {
        Self { alerters }
    }
}

#[async_trait]
impl Alerter for MultiAlerter {
    fn name(&self) -> &str {
        "multi"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let mut last_error = None;

        for alerter in &self.alerters {
            if let Err(e) = alerter.send(event).await {
                tracing::error!(alerter = alerter.name(), error = %e, "Alert dispatch failed");
                last_error = Some(AlertError::Send {
                    alerter: alerter.name().to_string(),
                    message: e.to_string(),
                });
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use atlas_core::{AlertAsset, AlertSeverity, NodeType};

    fn event() -> AlertEvent {
        AlertEvent::new(
            "test",
            "certificate_expiring",
            AlertSeverity::Warning,
            AlertAsset {
                id: "probe:certificate:example.com".to_string(),
                name: "example.com".to_string(),
                asset_type: NodeType::Certificate,
                expires_at: None,
                days_remaining: Some(12),
            },
            "expires in 12 days".to_string(),
        )
    }

    struct Counting {
        name: &'static str,
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Alerter for Counting {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, _event: &AlertEvent) -> Result<(), AlertError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AlertError::Send {
                    alerter: self.name.to_string(),
                    message: "transport down".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn counting(name: &'static str, fail: bool) -> Arc<Counting> {
        Arc::new(Counting {
            name,
            sent: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn multi_attempts_every_alerter_and_returns_last_error() {
        let first = counting("first", true);
        let second = counting("second", false);
        let third = counting("third", true);

        let multi = MultiAlerter::new(vec![
            first.clone() as Arc<dyn Alerter>,
            second.clone(),
            third.clone(),
        ]);

        let err = multi.send(&event()).await.unwrap_err();
        assert!(err.to_string().contains("third"));

        assert_eq!(first.sent.load(Ordering::SeqCst), 1);
        assert_eq!(second.sent.load(Ordering::SeqCst), 1);
        assert_eq!(third.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multi_succeeds_when_all_succeed() {
        let multi = MultiAlerter::new(vec![
            counting("a", false) as Arc<dyn Alerter>,
            counting("b", false),
        ]);
        assert!(multi.send(&event()).await.is_ok());
    }
}
