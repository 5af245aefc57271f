use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub recording_id: Uuid,
    pub owner: String,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn completed(recording_id: Uuid, owner: &str, recording_title: &str) -> Self {
        Self {
            recording_id,
            owner: owner.to_string(),
            title: "Recording Complete".to_string(),
            body: format!("Recording \"{}\" has completed successfully", recording_title),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Notification delivery never affects the recording; errors are logged
pub async fn deliver(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        warn!(
            recording_id = %notification.recording_id,
            "[notify] delivery failed: {}", e
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        info!(recording_id = %n.recording_id, owner = n.owner, "[notify] {}: {}", n.title, n.body);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    urls: Vec<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        Ok(Self {
            urls,
            client: Client::builder()
                .connect_timeout(Duration::from_millis(300))
                .timeout(Duration::from_millis(500))
                .build()?,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        let req_body = serde_json::to_string(n)?;
        let mut failed = 0;
        for url in self.urls.iter() {
            match self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .body(req_body.clone())
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    debug!(url, status = ?response.status(), req_body, "[notify] webhook success");
                }
                Ok(response) => {
                    let status = response.status();
                    let res_body = response.text().await.unwrap_or_default();
                    warn!(url, ?status, req_body, res_body, "[notify] webhook error");
                    failed += 1;
                }
                Err(err) => {
                    warn!(url, req_body, ?err, "[notify] webhook error");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            Err(anyhow!("{} of {} webhook(s) failed", failed, self.urls.len()))
        } else {
            Ok(())
        }
    }
}

/// Fans one notification out to every configured notifier
pub struct Notifiers(pub Vec<Box<dyn Notifier>>);

#[async_trait]
impl Notifier for Notifiers {
    async fn notify(&self, n: &Notification) -> Result<()> {
        let mut last = Ok(());
        for notifier in self.0.iter() {
            if let Err(e) = notifier.notify(n).await {
                last = Err(e);
            }
        }
        last
    }
}
