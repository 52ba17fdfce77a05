//! Digest notifications
//!
//! Optional webhook ping fired after a digest is stored. Delivery is best
//! effort; callers log failures and move on so a dead webhook never blocks
//! generation.

use crate::config::NotifierConfig;
use crate::error::{Error, Result};
use crate::types::MoodDigest;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Notification sink interface (allows mocking in tests)
pub trait DigestNotifier: Send + Sync {
    fn digest_generated(&self, digest: &MoodDigest) -> Result<()>;
}

/// Posts a small JSON event to a configured webhook URL
pub struct WebhookNotifier {
    url: String,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl WebhookNotifier {
    /// Build from config; `None` when notifications are disabled or no URL
    /// is configured.
    pub fn from_config(config: &NotifierConfig) -> Result<Option<Self>> {
        if !config.is_ready() {
            return Ok(None);
        }

        let url = config
            .webhook_url
            .clone()
            .ok_or_else(|| Error::Config("notifier enabled without webhook_url".to_string()))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Io)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Notify(format!("failed to build http client: {e}")))?;

        Ok(Some(Self { url, runtime, http }))
    }
}

impl DigestNotifier for WebhookNotifier {
    fn digest_generated(&self, digest: &MoodDigest) -> Result<()> {
        let body = json!({
            "event": "digest_generated",
            "user_id": digest.user_id,
            "year": digest.year,
            "month": digest.month,
            "week_index": digest.week_index,
            "days_analyzed": digest.days_analyzed,
            "is_final": digest.is_final,
        });

        let resp = self
            .runtime
            .block_on(async { self.http.post(&self.url).json(&body).send().await })
            .map_err(|e| Error::Notify(format!("webhook request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Notify(format!(
                "webhook returned status {}",
                resp.status()
            )));
        }

        debug!(user_id = %digest.user_id, url = %self.url, "digest webhook delivered");
        Ok(())
    }
}
