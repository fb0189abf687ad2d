//! Notification HTTP client
//!
//! Thin wrapper over the backend's notification endpoints.

use reqwest::{Client, Response};
use sincronica_shared::{Notification, UserId};

use crate::config::Config;
use crate::error::{NotificationError, NotificationResult};

/// Client for the backend notification API
#[derive(Debug, Clone)]
pub struct NotificationClient {
    client: Client,
    base_url: String,
}

impl NotificationClient {
    /// Create a client from config, applying the configured request timeout
    pub fn new(config: &Config) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self::with_client(client, &config.api_url))
    }

    /// Create a client around an existing reqwest client
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/notifications/{userId}`
    pub async fn fetch(&self, user_id: UserId) -> NotificationResult<Vec<Notification>> {
        let url = format!("{}/api/notifications/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await?;
        let notifications = check_status(response).await?.json().await?;
        Ok(notifications)
    }

    /// `PUT /api/notifications/{id}/read`
    pub async fn mark_read(&self, notification_id: i64) -> NotificationResult<()> {
        let url = format!("{}/api/notifications/{}/read", self.base_url, notification_id);
        let response = self.client.put(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    /// `PUT /api/notifications/read-all/{userId}`
    pub async fn mark_all_read(&self, user_id: UserId) -> NotificationResult<()> {
        let url = format!("{}/api/notifications/read-all/{}", self.base_url, user_id);
        let response = self.client.put(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Turn a non-success response into [`NotificationError::Status`]
async fn check_status(response: Response) -> NotificationResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(
        status = %status,
        url = %url,
        "Notification API request failed"
    );
    Err(NotificationError::Status { status, body })
}
