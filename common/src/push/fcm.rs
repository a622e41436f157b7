// FCM HTTP v1 push sender implementation

use crate::config::PushConfig;
use crate::errors::PushError;
use crate::models::{PushMessage, SendOutcome};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Push collaborator capable of submitting a batch of messages.
///
/// One `send_batch` call covers the whole batch. Per-message delivery results
/// come back as `SendOutcome` entries in batch order; a `PushError` is
/// reserved for the sender being unable to operate at all.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<SendOutcome>, PushError>;
}

/// FCM-backed push sender using the HTTP v1 messages:send endpoint.
///
/// The v1 API accepts one message per request, so a batch is posted as a
/// sequence of requests inside the single `send_batch` call. A failed request
/// is recorded in that message's outcome and does not abort the rest of the
/// batch.
pub struct FcmPushSender {
    client: Client,
    endpoint: String,
    auth_token: String,
}

impl FcmPushSender {
    /// Create a new FCM sender from push configuration
    pub fn new(config: &PushConfig) -> Result<Self, PushError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| PushError::RequestBuild(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = config.endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://fcm.googleapis.com/v1/projects/{}/messages:send",
                config.project_id
            )
        });

        Ok(Self {
            client,
            endpoint,
            auth_token: config.auth_token.clone(),
        })
    }

    /// Post a single message and convert the response into an outcome
    ///
    /// A 401/403 response means the configured credentials are rejected; that
    /// applies to every message in the batch, so it surfaces as a batch-level
    /// error instead of a per-message outcome.
    async fn send_one(&self, message: &PushMessage) -> Result<SendOutcome, PushError> {
        let body = json!({
            "message": {
                "token": message.token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                debug!(token = %message.token, "Push message accepted");
                Ok(SendOutcome::delivered(message.token.clone()))
            }
            Ok(resp) => {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    warn!(status = %status, "Push endpoint rejected credentials");
                    return Err(PushError::BatchRejected(format!(
                        "status {}: {}",
                        status, detail
                    )));
                }
                warn!(
                    token = %message.token,
                    status = %status,
                    "Push endpoint rejected message"
                );
                Ok(SendOutcome::failed(
                    message.token.clone(),
                    format!("status {}: {}", status, detail),
                ))
            }
            Err(e) => {
                warn!(token = %message.token, error = %e, "Push request failed");
                Ok(SendOutcome::failed(message.token.clone(), e.to_string()))
            }
        }
    }
}

#[async_trait]
impl PushSender for FcmPushSender {
    #[instrument(skip(self, messages), fields(batch_size = messages.len()))]
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<SendOutcome>, PushError> {
        let mut outcomes = Vec::with_capacity(messages.len());

        for message in messages {
            outcomes.push(self.send_one(message).await?);
        }

        let failed = outcomes.iter().filter(|o| !o.success).count();
        debug!(
            batch_size = messages.len(),
            failed, "Push batch completed"
        );

        Ok(outcomes)
    }
}
