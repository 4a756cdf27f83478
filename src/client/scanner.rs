use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::api::{ApiClient, ApiRequest};
use super::error::ClientError;
use crate::models::{EntryOutcome, EntryValidationRequest, EntryValidationResponse};

#[derive(Debug, Clone)]
pub struct ScanPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Could not reach the server after {attempts} attempt(s), please try again")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Client(ClientError),
}

/// Presents scanned codes to the server. The server decides; the scanner
/// only retries when no answer came back.
#[derive(Debug, Clone)]
pub struct EntryScanner {
    client: ApiClient,
    policy: ScanPolicy,
}

impl EntryScanner {
    pub fn new(client: ApiClient) -> Self {
        Self::with_policy(client, ScanPolicy::default())
    }

    pub fn with_policy(client: ApiClient, policy: ScanPolicy) -> Self {
        Self { client, policy }
    }

    /// Validates a raw scanner payload, optionally scoped to one event.
    pub async fn scan(
        &self,
        payload: &str,
        event_id: Option<i64>,
    ) -> Result<EntryOutcome, ScanError> {
        let body = EntryValidationRequest {
            qr_content: Some(payload.to_string()),
            event_id,
        };
        let request = ApiRequest::post("registrations/validate_qr/")
            .json(&body)
            .map_err(ScanError::Client)?;
        self.present(request).await
    }

    /// Validates a registration addressed by id.
    pub async fn validate_registration(&self, id: i64) -> Result<EntryOutcome, ScanError> {
        self.present(ApiRequest::post(format!("registrations/{}/validate_qr/", id)))
            .await
    }

    /// Sends `request`, retrying only when no response arrived.
    ///
    /// A lost response does not mean the server did nothing: if it had already
    /// marked the code used, the retry reports `AlreadyUsed` for what was in
    /// fact this scan's own admission. Such outcomes are logged with the
    /// attempt number so the operator can tell them apart.
    async fn present(&self, request: ApiRequest) -> Result<EntryOutcome, ScanError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(request.clone()).await {
                Err(ClientError::Transport(source)) => {
                    if attempt >= max_attempts {
                        return Err(ScanError::Transport {
                            attempts: attempt,
                            source,
                        });
                    }
                    warn!(
                        "Entry validation attempt {}/{} failed: {}",
                        attempt, max_attempts, source
                    );
                    attempt += 1;
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(other) => return Err(ScanError::Client(other)),
                Ok(outcome) => {
                    if attempt > 1 {
                        log_retried_outcome(attempt, &outcome);
                    }
                    return Ok(outcome);
                }
            }
        }
    }

    async fn attempt(&self, request: ApiRequest) -> Result<EntryOutcome, ClientError> {
        let response = self.client.execute(request).await?;

        let carries_outcome = matches!(
            response.status,
            StatusCode::OK | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        );

        match response.json::<EntryValidationResponse>() {
            Ok(body) if carries_outcome => Ok(EntryOutcome::try_from(body)?),
            Err(e) if response.is_success() => Err(e),
            _ => Err(response.error()),
        }
    }
}

fn log_retried_outcome(attempt: u32, outcome: &EntryOutcome) {
    match outcome {
        EntryOutcome::AlreadyUsed(details) => warn!(
            "Entry code of registration {} reported already used on attempt {}; \
             an earlier attempt may have admitted it at {}",
            details.registration.id, attempt, details.used_at
        ),
        EntryOutcome::Accepted(details) => info!(
            "Entry of registration {} accepted on attempt {}",
            details.registration.id, attempt
        ),
        EntryOutcome::Denied(reason) => {
            info!("Entry denied on attempt {}: {:?}", attempt, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_retries_three_times() {
        let policy = ScanPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.retry_delay, Duration::from_millis(500));
    }
}
