use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("Failed to send SMS: {0}")]
    SendFailed(String),
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SmsService: Send + Sync {
    async fn send_verification_code(&self, to_phone: &str, code: &str) -> Result<(), SmsError>;
}

/// Writes text messages to the log. No SMS gateway is wired in yet.
#[derive(Default)]
pub struct ConsoleSmsService;

impl ConsoleSmsService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SmsService for ConsoleSmsService {
    async fn send_verification_code(&self, to_phone: &str, code: &str) -> Result<(), SmsError> {
        tracing::info!("[CONSOLE SMS] Verification code to: {}", to_phone);
        tracing::info!("   Code: {}", code);
        Ok(())
    }
}
