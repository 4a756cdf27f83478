use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::env;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Failed to build email message: {0}")]
    MessageBuild(String),
    #[error("Failed to send email: {0}")]
    SendFailed(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Everything a ticket email needs to show.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub attendee: String,
    pub event_name: String,
    pub event_date: String,
    pub location: String,
    pub entry_code: String,
}

impl Ticket {
    pub fn subject(&self) -> String {
        format!("Your ticket for {}", self.event_name)
    }
}

pub const VERIFICATION_SUBJECT: &str = "Verify your EventoApp email";

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait EmailService: Send + Sync {
    async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<(), EmailError>;
    async fn send_ticket(&self, to_email: &str, ticket: &Ticket) -> Result<(), EmailError>;
}

/// Writes emails to the log instead of sending them.
#[derive(Default)]
pub struct ConsoleEmailService;

impl ConsoleEmailService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailService for ConsoleEmailService {
    async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<(), EmailError> {
        tracing::info!("[CONSOLE EMAIL] Verification code to: {}", to_email);
        tracing::info!("   Subject: {}", VERIFICATION_SUBJECT);
        tracing::info!("   Code: {}", code);
        Ok(())
    }

    async fn send_ticket(&self, to_email: &str, ticket: &Ticket) -> Result<(), EmailError> {
        tracing::info!("[CONSOLE EMAIL] Ticket to: {}", to_email);
        tracing::info!("   Subject: {}", ticket.subject());
        tracing::info!("   Attendee: {}", ticket.attendee);
        tracing::info!("   Entry code: {}", ticket.entry_code);
        Ok(())
    }
}

pub struct SmtpEmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpEmailService {
    pub fn new() -> Result<Self, EmailError> {
        let smtp_host = env::var("SMTP_HOST")
            .map_err(|_| EmailError::ConfigError("SMTP_HOST not set".to_string()))?;
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse::<u16>()
            .map_err(|_| EmailError::ConfigError("Invalid SMTP_PORT".to_string()))?;
        let smtp_username = env::var("SMTP_USERNAME")
            .map_err(|_| EmailError::ConfigError("SMTP_USERNAME not set".to_string()))?;
        let smtp_password = env::var("SMTP_PASSWORD")
            .map_err(|_| EmailError::ConfigError("SMTP_PASSWORD not set".to_string()))?;
        let from_email = env::var("SMTP_FROM_EMAIL")
            .map_err(|_| EmailError::ConfigError("SMTP_FROM_EMAIL not set".to_string()))?;
        let from_name = env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "EventoApp".to_string());

        let encryption = env::var("SMTP_ENCRYPTION").unwrap_or_else(|_| "starttls".to_string());

        let credentials = Credentials::new(smtp_username, smtp_password);

        let mailer = match encryption.to_lowercase().as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_host)
                .map_err(|e| EmailError::ConfigError(format!("SMTP relay error: {}", e)))?
                .port(smtp_port)
                .credentials(credentials)
                .build(),
            "starttls" => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_host)
                .map_err(|e| EmailError::ConfigError(format!("SMTP starttls error: {}", e)))?
                .port(smtp_port)
                .credentials(credentials)
                .build(),
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_host)
                .port(smtp_port)
                .credentials(credentials)
                .build(),
            _ => {
                return Err(EmailError::ConfigError(format!(
                    "Invalid SMTP_ENCRYPTION value: {}. Use 'tls', 'starttls', or 'none'",
                    encryption
                )))
            }
        };

        Ok(Self {
            mailer,
            from_email,
            from_name,
        })
    }

    async fn deliver(&self, to_email: &str, subject: &str, body: String) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                format!("{} <{}>", self.from_name, self.from_email)
                    .parse()
                    .map_err(|e| {
                        EmailError::MessageBuild(format!("Invalid from address: {}", e))
                    })?,
            )
            .to(to_email
                .parse()
                .map_err(|e| EmailError::MessageBuild(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| EmailError::MessageBuild(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl EmailService for SmtpEmailService {
    async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<(), EmailError> {
        let html_body = format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="color: #333;">Confirm your email</h1>
    <p>Enter this code in the app to verify your address:</p>
    <p style="text-align: center; font-size: 32px; letter-spacing: 8px; margin: 30px 0;"><strong>{}</strong></p>
    <p style="color: #999; font-size: 12px; margin-top: 40px;">This code expires in 15 minutes.</p>
</body>
</html>
"#,
            code
        );

        self.deliver(to_email, VERIFICATION_SUBJECT, html_body).await
    }

    async fn send_ticket(&self, to_email: &str, ticket: &Ticket) -> Result<(), EmailError> {
        let html_body = format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="color: #333;">{}</h1>
    <p>Hi {}, your registration is confirmed.</p>
    <div style="background-color: #f5f5f5; padding: 15px; border-radius: 4px; margin: 20px 0;">
        <p style="margin: 5px 0;"><strong>Date:</strong> {}</p>
        <p style="margin: 5px 0;"><strong>Location:</strong> {}</p>
    </div>
    <p>Show this entry code at the door:</p>
    <p style="font-family: monospace; font-size: 16px; word-break: break-all;">{}</p>
</body>
</html>
"#,
            ticket.event_name, ticket.attendee, ticket.event_date, ticket.location, ticket.entry_code
        );

        self.deliver(to_email, &ticket.subject(), html_body).await
    }
}

/// Picks the backend from `EMAIL_BACKEND` (`smtp` or `console`).
pub fn create_email_service() -> Arc<dyn EmailService> {
    let backend = env::var("EMAIL_BACKEND").unwrap_or_else(|_| "console".to_string());

    if backend.eq_ignore_ascii_case("smtp") {
        match SmtpEmailService::new() {
            Ok(service) => {
                tracing::info!("Using SMTP email service");
                return Arc::new(service);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize SMTP email service: {}. Falling back to console",
                    e
                );
            }
        }
    } else {
        tracing::info!("Using console email service (emails will be logged)");
    }

    Arc::new(ConsoleEmailService::new())
}
