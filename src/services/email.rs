//! Buyer-facing transactional email. SMTP via lettre; a null sender stands in
//! when SMTP is not configured so fan-out callers never special-case it.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

use crate::{config::SmtpConfig, errors::ServiceError};

/// Fire-and-forget email boundary. Callers treat every failure as
/// best-effort: log and move on.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ServiceError>;
}

/// SMTP-backed sender.
#[derive(Clone)]
pub struct SmtpEmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, ServiceError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| ServiceError::EmailError(e.to_string()))?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ServiceError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| ServiceError::EmailError(format!(
                        "invalid from address: {}",
                        self.from_address
                    )))?,
            )
            .to(to
                .parse()
                .map_err(|_| ServiceError::EmailError(format!("invalid to address: {}", to)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| ServiceError::EmailError(e.to_string()))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| ServiceError::EmailError(e.to_string()))?;

        info!(to = %to, subject = %subject, "Email dispatched");
        Ok(())
    }
}

/// Sender used when SMTP is unconfigured (and in tests): logs and drops.
#[derive(Clone, Default)]
pub struct NullEmailSender;

#[async_trait]
impl EmailSender for NullEmailSender {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), ServiceError> {
        debug!(to = %to, subject = %subject, "SMTP not configured; dropping email");
        Ok(())
    }
}
