pub mod mailgun;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;

pub use mailgun::MailgunMailer;

/// A rendered email ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// `body` is kept for logging only and is not part of the message.
    #[error("Mail provider rejected message with status {status}")]
    Rejected { status: u16, body: String },
}

/// Outbound mail provider.
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError>;

    fn name(&self) -> &'static str;
}

/// Build the provider selected by configuration (Mailgun, or a dry-run
/// logger when no API key is set).
pub fn from_config(config: &Config) -> Result<Arc<dyn MailProvider>, DeliveryError> {
    if config.mail_dry_run() {
        tracing::warn!("MAILGUN_API_KEY not set, emails will only be logged");
        return Ok(Arc::new(DryRunMailer));
    }

    Ok(Arc::new(MailgunMailer::new(config)?))
}

/// Logs emails instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunMailer;

#[async_trait]
impl MailProvider for DryRunMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        tracing::info!(to = %email.to, subject = %email.subject, "Dry run: email not sent");
        tracing::debug!(body = %email.html, "Dry run email body");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
