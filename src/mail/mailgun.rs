use async_trait::async_trait;
use reqwest::Client;

use super::{DeliveryError, MailProvider, OutboundEmail};
use crate::config::Config;

#[derive(Clone)]
pub struct MailgunMailer {
    client: Client,
    api_base: String,
    domain: String,
    api_key: String,
    from: String,
}

impl MailgunMailer {
    pub fn new(config: &Config) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(config.mail_timeout).build()?;

        Ok(Self {
            client,
            api_base: config.mailgun_api_base.trim_end_matches('/').to_string(),
            domain: config.mailgun_domain.clone(),
            api_key: config.mailgun_api_key.clone(),
            from: config.mailgun_from.clone(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v3/{}/messages", self.api_base, self.domain)
    }
}

#[async_trait]
impl MailProvider for MailgunMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        let form = [
            ("from", self.from.as_str()),
            ("to", email.to.as_str()),
            ("subject", email.subject.as_str()),
            ("html", email.html.as_str()),
        ];

        let res = self
            .client
            .post(self.messages_url())
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(to = %email.to, status, body = %body, "Mailgun rejected message");
            return Err(DeliveryError::Rejected { status, body });
        }

        tracing::info!(to = %email.to, "Email sent");
        tracing::debug!(subject = %email.subject, "Sent email subject");

        Ok(())
    }

    fn name(&self) -> &'static str {
        "mailgun"
    }
}
