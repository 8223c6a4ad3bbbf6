//! Administrator alerting through an HTTP mail relay.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, instrument};

use super::{transport_error, Notifier};
use crate::config::MailConfig;
use crate::error::{Result, VigilError};

/// Sends mail through a Mailgun-style HTTP relay: form POST, API-key basic
/// auth, fixed sender and recipient from configuration.
#[derive(Debug, Clone)]
pub struct MailRelayNotifier {
    http: Client,
    config: MailConfig,
}

impl MailRelayNotifier {
    pub fn new(config: MailConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    fn form_fields<'a>(&'a self, subject: &'a str, body: &'a str) -> [(&'static str, &'a str); 4] {
        [
            ("from", self.config.from.as_str()),
            ("to", self.config.admin_email.as_str()),
            ("subject", subject),
            ("text", body),
        ]
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    #[instrument(skip(self, body), fields(subject = %subject))]
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.config.relay_url)
            .basic_auth("api", Some(&self.config.api_key))
            .form(&self.form_fields(subject, body))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(VigilError::Notify(format!(
                "mail relay returned status {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        info!(to = %self.config.admin_email, "notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_fields_carry_configured_addresses() {
        let notifier = MailRelayNotifier::new(
            MailConfig {
                relay_url: "https://relay.example/v3/messages".into(),
                api_key: "key".into(),
                from: "vigil@example.com".into(),
                admin_email: "ops@example.com".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let fields = notifier.form_fields("Domain switched", "now serving b.com");
        assert_eq!(fields[0], ("from", "vigil@example.com"));
        assert_eq!(fields[1], ("to", "ops@example.com"));
        assert_eq!(fields[2], ("subject", "Domain switched"));
        assert_eq!(fields[3], ("text", "now serving b.com"));
    }
}
