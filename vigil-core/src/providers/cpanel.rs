//! cPanel hosting client (UAPI, token auth).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::{transport_error, HostingPanel};
use crate::config::HostingConfig;
use crate::error::{Result, VigilError};
use crate::model::DomainRecord;

#[derive(Debug, Clone)]
pub struct CpanelHosting {
    http: Client,
    config: HostingConfig,
}

#[derive(Debug, Deserialize)]
struct UapiResponse {
    status: u8,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

impl UapiResponse {
    fn succeeded(&self) -> bool {
        self.status == 1
    }

    fn error_text(&self) -> String {
        self.errors
            .as_deref()
            .unwrap_or_default()
            .join("; ")
    }
}

/// A rejection that means the addon domain is already configured. Treated
/// as success so provisioning stays idempotent.
fn is_already_provisioned(error_text: &str) -> bool {
    let lower = error_text.to_lowercase();
    lower.contains("already exists") || lower.contains("already configured")
}

impl CpanelHosting {
    pub fn new(config: HostingConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    fn auth_header(&self) -> String {
        format!("cpanel {}:{}", self.config.username, self.config.api_token)
    }
}

#[async_trait]
impl HostingPanel for CpanelHosting {
    #[instrument(skip(self), fields(domain = %domain.name))]
    async fn provision(&self, domain: &DomainRecord) -> Result<()> {
        let url = format!(
            "{}/execute/AddonDomain/addaddondomain",
            self.config.base_url
        );
        let subdomain = domain.name.split('.').next().unwrap_or(&domain.name);
        let docroot = format!("public_html/{}", domain.name);

        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .query(&[
                ("newdomain", domain.name.as_str()),
                ("subdomain", subdomain),
                ("dir", docroot.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(VigilError::UpstreamRejection {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: UapiResponse = response.json().await.map_err(transport_error)?;
        if body.succeeded() {
            info!(domain = %domain.name, "addon domain provisioned");
            return Ok(());
        }

        let error_text = body.error_text();
        if is_already_provisioned(&error_text) {
            debug!(domain = %domain.name, "addon domain already present");
            return Ok(());
        }

        Err(VigilError::Hosting(error_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uapi_success_and_failure_shapes_parse() {
        let ok: UapiResponse =
            serde_json::from_str(r#"{"status": 1, "errors": null, "data": {}}"#).unwrap();
        assert!(ok.succeeded());

        let failed: UapiResponse = serde_json::from_str(
            r#"{"status": 0, "errors": ["The domain bad.com is not allowed"]}"#,
        )
        .unwrap();
        assert!(!failed.succeeded());
        assert!(failed.error_text().contains("not allowed"));
    }

    #[test]
    fn existing_addon_domain_counts_as_provisioned() {
        assert!(is_already_provisioned(
            "The addon domain example.com already exists"
        ));
        assert!(is_already_provisioned("Domain Already Configured"));
        assert!(!is_already_provisioned("quota exceeded"));
    }
}
