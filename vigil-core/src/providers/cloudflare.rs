//! Cloudflare DNS client (v4 JSON API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{transport_error, DnsProvider};
use crate::error::{Result, VigilError};
use crate::model::DomainRecord;

const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
const DNS_TTL: u32 = 300;

#[derive(Debug, Clone)]
pub struct CloudflareDns {
    http: Client,
    base_url: String,
    api_token: String,
    zone_id: String,
}

#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RecordInfo {
    pub(crate) id: String,
    pub(crate) content: String,
}

/// What an upsert has to do given the records already present.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum UpsertPlan {
    Create,
    Update(String),
    Noop,
}

/// Decide between create, update, and no-op so that repeated calls with the
/// same target converge without issuing writes.
pub(crate) fn plan_upsert(existing: &[RecordInfo], target: &str) -> UpsertPlan {
    match existing.first() {
        None => UpsertPlan::Create,
        Some(record) if record.content == target => UpsertPlan::Noop,
        Some(record) => UpsertPlan::Update(record.id.clone()),
    }
}

impl CloudflareDns {
    pub fn new(api_token: String, zone_id: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token,
            zone_id,
        })
    }

    /// Point the API at a different host. Intended for test servers.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    async fn read_envelope<T>(&self, response: reqwest::Response, context: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            return Err(VigilError::UpstreamRejection {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let envelope: ApiEnvelope<T> = response.json().await.map_err(transport_error)?;
        if !envelope.success {
            let detail = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(VigilError::DnsUpdate(format!("{}: {}", context, detail)));
        }

        envelope
            .result
            .ok_or_else(|| VigilError::DnsUpdate(format!("{}: empty result", context)))
    }

    async fn list_a_records(&self, name: &str) -> Result<Vec<RecordInfo>> {
        let response = self
            .http
            .get(self.records_url())
            .bearer_auth(&self.api_token)
            .query(&[("type", "A"), ("name", name)])
            .send()
            .await
            .map_err(transport_error)?;

        self.read_envelope(response, "list DNS records").await
    }
}

#[async_trait]
impl DnsProvider for CloudflareDns {
    #[instrument(skip(self), fields(domain = %domain.name, target = %target_address))]
    async fn point_to(&self, domain: &DomainRecord, target_address: &str) -> Result<()> {
        let existing = self.list_a_records(&domain.name).await?;

        let body = RecordBody {
            record_type: "A",
            name: &domain.name,
            content: target_address,
            ttl: DNS_TTL,
            proxied: false,
        };

        match plan_upsert(&existing, target_address) {
            UpsertPlan::Noop => {
                debug!(domain = %domain.name, "A record already points at target");
                return Ok(());
            }
            UpsertPlan::Create => {
                let response = self
                    .http
                    .post(self.records_url())
                    .bearer_auth(&self.api_token)
                    .json(&body)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let _: RecordInfo = self.read_envelope(response, "create DNS record").await?;
            }
            UpsertPlan::Update(record_id) => {
                let url = format!("{}/{}", self.records_url(), record_id);
                let response = self
                    .http
                    .put(&url)
                    .bearer_auth(&self.api_token)
                    .json(&body)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let _: RecordInfo = self.read_envelope(response, "update DNS record").await?;
            }
        }

        info!(domain = %domain.name, target = %target_address, "A record upserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, content: &str) -> RecordInfo {
        RecordInfo {
            id: id.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn upsert_creates_when_no_record_exists() {
        assert_eq!(plan_upsert(&[], "203.0.113.10"), UpsertPlan::Create);
    }

    #[test]
    fn upsert_is_a_noop_when_record_matches() {
        let existing = vec![record("abc", "203.0.113.10")];
        assert_eq!(plan_upsert(&existing, "203.0.113.10"), UpsertPlan::Noop);
    }

    #[test]
    fn upsert_updates_stale_record_in_place() {
        let existing = vec![record("abc", "198.51.100.7")];
        assert_eq!(
            plan_upsert(&existing, "203.0.113.10"),
            UpsertPlan::Update("abc".to_string())
        );
    }

    #[test]
    fn envelope_parses_errors_and_results() {
        let json = r#"{
            "success": false,
            "errors": [{"code": 9109, "message": "Invalid access token"}],
            "result": null
        }"#;
        let envelope: ApiEnvelope<Vec<RecordInfo>> = serde_json::from_str(json).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.errors[0].code, 9109);

        let json = r#"{
            "success": true,
            "errors": [],
            "result": [{"id": "372e67954025e0ba6aaa6d586b9e0b59", "content": "203.0.113.10"}]
        }"#;
        let envelope: ApiEnvelope<Vec<RecordInfo>> = serde_json::from_str(json).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.result.unwrap()[0].content, "203.0.113.10");
    }
}
