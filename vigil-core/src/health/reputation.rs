//! Threat-intelligence lookups against the Google Safe Browsing v4 API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::ThreatFeedConfig;
use crate::error::{Result, VigilError};

const CLIENT_ID: &str = "vigil";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capability interface for asking a threat feed about a domain.
/// Pure query, no side effects.
#[async_trait]
pub trait ReputationCheck: Send + Sync {
    /// Returns true if the feed flags the domain as unsafe. An unreachable
    /// feed surfaces as `UpstreamUnavailable`; callers fail open.
    async fn is_flagged(&self, domain: &str) -> Result<bool>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreatRequest {
    client: ClientInfo,
    threat_info: ThreatInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfo {
    client_id: String,
    client_version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreatInfo {
    threat_types: Vec<String>,
    platform_types: Vec<String>,
    threat_entry_types: Vec<String>,
    threat_entries: Vec<ThreatEntry>,
}

#[derive(Debug, Serialize)]
struct ThreatEntry {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ThreatResponse {
    #[serde(default)]
    matches: Vec<ThreatMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreatMatch {
    #[serde(default)]
    threat_type: String,
    #[serde(default)]
    platform_type: String,
}

/// Safe Browsing client with a bounded request timeout.
#[derive(Debug, Clone)]
pub struct SafeBrowsingChecker {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl SafeBrowsingChecker {
    pub fn new(config: &ThreatFeedConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request_body(domain: &str) -> ThreatRequest {
        ThreatRequest {
            client: ClientInfo {
                client_id: CLIENT_ID.to_string(),
                client_version: CLIENT_VERSION.to_string(),
            },
            threat_info: ThreatInfo {
                threat_types: vec!["MALWARE".to_string(), "SOCIAL_ENGINEERING".to_string()],
                platform_types: vec!["ANY_PLATFORM".to_string()],
                threat_entry_types: vec!["URL".to_string()],
                threat_entries: vec![ThreatEntry {
                    url: format!("http://{}", domain),
                }],
            },
        }
    }
}

#[async_trait]
impl ReputationCheck for SafeBrowsingChecker {
    #[instrument(skip(self), fields(domain = %domain))]
    async fn is_flagged(&self, domain: &str) -> Result<bool> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);

        let response = self
            .http
            .post(&url)
            .json(&Self::request_body(domain))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    VigilError::UpstreamUnavailable(format!("threat feed: {}", e))
                } else {
                    VigilError::Http(e)
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(VigilError::UpstreamUnavailable(format!(
                "threat feed returned status {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(VigilError::UpstreamRejection {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: ThreatResponse = response.json().await?;
        if body.matches.is_empty() {
            debug!("domain is clean");
            return Ok(false);
        }

        for threat in &body.matches {
            warn!(
                threat_type = %threat.threat_type,
                platform = %threat.platform_type,
                "domain flagged by threat feed"
            );
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_targets_http_url() {
        let body = SafeBrowsingChecker::request_body("example.com");
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(
            json["threatInfo"]["threatEntries"][0]["url"],
            "http://example.com"
        );
        assert_eq!(json["threatInfo"]["threatTypes"][0], "MALWARE");
        assert_eq!(json["client"]["clientId"], "vigil");
    }

    #[test]
    fn empty_matches_deserializes_from_empty_object() {
        // The API returns `{}` for clean domains.
        let body: ThreatResponse = serde_json::from_str("{}").unwrap();
        assert!(body.matches.is_empty());

        let body: ThreatResponse = serde_json::from_str(
            r#"{"matches":[{"threatType":"MALWARE","platformType":"ANY_PLATFORM"}]}"#,
        )
        .unwrap();
        assert_eq!(body.matches.len(), 1);
        assert_eq!(body.matches[0].threat_type, "MALWARE");
    }
}
