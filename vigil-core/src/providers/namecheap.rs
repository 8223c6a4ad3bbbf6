//! Namecheap registrar and DNS client.
//!
//! The Namecheap API is GET-with-query-parameters returning XML. The few
//! fields this client needs are pulled out with regexes rather than a full
//! XML parser; responses report API-level failures inside a 200 body, so
//! the `<Error>` element is checked before anything else.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, instrument};

use super::{transport_error, DnsProvider, Registrar};
use crate::config::RegistrarConfig;
use crate::error::{Result, VigilError};
use crate::model::DomainRecord;

const DNS_TTL: &str = "300";

#[derive(Debug, Clone)]
pub struct NamecheapClient {
    http: Client,
    config: RegistrarConfig,
}

impl NamecheapClient {
    pub fn new(config: RegistrarConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    /// Common query parameters every Namecheap command carries.
    fn base_params(&self, command: &str) -> Vec<(&'static str, String)> {
        vec![
            ("ApiUser", self.config.api_user.clone()),
            ("ApiKey", self.config.api_key.clone()),
            ("UserName", self.config.username.clone()),
            ("ClientIp", self.config.client_ip.clone()),
            ("Command", command.to_string()),
        ]
    }

    async fn call(&self, params: Vec<(&'static str, String)>) -> Result<String> {
        let response = self
            .http
            .get(&self.config.api_url)
            .query(&params)
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

        response.text().await.map_err(transport_error)
    }
}

/// First `<Error>` element text, if the response carries one.
fn api_error(xml: &str) -> Option<String> {
    let re = Regex::new(r"<Error[^>]*>([^<]+)</Error>").ok()?;
    re.captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn has_status_ok(xml: &str) -> bool {
    Regex::new(r#"<ApiResponse[^>]*Status="OK""#)
        .map(|re| re.is_match(xml))
        .unwrap_or(false)
}

/// Domain names out of a `domains.getList` response.
fn listed_domains(xml: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r#"<Domain\s[^>]*Name="([^"]+)""#) else {
        return Vec::new();
    };
    re.captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn registration_confirmed(xml: &str) -> bool {
    Regex::new(r#"<DomainCreateResult[^>]*Registered="true""#)
        .map(|re| re.is_match(xml))
        .unwrap_or(false)
}

/// Splits an FQDN into Namecheap's SLD/TLD pair. The TLD is everything
/// after the first label, so multi-label suffixes like `co.uk` work.
fn split_sld_tld(name: &str) -> Result<(&str, &str)> {
    name.split_once('.')
        .filter(|(sld, tld)| !sld.is_empty() && !tld.is_empty())
        .ok_or_else(|| VigilError::InvalidDomain(name.to_string()))
}

#[async_trait]
impl Registrar for NamecheapClient {
    #[instrument(skip(self))]
    async fn list_owned(&self) -> Result<Vec<DomainRecord>> {
        let xml = self
            .call(self.base_params("namecheap.domains.getList"))
            .await?;

        if let Some(message) = api_error(&xml) {
            return Err(VigilError::Registration(format!(
                "domain list failed: {}",
                message
            )));
        }

        let domains = listed_domains(&xml);
        debug!(count = domains.len(), "fetched registered domains");

        Ok(domains
            .into_iter()
            .map(DomainRecord::candidate)
            .collect())
    }

    #[instrument(skip(self), fields(domain = %candidate_name))]
    async fn register(&self, candidate_name: &str) -> Result<DomainRecord> {
        let mut params = self.base_params("namecheap.domains.create");
        params.push(("DomainName", candidate_name.to_string()));
        params.push(("Years", "1".to_string()));

        let xml = self.call(params).await?;

        if let Some(message) = api_error(&xml) {
            return Err(VigilError::Registration(message));
        }
        if !has_status_ok(&xml) || !registration_confirmed(&xml) {
            return Err(VigilError::Registration(format!(
                "registrar did not confirm registration of {}",
                candidate_name
            )));
        }

        info!(domain = %candidate_name, "registered new domain");
        Ok(DomainRecord::candidate(candidate_name))
    }
}

#[async_trait]
impl DnsProvider for NamecheapClient {
    /// Replaces the domain's full host list with A records for the apex and
    /// `www` pointing at the target. `setHosts` overwrites whatever was
    /// there, which makes repeated calls converge on the same state.
    #[instrument(skip(self), fields(domain = %domain.name, target = %target_address))]
    async fn point_to(&self, domain: &DomainRecord, target_address: &str) -> Result<()> {
        let (sld, tld) = split_sld_tld(&domain.name)?;

        let mut params = self.base_params("namecheap.domains.dns.setHosts");
        params.push(("SLD", sld.to_string()));
        params.push(("TLD", tld.to_string()));
        params.push(("HostName1", "@".to_string()));
        params.push(("RecordType1", "A".to_string()));
        params.push(("Address1", target_address.to_string()));
        params.push(("TTL1", DNS_TTL.to_string()));
        params.push(("HostName2", "www".to_string()));
        params.push(("RecordType2", "A".to_string()));
        params.push(("Address2", target_address.to_string()));
        params.push(("TTL2", DNS_TTL.to_string()));

        let xml = self.call(params).await?;

        if let Some(message) = api_error(&xml) {
            return Err(VigilError::DnsUpdate(message));
        }
        if !has_status_ok(&xml) {
            return Err(VigilError::DnsUpdate(format!(
                "registrar did not confirm DNS update for {}",
                domain.name
            )));
        }

        info!(domain = %domain.name, "DNS records updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ApiResponse Status="OK" xmlns="http://api.namecheap.com/xml.response">
  <CommandResponse Type="namecheap.domains.getList">
    <DomainGetListResult>
      <Domain ID="1" Name="spare1.com" User="acme" IsExpired="false" />
      <Domain ID="2" Name="Spare2.net" User="acme" IsExpired="false" />
    </DomainGetListResult>
  </CommandResponse>
</ApiResponse>"#;

    const ERROR_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ApiResponse Status="ERROR">
  <Errors>
    <Error Number="1011102">API Key is invalid or API access has not been enabled</Error>
  </Errors>
</ApiResponse>"#;

    const CREATE_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ApiResponse Status="OK">
  <CommandResponse Type="namecheap.domains.create">
    <DomainCreateResult Domain="mysite1700000000000.com" Registered="true" ChargedAmount="10.87" />
  </CommandResponse>
</ApiResponse>"#;

    #[test]
    fn extracts_listed_domains_lowercased() {
        assert_eq!(listed_domains(LIST_RESPONSE), vec!["spare1.com", "spare2.net"]);
        assert!(listed_domains(ERROR_RESPONSE).is_empty());
    }

    #[test]
    fn extracts_api_error_text() {
        let message = api_error(ERROR_RESPONSE).unwrap();
        assert!(message.contains("API Key is invalid"));
        assert!(api_error(LIST_RESPONSE).is_none());
    }

    #[test]
    fn recognizes_status_and_registration_confirmation() {
        assert!(has_status_ok(LIST_RESPONSE));
        assert!(!has_status_ok(ERROR_RESPONSE));
        assert!(registration_confirmed(CREATE_RESPONSE));
        assert!(!registration_confirmed(LIST_RESPONSE));
    }

    #[test]
    fn splits_sld_and_tld() {
        assert_eq!(split_sld_tld("example.com").unwrap(), ("example", "com"));
        assert_eq!(split_sld_tld("example.co.uk").unwrap(), ("example", "co.uk"));
        assert!(split_sld_tld("nodots").is_err());
        assert!(split_sld_tld(".com").is_err());
    }
}
