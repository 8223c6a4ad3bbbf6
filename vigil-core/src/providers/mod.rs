//! Vendor-neutral capability interfaces and their per-vendor clients.
//!
//! One trait per external capability, one implementation per vendor,
//! selected by configuration at process start. Clients return typed errors
//! and never retry; the orchestrator decides retry vs. abort.

pub mod cloudflare;
pub mod cpanel;
pub mod mail;
pub mod namecheap;
pub mod reload;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Result, VigilError};
use crate::model::DomainRecord;

pub use cloudflare::CloudflareDns;
pub use cpanel::CpanelHosting;
pub use mail::MailRelayNotifier;
pub use namecheap::NamecheapClient;
pub use reload::SystemctlReloader;

/// Domain registrar: enumerate owned domains, register new ones.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn list_owned(&self) -> Result<Vec<DomainRecord>>;
    async fn register(&self, candidate_name: &str) -> Result<DomainRecord>;
}

/// DNS authority for the managed zone. `point_to` must be an upsert:
/// calling it twice with the same arguments leaves DNS in the same state.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn point_to(&self, domain: &DomainRecord, target_address: &str) -> Result<()>;
}

/// Hosting control panel. `provision` must be idempotent for the same
/// domain.
#[async_trait]
pub trait HostingPanel: Send + Sync {
    async fn provision(&self, domain: &DomainRecord) -> Result<()>;
}

/// Web-server configuration reload. Failure degrades service but never
/// rolls anything back.
#[async_trait]
pub trait ServerReloader: Send + Sync {
    async fn reload(&self) -> Result<()>;
}

/// Human-readable alerting. Best-effort: failures are logged, never
/// retried within a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Candidate name policy: `{prefix}{epoch_millis}.{tld}`. Unique under a
/// monotonic clock and a single registering writer.
pub fn candidate_name(prefix: &str, tld: &str) -> String {
    format!("{}{}.{}", prefix, Utc::now().timestamp_millis(), tld)
}

/// Maps reqwest transport failures onto the retryable error variants;
/// anything that produced an HTTP response is left for the caller to
/// classify by status.
pub(crate) fn transport_error(e: reqwest::Error) -> VigilError {
    if e.is_timeout() {
        VigilError::Timeout(e.to_string())
    } else if e.is_connect() {
        VigilError::ConnectionFailed(e.to_string())
    } else {
        VigilError::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_names_embed_prefix_and_tld() {
        let name = candidate_name("mysite", "com");
        assert!(name.starts_with("mysite"));
        assert!(name.ends_with(".com"));

        let millis: String = name
            .strip_prefix("mysite")
            .unwrap()
            .strip_suffix(".com")
            .unwrap()
            .to_string();
        assert!(millis.parse::<i64>().is_ok());
    }
}
