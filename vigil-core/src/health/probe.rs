//! HTTP reachability probing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::ProbeResult;

const USER_AGENT: &str = concat!("vigil/", env!("CARGO_PKG_VERSION"));

/// Capability interface for probing whether a domain answers HTTP at all.
///
/// Implementations report transport-level reachability: any HTTP response,
/// whatever its status, is `reachable: true` with the status attached.
/// Classifying statuses against the failure-status policy is the
/// evaluator's job.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, domain: &str) -> Result<ProbeResult>;
}

/// Probes `http://{domain}` with a bounded timeout.
///
/// Redirects are not followed: a 301 must stay observable because the
/// default failure-status set includes it.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    #[instrument(skip(self), fields(domain = %domain))]
    async fn probe(&self, domain: &str) -> Result<ProbeResult> {
        let url = format!("http://{}", domain);

        match self.http.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(status, "probe got a response");
                Ok(ProbeResult {
                    reachable: true,
                    status_code: Some(status),
                })
            }
            // Timeouts, refused connections, and DNS failures all collapse
            // into the same unreachable shape.
            Err(e) => {
                debug!(error = %e, "probe got no response");
                Ok(ProbeResult {
                    reachable: false,
                    status_code: None,
                })
            }
        }
    }
}
