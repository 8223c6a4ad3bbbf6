//! Combines reputation and reachability into a single health verdict.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::error::{Result, VigilError};
use crate::health::probe::ReachabilityProbe;
use crate::health::reputation::ReputationCheck;
use crate::model::{DomainRecord, HealthVerdict};

const DEFAULT_CONCURRENCY: usize = 5;

/// Health verdict producer. Pure composition of the two checkers; retries
/// are the orchestrator's responsibility, not this type's.
pub struct HealthEvaluator {
    reputation: Arc<dyn ReputationCheck>,
    probe: Arc<dyn ReachabilityProbe>,
    failure_statuses: HashSet<u16>,
    concurrency: usize,
}

impl HealthEvaluator {
    pub fn new(
        reputation: Arc<dyn ReputationCheck>,
        probe: Arc<dyn ReachabilityProbe>,
        failure_statuses: HashSet<u16>,
    ) -> Self {
        Self {
            reputation,
            probe,
            failure_statuses,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Bounded concurrency for multi-domain evaluation.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Evaluate one domain.
    ///
    /// A flagged domain is condemned without probing. An unreachable threat
    /// feed resolves to not-flagged (fail-open) and the probe still runs,
    /// so a feed outage alone can never trigger a failover.
    pub async fn evaluate(&self, domain: &str) -> Result<HealthVerdict> {
        let flagged = match self.reputation.is_flagged(domain).await {
            Ok(flagged) => flagged,
            Err(VigilError::UpstreamUnavailable(msg)) => {
                warn!(domain, error = %msg, "threat feed unavailable, treating as not flagged");
                false
            }
            Err(e) => return Err(e),
        };

        if flagged {
            info!(domain, "domain flagged unsafe, skipping reachability probe");
            return Ok(HealthVerdict {
                domain: domain.to_string(),
                reachable: false,
                flagged_unsafe: true,
                http_status: None,
                checked_at: Utc::now(),
            });
        }

        let probe = self.probe.probe(domain).await?;
        let down_status = probe
            .status_code
            .is_some_and(|status| self.failure_statuses.contains(&status));
        let reachable = probe.reachable && !down_status;

        debug!(
            domain,
            reachable,
            status = ?probe.status_code,
            "reachability verdict"
        );

        Ok(HealthVerdict {
            domain: domain.to_string(),
            reachable,
            flagged_unsafe: false,
            http_status: probe.status_code,
            checked_at: Utc::now(),
        })
    }

    /// Evaluate every domain with bounded concurrency, preserving input
    /// order. All verdicts are collected before returning; a hard failure on
    /// any domain fails the whole evaluation so partial results never drive
    /// remediation.
    pub async fn evaluate_all(&self, domains: &[DomainRecord]) -> Result<Vec<HealthVerdict>> {
        let names: Vec<String> = domains.iter().map(|d| d.name.clone()).collect();
        stream::iter(names.into_iter().map(|name| async move { self.evaluate(&name).await }))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}
