//! The failover pipeline controller.
//!
//! Drives the fixed health-check -> remediate -> verify sequence:
//!
//! ```text
//! IDLE -> EVALUATING -> (healthy: IDLE)
//!                    -> SELECTING_CANDIDATE -> DNS_UPDATING -> HOSTING_UPDATING
//!                    -> RELOADING -> NOTIFYING -> IDLE
//! ```
//!
//! Mutation only begins once a valid candidate exists, so an aborted
//! candidate selection leaves no partial state anywhere. A hosting failure
//! after a committed DNS change is surfaced as a partial failure and never
//! rolled back; DNS changes are not atomically revertible across providers,
//! so the inconsistent intermediate state is accepted and a human is
//! alerted instead.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, VigilError};
use crate::health::HealthEvaluator;
use crate::model::{DomainRecord, DomainRole, PipelineRun, RunOutcome, StepName};
use crate::providers::{
    candidate_name, DnsProvider, HostingPanel, Notifier, Registrar, ServerReloader,
};
use crate::retry::{NetworkRetryClassifier, RetryExecutor, RetryPolicy};

/// The five capability clients the pipeline drives.
pub struct Providers {
    pub registrar: Arc<dyn Registrar>,
    pub dns: Arc<dyn DnsProvider>,
    pub hosting: Arc<dyn HostingPanel>,
    pub reloader: Arc<dyn ServerReloader>,
    pub notifier: Arc<dyn Notifier>,
}

/// Pipeline tuning, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Address freshly pointed DNS records resolve to.
    pub server_address: String,
    pub candidate_prefix: String,
    pub candidate_tld: String,
    /// Hard deadline for one run; also the effective run-lock timeout.
    pub run_deadline: Duration,
    pub retry_policy: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            server_address: config.server_address.clone(),
            candidate_prefix: config.candidate_prefix.clone(),
            candidate_tld: config.candidate_tld.clone(),
            run_deadline: config.run_deadline,
            retry_policy: RetryPolicy::new().with_max_attempts(config.retry_max_attempts),
        }
    }
}

/// Orchestrates health evaluation and the remediation pipeline.
///
/// Domain role transitions happen only here, and only after the
/// corresponding external call has confirmed success.
pub struct FailoverOrchestrator {
    evaluator: HealthEvaluator,
    providers: Providers,
    settings: PipelineSettings,
    retry: RetryExecutor<NetworkRetryClassifier>,
    domains: Mutex<Vec<DomainRecord>>,
    run_lock: Mutex<()>,
}

impl FailoverOrchestrator {
    pub fn new(
        evaluator: HealthEvaluator,
        providers: Providers,
        active_domains: Vec<String>,
        settings: PipelineSettings,
    ) -> Self {
        let domains = active_domains.into_iter().map(DomainRecord::active).collect();
        let retry = RetryExecutor::new(settings.retry_policy.clone());
        Self {
            evaluator,
            providers,
            settings,
            retry,
            domains: Mutex::new(domains),
            run_lock: Mutex::new(()),
        }
    }

    /// Snapshot of the managed domain set with current roles.
    pub async fn domains(&self) -> Vec<DomainRecord> {
        self.domains.lock().await.clone()
    }

    /// Runs one full failover check. The single public pipeline operation,
    /// invoked by the periodic trigger and the manual endpoint alike.
    ///
    /// At most one run is active process-wide: a trigger arriving while a
    /// run holds the lock is dropped with a `Skipped` result, not queued.
    /// The run itself races a hard deadline; on expiry the remaining steps
    /// are abandoned, the outcome is `Failed`, and whatever
    /// `steps_completed` had accumulated is preserved. No rollback.
    pub async fn run_failover_check(&self) -> PipelineRun {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("failover check skipped, a run is already in progress");
            return PipelineRun::skipped();
        };

        let mut run = PipelineRun::started_now();

        if tokio::time::timeout(self.settings.run_deadline, self.execute(&mut run))
            .await
            .is_err()
        {
            error!(
                deadline_secs = self.settings.run_deadline.as_secs(),
                steps = ?run.steps_completed,
                "run deadline exceeded, abandoning remaining steps"
            );
            run.outcome = RunOutcome::Failed;
        }

        info!(
            outcome = ?run.outcome,
            steps = ?run.steps_completed,
            candidate = run.chosen_candidate.as_ref().map(|c| c.name.as_str()),
            "failover check finished"
        );
        run
    }

    async fn execute(&self, run: &mut PipelineRun) {
        // EVALUATING
        let active: Vec<DomainRecord> = self
            .domains
            .lock()
            .await
            .iter()
            .filter(|d| d.is_active())
            .cloned()
            .collect();

        let verdicts = match self.evaluator.evaluate_all(&active).await {
            Ok(verdicts) => verdicts,
            Err(e) => {
                error!(error = %e, "health evaluation failed, aborting run");
                run.outcome = RunOutcome::Failed;
                return;
            }
        };

        let unhealthy: Vec<DomainRecord> = active
            .iter()
            .zip(&verdicts)
            .filter(|(_, verdict)| !verdict.is_healthy())
            .map(|(domain, _)| domain.clone())
            .collect();

        if unhealthy.is_empty() {
            info!(domains = active.len(), "all monitored domains healthy");
            run.outcome = RunOutcome::NoAction;
            return;
        }

        for (domain, verdict) in active.iter().zip(&verdicts) {
            if !verdict.is_healthy() {
                warn!(
                    domain = %domain.name,
                    flagged = verdict.flagged_unsafe,
                    status = ?verdict.http_status,
                    "domain unhealthy"
                );
            }
        }
        run.unhealthy_domains = unhealthy.clone();

        // SELECTING_CANDIDATE. No external state has been mutated yet, so a
        // failure here aborts cleanly.
        let candidate = match self.select_candidate(run).await {
            Ok(candidate) => candidate,
            Err(e) => {
                error!(error = %e, "candidate selection failed, aborting before any mutation");
                run.outcome = RunOutcome::Failed;
                return;
            }
        };
        run.chosen_candidate = Some(candidate.clone());
        info!(candidate = %candidate.name, "candidate selected");

        // DNS_UPDATING
        let dns = &self.providers.dns;
        let target = &self.settings.server_address;
        if let Err(e) = self.retry.execute(|| dns.point_to(&candidate, target)).await {
            error!(candidate = %candidate.name, error = %e, "DNS update failed");
            run.outcome = RunOutcome::Failed;
            return;
        }
        run.record_step(StepName::DnsUpdate);

        // HOSTING_UPDATING
        let hosting = &self.providers.hosting;
        if let Err(e) = self.retry.execute(|| hosting.provision(&candidate)).await {
            // DNS already points at the candidate; hosting does not. The
            // inconsistency is reported, never rolled back.
            let inconsistency = VigilError::StateInconsistency(format!(
                "DNS for {} points at {} but hosting provisioning failed: {}",
                candidate.name, target, e
            ));
            error!(error = %inconsistency, "run is partial, manual intervention required");
            run.outcome = RunOutcome::PartialFailure;
            self.notify_best_effort(
                run,
                "Domain failover incomplete",
                &format!("{}. Manual intervention required.", inconsistency),
            )
            .await;
            return;
        }
        run.record_step(StepName::HostingUpdate);

        // The switch is committed: promote before the best-effort tail so a
        // reload or notify failure cannot unwind it.
        self.promote(&candidate, &unhealthy).await;
        run.outcome = RunOutcome::Success;

        // RELOADING
        match self.providers.reloader.reload().await {
            Ok(()) => run.record_step(StepName::ServerReload),
            Err(e) => warn!(error = %e, "server reload failed, continuing"),
        }

        // NOTIFYING
        let retired: Vec<&str> = unhealthy.iter().map(|d| d.name.as_str()).collect();
        self.notify_best_effort(
            run,
            "Domain failover completed",
            &format!(
                "Traffic switched to {}. Retired: {}.",
                candidate.name,
                retired.join(", ")
            ),
        )
        .await;
    }

    /// Prefer an owned spare that itself passes a health check; otherwise
    /// mint and register a fresh candidate name. A failed `list_owned` is
    /// not fatal, registration is still attempted.
    async fn select_candidate(&self, run: &mut PipelineRun) -> Result<DomainRecord> {
        let known: HashSet<String> = self
            .domains
            .lock()
            .await
            .iter()
            .map(|d| d.name.clone())
            .collect();

        let registrar = &self.providers.registrar;
        match self.retry.execute(|| registrar.list_owned()).await {
            Ok(owned) => {
                for spare in owned.into_iter().filter(|d| !known.contains(&d.name)) {
                    match self.evaluator.evaluate(&spare.name).await {
                        Ok(verdict) if verdict.is_healthy() => {
                            info!(spare = %spare.name, "reusing owned spare domain");
                            return Ok(spare);
                        }
                        Ok(_) => {
                            warn!(spare = %spare.name, "owned spare is itself unhealthy, skipping");
                        }
                        Err(e) => {
                            warn!(spare = %spare.name, error = %e, "could not evaluate spare, skipping");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "could not list owned domains, falling back to registration");
            }
        }

        let name = candidate_name(&self.settings.candidate_prefix, &self.settings.candidate_tld);
        info!(candidate = %name, "registering fresh candidate");
        let record = self.retry.execute(|| registrar.register(&name)).await?;
        run.record_step(StepName::Register);
        Ok(record)
    }

    /// Apply role transitions after the switch is confirmed: the candidate
    /// becomes ACTIVE, every unhealthy domain is demoted to RETIRED.
    async fn promote(&self, candidate: &DomainRecord, unhealthy: &[DomainRecord]) {
        let mut domains = self.domains.lock().await;
        for domain in domains.iter_mut() {
            if unhealthy.iter().any(|u| u.name == domain.name) {
                domain.role = DomainRole::Retired;
            }
        }
        domains.push(DomainRecord::active(candidate.name.clone()));
        info!(candidate = %candidate.name, "candidate promoted to active");
    }

    async fn notify_best_effort(&self, run: &mut PipelineRun, subject: &str, body: &str) {
        match self.providers.notifier.notify(subject, body).await {
            Ok(()) => run.record_step(StepName::Notify),
            Err(e) => warn!(error = %e, "notification failed, continuing"),
        }
    }
}
