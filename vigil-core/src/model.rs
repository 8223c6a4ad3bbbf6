//! Core data model: monitored domains, health verdicts, and pipeline runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle role of a monitored domain.
///
/// ACTIVE domains come from configuration. A CANDIDATE is minted (or picked
/// from the registrar's spares) during a failover run and promoted to ACTIVE
/// only after DNS and hosting have both confirmed success; the domain it
/// replaces becomes RETIRED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainRole {
    Active,
    Candidate,
    Retired,
}

/// A domain under management, tagged with its lifecycle role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub name: String,
    pub role: DomainRole,
}

impl DomainRecord {
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: DomainRole::Active,
        }
    }

    pub fn candidate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: DomainRole::Candidate,
        }
    }

    pub fn is_active(&self) -> bool {
        self.role == DomainRole::Active
    }
}

/// Raw outcome of an HTTP reachability probe.
///
/// Timeouts and connection errors unify into `reachable: false` with no
/// status code; ordinary HTTP statuses are carried through for the evaluator
/// to classify against the configured failure set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub reachable: bool,
    pub status_code: Option<u16>,
}

/// Health verdict for one domain, produced fresh on every evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub domain: String,
    pub reachable: bool,
    pub flagged_unsafe: bool,
    pub http_status: Option<u16>,
    pub checked_at: DateTime<Utc>,
}

impl HealthVerdict {
    /// A domain is unhealthy if it is flagged by the threat feed or fails
    /// the reachability check.
    pub fn is_healthy(&self) -> bool {
        !self.flagged_unsafe && self.reachable
    }
}

/// Remediation steps, in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Register,
    DnsUpdate,
    HostingUpdate,
    ServerReload,
    Notify,
}

/// Terminal outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every monitored domain was healthy; nothing was mutated.
    NoAction,
    /// The candidate was promoted and now serves traffic.
    Success,
    /// DNS points at the candidate but a later step failed; no rollback.
    PartialFailure,
    /// The run aborted before or during DNS mutation.
    Failed,
    /// A run was already in progress; this trigger was dropped.
    Skipped,
}

/// Record of a single orchestrator run. Owned exclusively by the invocation
/// that created it and handed back to the caller when the run ends.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub triggered_at: DateTime<Utc>,
    pub unhealthy_domains: Vec<DomainRecord>,
    pub chosen_candidate: Option<DomainRecord>,
    pub steps_completed: Vec<StepName>,
    pub outcome: RunOutcome,
}

impl PipelineRun {
    pub fn started_now() -> Self {
        Self {
            triggered_at: Utc::now(),
            unhealthy_domains: Vec::new(),
            chosen_candidate: None,
            steps_completed: Vec::new(),
            outcome: RunOutcome::NoAction,
        }
    }

    pub fn skipped() -> Self {
        Self {
            outcome: RunOutcome::Skipped,
            ..Self::started_now()
        }
    }

    pub fn record_step(&mut self, step: StepName) {
        self.steps_completed.push(step);
    }

    pub fn step_completed(&self, step: StepName) -> bool {
        self.steps_completed.contains(&step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_health_requires_reachable_and_unflagged() {
        let mut verdict = HealthVerdict {
            domain: "example.com".to_string(),
            reachable: true,
            flagged_unsafe: false,
            http_status: Some(200),
            checked_at: Utc::now(),
        };
        assert!(verdict.is_healthy());

        verdict.flagged_unsafe = true;
        assert!(!verdict.is_healthy());

        verdict.flagged_unsafe = false;
        verdict.reachable = false;
        assert!(!verdict.is_healthy());
    }

    #[test]
    fn pipeline_run_tracks_step_progress() {
        let mut run = PipelineRun::started_now();
        assert!(!run.step_completed(StepName::DnsUpdate));

        run.record_step(StepName::Register);
        run.record_step(StepName::DnsUpdate);

        assert!(run.step_completed(StepName::Register));
        assert!(run.step_completed(StepName::DnsUpdate));
        assert!(!run.step_completed(StepName::HostingUpdate));
        assert_eq!(
            run.steps_completed,
            vec![StepName::Register, StepName::DnsUpdate]
        );
    }

    #[test]
    fn skipped_run_performs_no_steps() {
        let run = PipelineRun::skipped();
        assert_eq!(run.outcome, RunOutcome::Skipped);
        assert!(run.steps_completed.is_empty());
        assert!(run.chosen_candidate.is_none());
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_string(&RunOutcome::PartialFailure).unwrap();
        assert_eq!(json, "\"partial_failure\"");
    }
}
