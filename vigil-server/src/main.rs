mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vigil_core::{
    CloudflareDns, Config, CpanelHosting, DnsConfig, FailoverOrchestrator, HealthEvaluator,
    HttpProbe, MailRelayNotifier, NamecheapClient, PipelineSettings, Providers, RunOutcome,
    SafeBrowsingChecker, SystemctlReloader,
};

/// Timeout for registrar/DNS/hosting/mail API calls.
const VENDOR_API_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "vigil-server")]
#[command(about = "Domain failover daemon - health checks, DNS repointing, and alerting")]
#[command(version)]
struct Cli {
    /// Address to bind the HTTP control surface to
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// Override the configured check interval, in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single failover check, print the result, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Missing configuration aborts before anything is served.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration, exiting");
            std::process::exit(1);
        }
    };

    let state = build_state(&config)?;

    if cli.once {
        let run = state.orchestrator.run_failover_check().await;
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    let interval = cli
        .interval
        .map(Duration::from_secs)
        .unwrap_or(config.run_interval);
    spawn_scheduler(state.orchestrator.clone(), interval);

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(bind = %cli.bind, "control surface listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_state(config: &Config) -> anyhow::Result<routes::AppState> {
    let reputation = Arc::new(SafeBrowsingChecker::new(
        &config.threat_feed,
        config.feed_timeout,
    )?);
    let probe = Arc::new(HttpProbe::new(config.probe_timeout)?);

    let evaluator = || {
        HealthEvaluator::new(
            reputation.clone(),
            probe.clone(),
            config.failure_statuses.clone(),
        )
        .with_concurrency(config.eval_concurrency)
    };

    let registrar = Arc::new(NamecheapClient::new(
        config.registrar.clone(),
        VENDOR_API_TIMEOUT,
    )?);

    let dns: Arc<dyn vigil_core::DnsProvider> = match &config.dns {
        DnsConfig::Cloudflare { api_token, zone_id } => Arc::new(CloudflareDns::new(
            api_token.clone(),
            zone_id.clone(),
            VENDOR_API_TIMEOUT,
        )?),
        DnsConfig::Namecheap => registrar.clone(),
    };

    let orchestrator = Arc::new(FailoverOrchestrator::new(
        evaluator(),
        Providers {
            registrar: registrar.clone(),
            dns,
            hosting: Arc::new(CpanelHosting::new(config.hosting.clone(), VENDOR_API_TIMEOUT)?),
            reloader: Arc::new(SystemctlReloader::new(&config.reload_command)?),
            notifier: Arc::new(MailRelayNotifier::new(config.mail.clone(), VENDOR_API_TIMEOUT)?),
        },
        config.domains.clone(),
        PipelineSettings::from_config(config),
    ));

    Ok(routes::AppState {
        evaluator: Arc::new(evaluator()),
        registrar,
        orchestrator,
        candidate_prefix: config.candidate_prefix.clone(),
        candidate_tld: config.candidate_tld.clone(),
    })
}

fn spawn_scheduler(orchestrator: Arc<FailoverOrchestrator>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "starting periodic domain checks");

    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            info!("running scheduled domain check");
            let run = orchestrator.run_failover_check().await;
            if run.outcome == RunOutcome::Skipped {
                info!("scheduled check skipped, previous run still in progress");
            }
        }
    });
}
