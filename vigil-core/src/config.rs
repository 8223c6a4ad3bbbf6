//! Process configuration, assembled once at startup.
//!
//! Every setting the pipeline and the vendor clients need is read here and
//! nowhere else; components receive their slice of the config through their
//! constructors. Missing required settings fail startup with
//! `VigilError::Config`.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::{Result, VigilError};
use crate::validation::normalize_domain;

/// Default HTTP statuses that count as "down" for the reachability probe.
/// 301 is included deliberately: for these sites a permanent redirect means
/// the domain has been parked or seized.
pub const DEFAULT_FAILURE_STATUSES: [u16; 3] = [301, 400, 403];

const DEFAULT_SAFE_BROWSING_URL: &str =
    "https://safebrowsing.googleapis.com/v4/threatMatches:find";

#[derive(Debug, Clone)]
pub struct Config {
    /// Domains monitored as ACTIVE, in configuration order.
    pub domains: Vec<String>,
    /// Address new DNS records point at.
    pub server_address: String,
    pub probe_timeout: Duration,
    pub feed_timeout: Duration,
    /// HTTP statuses classified as down. Never empty.
    pub failure_statuses: HashSet<u16>,
    pub run_interval: Duration,
    /// Hard deadline for a single pipeline run; doubles as the run-lock
    /// timeout so an external-API hang cannot wedge the process.
    pub run_deadline: Duration,
    pub eval_concurrency: usize,
    pub retry_max_attempts: usize,
    /// Candidate names are `{prefix}{epoch_millis}.{tld}`.
    pub candidate_prefix: String,
    pub candidate_tld: String,
    pub reload_command: String,
    pub registrar: RegistrarConfig,
    pub dns: DnsConfig,
    pub hosting: HostingConfig,
    pub threat_feed: ThreatFeedConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    pub api_url: String,
    pub api_user: String,
    pub api_key: String,
    pub username: String,
    pub client_ip: String,
}

/// Which DNS provider serves the zone. Namecheap reuses the registrar
/// credentials; Cloudflare carries its own token and zone.
#[derive(Debug, Clone)]
pub enum DnsConfig {
    Cloudflare { api_token: String, zone_id: String },
    Namecheap,
}

#[derive(Debug, Clone)]
pub struct HostingConfig {
    pub base_url: String,
    pub username: String,
    pub api_token: String,
}

#[derive(Debug, Clone)]
pub struct ThreatFeedConfig {
    pub api_key: String,
    pub endpoint: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub relay_url: String,
    pub api_key: String,
    pub from: String,
    pub admin_email: String,
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Assemble configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let domains = require(&lookup, "CURRENT_DOMAINS")?
            .split(',')
            .map(normalize_domain)
            .collect::<Result<Vec<_>>>()?;
        if domains.is_empty() {
            return Err(VigilError::Config("CURRENT_DOMAINS must list at least one domain".into()));
        }

        let failure_statuses = parse_status_set(
            lookup("FAILURE_STATUSES").as_deref(),
        )?;

        let dns = match lookup("DNS_PROVIDER").as_deref().unwrap_or("namecheap") {
            "cloudflare" => DnsConfig::Cloudflare {
                api_token: require(&lookup, "CLOUDFLARE_API_TOKEN")?,
                zone_id: require(&lookup, "CLOUDFLARE_ZONE_ID")?,
            },
            "namecheap" => DnsConfig::Namecheap,
            other => {
                return Err(VigilError::Config(format!(
                    "DNS_PROVIDER must be 'cloudflare' or 'namecheap', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            domains,
            server_address: require(&lookup, "SERVER_ADDRESS")?,
            probe_timeout: duration_secs(&lookup, "PROBE_TIMEOUT_SECS", 5)?,
            feed_timeout: duration_secs(&lookup, "FEED_TIMEOUT_SECS", 5)?,
            failure_statuses,
            run_interval: duration_secs(&lookup, "RUN_INTERVAL_SECS", 60)?,
            run_deadline: duration_secs(&lookup, "RUN_DEADLINE_SECS", 120)?,
            eval_concurrency: parse_or(&lookup, "EVAL_CONCURRENCY", 5)?,
            retry_max_attempts: parse_or(&lookup, "RETRY_MAX_ATTEMPTS", 3)?,
            candidate_prefix: require(&lookup, "DOMAIN_PREFIX")?,
            candidate_tld: require(&lookup, "TLD")?,
            reload_command: lookup("RELOAD_COMMAND")
                .unwrap_or_else(|| "systemctl reload nginx".to_string()),
            registrar: RegistrarConfig {
                api_url: require(&lookup, "NAMECHEAP_API_URL")?,
                api_user: require(&lookup, "NAMECHEAP_API_USER")?,
                api_key: require(&lookup, "NAMECHEAP_API_KEY")?,
                username: require(&lookup, "NAMECHEAP_USERNAME")?,
                client_ip: require(&lookup, "CLIENT_IP")?,
            },
            dns,
            hosting: HostingConfig {
                base_url: require(&lookup, "CPANEL_BASE_URL")?,
                username: require(&lookup, "CPANEL_USERNAME")?,
                api_token: require(&lookup, "CPANEL_API_TOKEN")?,
            },
            threat_feed: ThreatFeedConfig {
                api_key: require(&lookup, "SAFE_BROWSING_API_KEY")?,
                endpoint: lookup("SAFE_BROWSING_URL")
                    .unwrap_or_else(|| DEFAULT_SAFE_BROWSING_URL.to_string()),
            },
            mail: MailConfig {
                relay_url: require(&lookup, "MAIL_RELAY_URL")?,
                api_key: require(&lookup, "MAIL_RELAY_API_KEY")?,
                from: require(&lookup, "MAIL_FROM")?,
                admin_email: require(&lookup, "ADMIN_EMAIL")?,
            },
        })
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(VigilError::Config(format!("missing required setting {}", key))),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| VigilError::Config(format!("malformed value for {}: '{}'", key, raw))),
        None => Ok(default),
    }
}

fn duration_secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(Duration::from_secs(parse_or(lookup, key, default)?))
}

/// Parse the probe failure-status set; falls back to the default set and
/// rejects an explicitly empty one.
fn parse_status_set(raw: Option<&str>) -> Result<HashSet<u16>> {
    let set: HashSet<u16> = match raw {
        None => DEFAULT_FAILURE_STATUSES.into_iter().collect(),
        Some(raw) => raw
            .split(',')
            .map(|s| {
                s.trim().parse::<u16>().map_err(|_| {
                    VigilError::Config(format!("malformed status code in FAILURE_STATUSES: '{}'", s))
                })
            })
            .collect::<Result<_>>()?,
    };

    if set.is_empty() {
        return Err(VigilError::Config("FAILURE_STATUSES must not be empty".into()));
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("CURRENT_DOMAINS", "a.com,b.com"),
            ("SERVER_ADDRESS", "203.0.113.10"),
            ("DOMAIN_PREFIX", "mysite"),
            ("TLD", "com"),
            ("NAMECHEAP_API_URL", "https://api.namecheap.com/xml.response"),
            ("NAMECHEAP_API_USER", "apiuser"),
            ("NAMECHEAP_API_KEY", "key"),
            ("NAMECHEAP_USERNAME", "user"),
            ("CLIENT_IP", "198.51.100.1"),
            ("CPANEL_BASE_URL", "https://host.example:2083"),
            ("CPANEL_USERNAME", "cpuser"),
            ("CPANEL_API_TOKEN", "cptoken"),
            ("SAFE_BROWSING_API_KEY", "sbkey"),
            ("MAIL_RELAY_URL", "https://api.mailrelay.example/v3/messages"),
            ("MAIL_RELAY_API_KEY", "mailkey"),
            ("MAIL_FROM", "vigil@example.com"),
            ("ADMIN_EMAIL", "ops@example.com"),
        ])
    }

    fn lookup_in<'a>(env: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| env.get(key).map(|v| v.to_string())
    }

    #[test]
    fn full_environment_parses_with_defaults() {
        let env = full_env();
        let config = Config::from_lookup(lookup_in(&env)).unwrap();

        assert_eq!(config.domains, vec!["a.com", "b.com"]);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.run_interval, Duration::from_secs(60));
        assert_eq!(config.run_deadline, Duration::from_secs(120));
        assert_eq!(config.eval_concurrency, 5);
        assert_eq!(config.retry_max_attempts, 3);
        assert!(config.failure_statuses.contains(&301));
        assert!(config.failure_statuses.contains(&403));
        assert!(matches!(config.dns, DnsConfig::Namecheap));
        assert_eq!(config.reload_command, "systemctl reload nginx");
    }

    #[test]
    fn missing_required_setting_fails_fast() {
        let mut env = full_env();
        env.remove("SAFE_BROWSING_API_KEY");

        let err = Config::from_lookup(lookup_in(&env)).unwrap_err();
        match err {
            VigilError::Config(msg) => assert!(msg.contains("SAFE_BROWSING_API_KEY")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn cloudflare_provider_requires_zone_credentials() {
        let mut env = full_env();
        env.insert("DNS_PROVIDER", "cloudflare");
        assert!(Config::from_lookup(lookup_in(&env)).is_err());

        env.insert("CLOUDFLARE_API_TOKEN", "cftoken");
        env.insert("CLOUDFLARE_ZONE_ID", "zone123");
        let config = Config::from_lookup(lookup_in(&env)).unwrap();
        assert!(matches!(config.dns, DnsConfig::Cloudflare { .. }));
    }

    #[test]
    fn custom_failure_statuses_override_defaults() {
        let mut env = full_env();
        env.insert("FAILURE_STATUSES", "500, 502");

        let config = Config::from_lookup(lookup_in(&env)).unwrap();
        assert!(config.failure_statuses.contains(&500));
        assert!(config.failure_statuses.contains(&502));
        assert!(!config.failure_statuses.contains(&301));
    }

    #[test]
    fn empty_failure_status_set_is_rejected() {
        assert!(parse_status_set(Some("")).is_err());
        assert!(parse_status_set(Some("abc")).is_err());
        assert!(parse_status_set(None).is_ok());
    }

    #[test]
    fn domains_are_normalized() {
        let mut env = full_env();
        env.insert("CURRENT_DOMAINS", "HTTPS://WWW.A.COM, b.com");

        let config = Config::from_lookup(lookup_in(&env)).unwrap();
        assert_eq!(config.domains, vec!["a.com", "b.com"]);
    }
}
