//! Domain name normalization and SSRF guards for operator-supplied URLs.

use std::net::IpAddr;

use crate::error::{Result, VigilError};

/// Normalize a domain name for use across the health checkers and vendor
/// clients.
///
/// Strips a leading scheme, `www.` prefix, and any path component, lowercases
/// the rest, and rejects anything that is not a plausible FQDN.
pub fn normalize_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().to_lowercase();

    let domain = domain
        .strip_prefix("http://")
        .or_else(|| domain.strip_prefix("https://"))
        .unwrap_or(&domain);
    let domain = domain.split('/').next().unwrap_or(domain);
    let domain = domain.strip_prefix("www.").unwrap_or(domain);

    if domain.is_empty() || !domain.contains('.') {
        return Err(VigilError::InvalidDomain(domain.to_string()));
    }
    if domain.contains("..") || domain.starts_with('.') || domain.ends_with('.') {
        return Err(VigilError::InvalidDomain(domain.to_string()));
    }

    for label in domain.split('.') {
        let chars_ok = label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if label.is_empty() || !chars_ok || label.starts_with('-') || label.ends_with('-') {
            return Err(VigilError::InvalidDomain(domain.to_string()));
        }
    }

    Ok(domain.to_string())
}

/// True if the address is private, loopback, link-local, or otherwise
/// reserved. Used to refuse probing targets that resolve into internal
/// infrastructure when the domain came from an HTTP request body.
pub fn is_private_or_reserved_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || octets[0] >= 224 // multicast and reserved
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                || (segments[0] & 0xfe00) == 0xfc00 // unique local
                || (segments[0] & 0xffc0) == 0xfe80 // link-local
                || segments[0] >> 8 == 0xff // multicast
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_or_reserved_ip(&IpAddr::V4(v4)))
        }
    }
}

/// Normalize a domain and verify it does not resolve to a private or
/// reserved address. Call this before probing domains supplied over the
/// manual-trigger endpoints.
pub async fn validate_domain_safe(domain: &str) -> Result<String> {
    let normalized = normalize_domain(domain)?;

    let addrs = tokio::net::lookup_host(format!("{}:80", normalized))
        .await
        .map_err(|e| VigilError::InvalidDomain(format!("failed to resolve {}: {}", normalized, e)))?;

    for addr in addrs {
        if is_private_or_reserved_ip(&addr.ip()) {
            return Err(VigilError::InvalidDomain(format!(
                "{} resolves to private or reserved address {}",
                normalized,
                addr.ip()
            )));
        }
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn normalizes_scheme_www_and_case() {
        assert_eq!(normalize_domain("example.com").unwrap(), "example.com");
        assert_eq!(normalize_domain("EXAMPLE.COM").unwrap(), "example.com");
        assert_eq!(
            normalize_domain("https://www.example.com/path").unwrap(),
            "example.com"
        );
        assert_eq!(
            normalize_domain("  http://example.com/  ").unwrap(),
            "example.com"
        );
    }

    #[test]
    fn rejects_malformed_domains() {
        assert!(normalize_domain("").is_err());
        assert!(normalize_domain("nodots").is_err());
        assert!(normalize_domain("a..b.com").is_err());
        assert!(normalize_domain(".example.com").is_err());
        assert!(normalize_domain("example.com.").is_err());
        assert!(normalize_domain("-example.com").is_err());
        assert!(normalize_domain("exam ple.com").is_err());
    }

    #[test]
    fn reserved_ranges_are_detected() {
        assert!(is_private_or_reserved_ip(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(is_private_or_reserved_ip(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
        assert!(is_private_or_reserved_ip(&IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(is_private_or_reserved_ip(&IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254))));
        assert!(is_private_or_reserved_ip(&IpAddr::V6(Ipv6Addr::LOCALHOST)));

        assert!(!is_private_or_reserved_ip(&IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
        assert!(!is_private_or_reserved_ip(&IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))));
    }
}
