//! DNS re-resolution probe: after a DNS/timeout-class HTTP failure,
//! ask the system resolver whether the probe host is resolvable again

use std::net::IpAddr;

use async_trait::async_trait;

use crate::status::{IpFamily, TransportError};

/// Outcome of a DNS recovery check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DnsVerdict {
    /// The failing error was not DNS/timeout-class; no lookup performed
    NotApplicable,
    Resolved,
    Unresolved,
}

/// Name-resolution seam; the production impl uses the system resolver
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolve `host` and return all addresses, or empty on failure
    async fn resolve(&self, host: &str) -> Vec<IpAddr>;
}

/// System resolver via getaddrinfo (`tokio::net::lookup_host`)
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Vec<IpAddr> {
        match tokio::net::lookup_host((host, 80)).await {
            Ok(addrs) => addrs.map(|a| a.ip()).collect(),
            Err(e) => {
                tracing::debug!("Resolver failed for {}: {}", host, e);
                Vec::new()
            }
        }
    }
}

/// Single-shot advisory check: did the probe hostname become resolvable
/// again for the requested family? Never errors; purely input to the
/// monitor's retry decision.
pub async fn dns_recovered(
    resolver: &dyn HostResolver,
    endpoint: &str,
    family: IpFamily,
    error: TransportError,
) -> DnsVerdict {
    if !error.is_dns_class() {
        return DnsVerdict::NotApplicable;
    }

    let host = host_of(endpoint);
    if host.is_empty() {
        return DnsVerdict::Unresolved;
    }

    let addrs = resolver.resolve(host).await;
    let have_v4 = addrs.iter().any(|a| a.is_ipv4());
    let have_v6 = addrs.iter().any(|a| a.is_ipv6());
    tracing::debug!(
        "DNS re-check for {} ({}): v4={}, v6={}",
        host,
        family,
        have_v4,
        have_v6
    );

    let resolved = match family {
        IpFamily::V4 => have_v4,
        IpFamily::V6 => have_v6,
        IpFamily::Unspecified => have_v4 || have_v6,
    };
    if resolved {
        DnsVerdict::Resolved
    } else {
        DnsVerdict::Unresolved
    }
}

/// Strip `scheme://`, any `/path`, and any `:port` from a probe URL
fn host_of(endpoint: &str) -> &str {
    let rest = match endpoint.find("://") {
        Some(i) => &endpoint[i + 3..],
        None => endpoint,
    };
    let rest = match rest.find('/') {
        Some(i) => &rest[..i],
        None => rest,
    };
    match rest.rfind(':') {
        Some(i) => &rest[..i],
        None => rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    struct FixedResolver(Vec<IpAddr>);

    #[async_trait]
    impl HostResolver for FixedResolver {
        async fn resolve(&self, _host: &str) -> Vec<IpAddr> {
            self.0.clone()
        }
    }

    #[test]
    fn host_extraction() {
        assert_eq!(
            host_of("http://clients3.google.com/generate_204"),
            "clients3.google.com"
        );
        assert_eq!(host_of("https://portal.example:8080/login"), "portal.example");
        assert_eq!(host_of("portal.example/x"), "portal.example");
        assert_eq!(host_of("http://bare.example"), "bare.example");
    }

    #[tokio::test]
    async fn not_applicable_for_non_dns_errors() {
        let resolver = FixedResolver(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        let verdict = dns_recovered(
            &resolver,
            "http://a.example/x",
            IpFamily::V4,
            TransportError::ConnectFailed,
        )
        .await;
        assert_eq!(verdict, DnsVerdict::NotApplicable);
    }

    #[tokio::test]
    async fn resolved_when_family_address_present() {
        let resolver = FixedResolver(vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))]);
        let verdict = dns_recovered(
            &resolver,
            "http://a.example/x",
            IpFamily::V4,
            TransportError::CouldNotResolveHost,
        )
        .await;
        assert_eq!(verdict, DnsVerdict::Resolved);
    }

    #[tokio::test]
    async fn unresolved_when_family_mismatch() {
        let resolver = FixedResolver(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        let verdict = dns_recovered(
            &resolver,
            "http://a.example/x",
            IpFamily::V6,
            TransportError::TimedOut,
        )
        .await;
        assert_eq!(verdict, DnsVerdict::Unresolved);
    }

    #[tokio::test]
    async fn unspecified_family_accepts_either() {
        let resolver = FixedResolver(vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]);
        let verdict = dns_recovered(
            &resolver,
            "http://a.example/x",
            IpFamily::Unspecified,
            TransportError::RecvError,
        )
        .await;
        assert_eq!(verdict, DnsVerdict::Resolved);
    }

    #[tokio::test]
    async fn resolver_failure_reads_as_unresolved() {
        let resolver = FixedResolver(Vec::new());
        let verdict = dns_recovered(
            &resolver,
            "http://a.example/x",
            IpFamily::V4,
            TransportError::TimedOut,
        )
        .await;
        assert_eq!(verdict, DnsVerdict::Unresolved);
    }
}
