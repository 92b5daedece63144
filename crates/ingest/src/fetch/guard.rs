//! SSRF guard: private-network checks applied before every request hop
//!
//! Safety properties:
//! - `localhost` and `.local` hostnames are refused by name
//! - Literal IPs in private, loopback, link-local, or CGNAT ranges are
//!   refused without touching the resolver
//! - Hostnames are resolved and every returned address is checked; one
//!   private address poisons the whole set

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use teammeet_core::{IngestError, IngestResult};
use url::{Host, Url};

use super::FetchPolicy;

/// Returns `true` if the given IP address belongs to a private, loopback,
/// link-local, or otherwise non-public network range.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            // IPv4-mapped addresses inherit the verdict of the mapped v4
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_v4(&mapped);
            }
            v6.is_loopback()                // ::1
                || v6.is_unspecified()      // ::
                || is_v6_unique_local(v6)   // fc00::/7
                || is_v6_link_local(v6)     // fe80::/10
        }
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()                        // 127.0.0.0/8
        || ip.is_private()                  // 10/8, 172.16/12, 192.168/16
        || ip.is_link_local()               // 169.254.0.0/16
        || ip.is_broadcast()                // 255.255.255.255
        || ip.octets()[0] == 0              // 0.0.0.0/8
        || is_v4_shared_address(ip)         // 100.64.0.0/10 (CGNAT)
}

/// 100.64.0.0/10 — shared address space (RFC 6598 / CGNAT).
fn is_v4_shared_address(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0xC0) == 64
}

/// Unique-local addresses: fc00::/7.
fn is_v6_unique_local(ip: &Ipv6Addr) -> bool {
    let segments = ip.segments();
    (segments[0] & 0xFE00) == 0xFC00
}

/// Link-local addresses: fe80::/10.
fn is_v6_link_local(ip: &Ipv6Addr) -> bool {
    let segments = ip.segments();
    (segments[0] & 0xFFC0) == 0xFE80
}

/// Checks that do not need the resolver: hostname blocklist and literal
/// IP ranges. Cheap enough to run on every redirect hop.
pub fn guard_host(url: &Url, policy: &FetchPolicy) -> IngestResult<()> {
    if !policy.block_private_networks {
        return Ok(());
    }

    match url.host() {
        Some(Host::Domain(domain)) => {
            let name = domain.trim_end_matches('.').to_ascii_lowercase();
            if name == "localhost" || name.ends_with(".local") {
                return Err(IngestError::Localhost(name));
            }
            Ok(())
        }
        Some(Host::Ipv4(ip)) => {
            if is_private_ip(&IpAddr::V4(ip)) {
                return Err(IngestError::PrivateIp(ip.to_string()));
            }
            Ok(())
        }
        Some(Host::Ipv6(ip)) => {
            if is_private_ip(&IpAddr::V6(ip)) {
                return Err(IngestError::PrivateIp(ip.to_string()));
            }
            Ok(())
        }
        None => Err(IngestError::InvalidUrl(format!("{url}: missing host"))),
    }
}

/// Full pre-dispatch guard: name/literal checks plus DNS resolution with
/// every returned address vetted
pub async fn guard_resolved(url: &Url, policy: &FetchPolicy) -> IngestResult<()> {
    guard_host(url, policy)?;

    if !policy.block_private_networks {
        return Ok(());
    }

    let Some(Host::Domain(domain)) = url.host() else {
        // Literal IPs were already vetted by guard_host
        return Ok(());
    };

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|e| IngestError::FetchFailed(format!("DNS resolution failed for {domain}: {e}")))?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            return Err(IngestError::PrivateIp(format!(
                "{domain} resolves to {}",
                addr.ip()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FetchPolicy {
        FetchPolicy::default()
    }

    #[test]
    fn test_private_v4_ranges() {
        for ip in [
            "127.0.0.1",
            "10.0.0.1",
            "169.254.1.1",
            "169.254.169.254",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "100.64.0.1",
            "0.0.0.0",
        ] {
            assert!(is_private_ip(&ip.parse().unwrap()), "should be private: {ip}");
        }
    }

    #[test]
    fn test_public_v4_allowed() {
        for ip in ["8.8.8.8", "1.1.1.1", "172.32.0.1", "100.128.0.1"] {
            assert!(!is_private_ip(&ip.parse().unwrap()), "should be public: {ip}");
        }
    }

    #[test]
    fn test_private_v6_ranges() {
        for ip in ["::1", "::", "fc00::1", "fd12:3456:789a::1", "fe80::1"] {
            assert!(is_private_ip(&ip.parse().unwrap()), "should be private: {ip}");
        }
    }

    #[test]
    fn test_v4_mapped_v6_inherits_verdict() {
        assert!(is_private_ip(&"::ffff:127.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"::ffff:192.168.1.1".parse().unwrap()));
        assert!(!is_private_ip(&"::ffff:8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_public_v6_allowed() {
        assert!(!is_private_ip(&"2607:f8b0:4004:800::200e".parse().unwrap()));
    }

    #[test]
    fn test_guard_rejects_localhost_names() {
        for raw in ["http://localhost/x", "http://LOCALHOST/x", "http://printer.local/x"] {
            let url = Url::parse(raw).unwrap();
            let err = guard_host(&url, &policy()).unwrap_err();
            assert_eq!(err.kind(), "localhost", "for {raw}");
        }
    }

    #[test]
    fn test_guard_rejects_literal_private_ips() {
        for raw in [
            "http://127.0.0.1/x",
            "http://10.0.0.1/x",
            "http://169.254.1.1/x",
            "http://172.16.0.1/x",
            "http://192.168.1.1/x",
            "http://[::1]/x",
            "http://[fc00::1]/x",
            "http://[fe80::1]/x",
        ] {
            let url = Url::parse(raw).unwrap();
            let err = guard_host(&url, &policy()).unwrap_err();
            assert_eq!(err.kind(), "private_ip", "for {raw}");
        }
    }

    #[test]
    fn test_guard_allows_public_hosts() {
        let url = Url::parse("https://example.com/x").unwrap();
        assert!(guard_host(&url, &policy()).is_ok());
    }

    #[test]
    fn test_permissive_policy_skips_checks() {
        let url = Url::parse("http://127.0.0.1/x").unwrap();
        assert!(guard_host(&url, &FetchPolicy::permissive()).is_ok());
    }
}
