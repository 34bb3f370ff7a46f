use crate::config::Config;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Shared resources every probe needs: an HTTP client, a DNS resolver
/// bounded by a shared semaphore (`max_concurrent_dns`), and the subset of
/// config that affects probe behavior (allowlist, private-target policy).
/// Cheap to clone — everything inside is an `Arc`.
#[derive(Clone)]
pub struct ProbeContext {
    pub http: reqwest::Client,
    pub resolver: Arc<TokioAsyncResolver>,
    pub dns_semaphore: Arc<Semaphore>,
    pub allow_private_targets: bool,
    pub command_timeout_seconds: u32,
    pub command_allowlist: Arc<Vec<String>>,
}

impl ProbeContext {
    pub fn new(config: &Config) -> Self {
        let resolver = TokioAsyncResolver::tokio(Default::default(), Default::default());
        ProbeContext {
            http: reqwest::Client::builder().build().expect("failed to build reqwest client"),
            resolver: Arc::new(resolver),
            dns_semaphore: Arc::new(Semaphore::new(config.max_concurrent_dns)),
            allow_private_targets: config.allow_private_targets,
            command_timeout_seconds: config.command_timeout_seconds,
            command_allowlist: Arc::new(config.command_allowlist.clone()),
        }
    }
}

/// Unless `allow_private_targets`, reject loopback/link-local/RFC1918/ULA
/// addresses before making any network call.
pub fn is_private_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local() || v4.is_private() || v4.is_broadcast() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_unspecified() || is_unique_local(&v6) || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

fn is_unique_local(v6: &std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn rejects_loopback_and_rfc1918() {
        assert!(is_private_or_reserved(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(is_private_or_reserved(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
        assert!(is_private_or_reserved(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(is_private_or_reserved(IpAddr::V4(Ipv4Addr::new(169, 254, 1, 1))));
    }

    #[test]
    fn accepts_public_address() {
        assert!(!is_private_or_reserved(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))));
    }
}
