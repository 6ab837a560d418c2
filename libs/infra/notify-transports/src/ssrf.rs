// [libs/infra/notify-transports/src/ssrf.rs]
//! SSRF protection for webhook and Apprise-HTTP destinations.
//!
//! Validation runs twice: [`validate_at_configure_time`] when a URL is
//! saved, and the [`BlockListedResolver`] installed on the shared HTTP
//! client revalidates on every connection attempt, including ones made
//! long after configuration. Because the resolver — not a one-off
//! pre-flight lookup — is what the client actually dials through, a
//! host that resolved safely at configure time and later rebinds to
//! `169.254.169.254` is still blocked: the resolver re-resolves and
//! re-checks immediately before the TCP handshake, so there is no
//! window between validation and use for DNS to change underneath it.

use std::net::{IpAddr, SocketAddr};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tokio::net::lookup_host;
use url::Url;

use crate::errors::TransportError;

pub fn is_blocked_address(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_link_local() // covers 169.254.0.0/16, including the cloud metadata address
                || v4.is_private()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_multicast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || v6.is_unique_local()
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // link-local
        }
    }
}

/// Runs at configuration write time: rejects a URL whose host resolves,
/// right now, to any disallowed address. Does not guarantee anything
/// about future resolutions of the same name — that is the resolver's job.
pub async fn validate_at_configure_time(url: &str) -> Result<(), TransportError> {
    let parsed = Url::parse(url).map_err(|error| TransportError::Permanent(format!("invalid URL: {error}")))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(TransportError::Permanent(format!("unsupported scheme: {}", parsed.scheme())));
    }

    let host = parsed.host_str().ok_or_else(|| TransportError::Permanent("URL has no host".into()))?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    let resolved = lookup_host((host, port))
        .await
        .map_err(|error| TransportError::Permanent(format!("DNS resolution failed: {error}")))?;

    let mut saw_any = false;
    for addr in resolved {
        saw_any = true;
        if is_blocked_address(addr.ip()) {
            return Err(TransportError::BlockedAddress(format!("{} resolves to {}", host, addr.ip())));
        }
    }

    if !saw_any {
        return Err(TransportError::Permanent(format!("{host} resolved to no addresses")));
    }

    Ok(())
}

/// Installed on the shared webhook/Apprise HTTP client via
/// `ClientBuilder::dns_resolver`. Every connection the client makes
/// funnels through here, so send-time revalidation happens for free on
/// every single request rather than as a separate call a caller could
/// forget to make.
#[derive(Clone, Default)]
pub struct BlockListedResolver;

impl Resolve for BlockListedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.as_str().to_string();
            let addrs = lookup_host((host.as_str(), 0))
                .await
                .map_err(|error| -> Box<dyn std::error::Error + Send + Sync> { Box::new(error) })?;

            let allowed: Vec<SocketAddr> = addrs.filter(|addr| !is_blocked_address(addr.ip())).collect();

            if allowed.is_empty() {
                return Err(format!("all resolved addresses for {host} are blocked").into());
            }

            Ok(Box::new(allowed.into_iter()) as Addrs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn blocks_loopback_and_link_local_and_private() {
        assert!(is_blocked_address(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(is_blocked_address(IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254))));
        assert!(is_blocked_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))));
        assert!(is_blocked_address(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
    }

    #[test]
    fn allows_public_address() {
        assert!(!is_blocked_address(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))));
    }

    #[tokio::test]
    async fn rejects_unsupported_scheme() {
        let result = validate_at_configure_time("ftp://example.com/hook").await;
        assert!(result.is_err());
    }
}
