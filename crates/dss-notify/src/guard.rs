//! Callback URL validation.
//!
//! Outside production any `http` or `https` URL is accepted. In production
//! only `https` is accepted and the host must resolve exclusively to
//! globally routable addresses, so a subscriber cannot aim deliveries at
//! internal services.

use std::{
    fmt::Debug,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

use async_trait::async_trait;
use dss_core::DeploymentStage;
use tracing::debug;
use url::{Host, Url};

use crate::error::{NotifyError, Result};

const NON_PROD_SCHEMES: &[&str] = &["http", "https"];
const PROD_SCHEMES: &[&str] = &["https"];

/// Resolves host names to addresses.
#[async_trait]
pub trait HostResolver: Send + Sync + Debug {
    /// All addresses `host` resolves to.
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await.map_err(|e| {
            NotifyError::Resolution { host: host.to_string(), message: e.to_string() }
        })?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Checks `url` against the URL policy of `stage`.
pub async fn validate_callback_url(
    url: &str,
    stage: DeploymentStage,
    resolver: &dyn HostResolver,
) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|e| NotifyError::InvalidUrl { url: url.to_string(), message: e.to_string() })?;

    let allowed = if stage.is_prod() { PROD_SCHEMES } else { NON_PROD_SCHEMES };
    if !allowed.contains(&parsed.scheme()) {
        return Err(NotifyError::ProhibitedScheme {
            scheme: parsed.scheme().to_string(),
            url: url.to_string(),
            allowed: format!("{{{}}}", allowed.join(", ")),
        });
    }

    if !stage.is_prod() {
        return Ok(());
    }

    let addresses = match parsed.host() {
        Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
        Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
        Some(Host::Domain(domain)) => resolver.resolve(domain).await?,
        None => {
            return Err(NotifyError::InvalidUrl {
                url: url.to_string(),
                message: "missing host".to_string(),
            })
        },
    };

    if addresses.is_empty() {
        return Err(NotifyError::Resolution {
            host: parsed.host_str().unwrap_or_default().to_string(),
            message: "no addresses".to_string(),
        });
    }

    if let Some(ip) = addresses.iter().find(|ip| !is_global(**ip)) {
        debug!(url, %ip, "callback host resolves to non-global address");
        return Err(NotifyError::PrivateAddress { url: url.to_string() });
    }

    Ok(())
}

/// Whether `ip` is publicly routable.
pub fn is_global(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => is_global_v4(ip),
        IpAddr::V6(ip) => is_global_v6(ip),
    }
}

fn is_global_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    let shared = a == 100 && (b & 0xc0) == 64;
    let protocol_assignments = a == 192 && b == 0 && c == 0;
    let benchmarking = a == 198 && (b & 0xfe) == 18;
    let reserved = a >= 240;

    !(a == 0
        || ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_documentation()
        || ip.is_multicast()
        || shared
        || protocol_assignments
        || benchmarking
        || reserved)
}

fn is_global_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_global_v4(v4);
    }
    let s = ip.segments();
    let unique_local = (s[0] & 0xfe00) == 0xfc00;
    let link_local = (s[0] & 0xffc0) == 0xfe80;
    let site_local = (s[0] & 0xffc0) == 0xfec0;
    let documentation = s[0] == 0x2001 && s[1] == 0x0db8;
    let discard = s[0] == 0x0100 && s[1] == 0 && s[2] == 0 && s[3] == 0;

    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        || unique_local
        || link_local
        || site_local
        || documentation
        || discard)
}
