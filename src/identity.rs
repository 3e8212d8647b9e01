//! Client identity resolution with trusted-proxy awareness.
//!
//! Derives a stable rate-limit key from the connection address and the
//! de-facto forwarding headers (`X-Forwarded-For`, `X-Real-IP`).
//! Forwarding headers are trivially spoofable, so they are honored only
//! when the direct peer is inside an operator-configured trusted range;
//! otherwise the connection address wins. With no trusted ranges
//! configured the resolver never reads headers at all, which is the
//! secure default for deployments without a fronting proxy.

use std::net::{IpAddr, SocketAddr};

use hyper::header::HeaderMap;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use tracing::warn;

/// Header carrying the left-to-right chain of proxied client addresses.
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Single-value fallback header set by some proxies.
const X_REAL_IP: &str = "x-real-ip";

/// An immutable set of network ranges whose forwarding headers are
/// permitted to override the observed connection address.
///
/// Built once from configuration strings and shared across all request
/// handlers. Entries may be CIDR ranges (`"10.0.0.0/8"`) or bare
/// addresses, which are promoted to host-length prefixes. Malformed
/// entries are dropped with a warning rather than failing construction:
/// an ignored range is strictly more conservative than a misparsed one.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxySet {
    ranges: Vec<IpNet>,
}

impl TrustedProxySet {
    /// Parses the given CIDR/address strings into a trusted set.
    pub fn from_strings<S: AsRef<str>>(entries: &[S]) -> Self {
        let ranges = entries
            .iter()
            .filter_map(|entry| {
                let entry = entry.as_ref().trim();
                if let Ok(net) = entry.parse::<IpNet>() {
                    return Some(net);
                }
                match entry.parse::<IpAddr>() {
                    Ok(IpAddr::V4(v4)) => Ipv4Net::new(v4, 32).ok().map(IpNet::V4),
                    Ok(IpAddr::V6(v6)) => Ipv6Net::new(v6, 128).ok().map(IpNet::V6),
                    Err(e) => {
                        warn!(entry, error = %e, "ignoring unparsable trusted proxy entry");
                        None
                    }
                }
            })
            .collect();

        Self { ranges }
    }

    /// Returns `true` if no ranges are configured.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns `true` if `ip` falls within any trusted range.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.ranges.iter().any(|net| net.contains(&ip))
    }
}

/// Resolves the client identity key for a request.
///
/// `remote_addr` is the direct connection address in `ip:port` or bare
/// `ip` form. The resolution order:
///
/// 1. Unparsable connection address → returned verbatim (last resort).
/// 2. No trusted ranges configured → direct address.
/// 3. Direct address outside every trusted range → direct address; an
///    untrusted intermediary cannot override identity.
/// 4. Otherwise the first entry of `X-Forwarded-For` (left to right)
///    that parses as a publicly routable address, then `X-Real-IP`
///    under the same filter, then the direct address.
pub fn resolve_client_key(
    remote_addr: &str,
    headers: &HeaderMap,
    trusted: &TrustedProxySet,
) -> String {
    let direct = match parse_addr(remote_addr) {
        Some(ip) => ip,
        None => return remote_addr.to_owned(),
    };

    if trusted.is_empty() || !trusted.contains(direct) {
        return direct.to_string();
    }

    if let Some(chain) = header_str(headers, X_FORWARDED_FOR) {
        for candidate in chain.split(',') {
            if let Some(ip) = candidate.trim().parse::<IpAddr>().ok().filter(is_public) {
                return ip.to_string();
            }
        }
    }

    if let Some(value) = header_str(headers, X_REAL_IP) {
        if let Some(ip) = value.trim().parse::<IpAddr>().ok().filter(is_public) {
            return ip.to_string();
        }
    }

    direct.to_string()
}

/// Parses an `ip:port` or bare `ip` string into an address.
fn parse_addr(remote_addr: &str) -> Option<IpAddr> {
    if let Ok(sock) = remote_addr.parse::<SocketAddr>() {
        return Some(sock.ip());
    }
    remote_addr.parse::<IpAddr>().ok()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Returns `true` for addresses that are plausibly a real client on the
/// public internet. Private, loopback, link-local, and unspecified
/// addresses appearing in a forwarded chain are proxy-internal hops,
/// not client identities.
///
/// Stable Rust has no `IpAddr::is_global`, so the relevant subset is
/// checked here directly.
fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            // fc00::/7 unique-local, fe80::/10 link-local.
            let seg = v6.segments();
            let unique_local = (seg[0] & 0xfe00) == 0xfc00;
            let link_local = (seg[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}
