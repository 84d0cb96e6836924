//! Client identity derivation behind reverse proxies.
//!
//! The candidate addresses are, in order: the TCP peer, then the entries of
//! `X-Forwarded-For` from right to left. The first `trusted_hops` candidates
//! are proxies we trust to have appended honestly; the identity is the next
//! one. When the chain is shorter than that, the left-most address wins.
//!
//! With `trusted_hops = 0` the header is ignored and the peer is the client.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the address the rate limiter keys on.
pub fn client_identity(peer: SocketAddr, headers: &HeaderMap, trusted_hops: usize) -> IpAddr {
    let mut identity = canonical(peer.ip());
    if trusted_hops == 0 {
        return identity;
    }

    let mut forwarded = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect::<Vec<_>>();
    forwarded.reverse();

    for entry in forwarded.into_iter().take(trusted_hops) {
        match parse_entry(entry) {
            Some(ip) => identity = ip,
            None => break,
        }
    }
    identity
}

/// Parse an `X-Forwarded-For` entry: a bare IP, `ip:port` or `[v6]:port`.
fn parse_entry(entry: &str) -> Option<IpAddr> {
    entry
        .parse::<IpAddr>()
        .ok()
        .or_else(|| entry.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .map(canonical)
}

fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
