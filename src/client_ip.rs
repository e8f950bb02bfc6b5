//! Choosing the client address to verify from what the edge layer sees.

use std::net::IpAddr;

pub const LOOPBACK_FALLBACK: &str = "127.0.0.1";

/// Pick the candidate address: a trusted proxy header, then the address the
/// platform reports, then the first hop of `X-Forwarded-For`, then loopback.
///
/// The result is not validated; the verifier rejects malformed text itself.
pub fn client_address(
    trusted_header: Option<&str>,
    platform: Option<IpAddr>,
    forwarded_for: Option<&str>,
) -> String {
    if let Some(trusted) = trusted_header.map(str::trim).filter(|s| !s.is_empty()) {
        return trusted.to_string();
    }
    if let Some(ip) = platform {
        return ip.to_string();
    }
    forwarded_for
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(LOOPBACK_FALLBACK)
        .to_string()
}
