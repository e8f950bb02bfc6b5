//! Reverse-then-forward DNS verification with a result cache and in-flight
//! deduplication.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::doh::{reverse_name, DnsResolver, RecordType};
use crate::clock::{Clock, SystemClock};
use crate::error::DnsError;
use crate::identity::AuthorizedDomains;
use crate::ranges::parse_address;

type PendingLookup = Shared<BoxFuture<'static, bool>>;

/// How a completed lookup turned out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOutcome {
    /// PTR and A agree on an authorized hostname.
    Confirmed { hostname: String },
    NoPtrAnswer,
    ForeignDomain { hostname: String },
    /// The hostname is authorized but does not resolve back to the address.
    ForwardMismatch { hostname: String },
    /// The resolver answered with something that is not a DNS answer.
    Malformed { name: String, message: String },
}

impl DnsOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, DnsOutcome::Confirmed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    verified: bool,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    cache: HashMap<Ipv4Addr, CacheEntry>,
    in_flight: HashMap<Ipv4Addr, PendingLookup>,
}

/// Confirms an IPv4 address belongs to a Google-owned hostname.
///
/// At most one reverse+forward pair runs per address at a time; callers that
/// arrive while it runs wait on the same result. Answers, positive and
/// negative, are cached for the configured TTL; an undecodable answer counts
/// as a negative one. Transport failures are not cached, so the next request
/// for that address tries again.
#[derive(Clone)]
pub struct DnsVerifier {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: Arc<dyn DnsResolver>,
    domains: AuthorizedDomains,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl DnsVerifier {
    pub fn new(resolver: Arc<dyn DnsResolver>, domains: AuthorizedDomains, ttl: Duration) -> Self {
        Self::with_clock(resolver, domains, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        resolver: Arc<dyn DnsResolver>,
        domains: AuthorizedDomains,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                domains,
                ttl,
                clock,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Verify `address`. Never fails: IPv6, malformed input, missing records
    /// and resolver errors all answer `false`.
    pub async fn verify(&self, address: &str) -> bool {
        let ip = match parse_address(address) {
            Some(IpAddr::V4(ip)) => ip,
            Some(IpAddr::V6(_)) | None => {
                debug!(address, "address not eligible for reverse DNS");
                return false;
            }
        };

        let pending = {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();
            if let Some(entry) = state.cache.get(&ip).copied() {
                if now < entry.expires_at {
                    return entry.verified;
                }
                state.cache.remove(&ip);
            }
            let joined = state.in_flight.get(&ip).cloned();
            match joined {
                Some(pending) => pending,
                None => {
                    let inner = Arc::clone(&self.inner);
                    let pending = async move { inner.lookup(ip).await }.boxed().shared();
                    state.in_flight.insert(ip, pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Number of unexpired cache entries.
    pub fn cached(&self) -> usize {
        let now = self.inner.clock.now();
        let state = self.inner.state.lock();
        state.cache.values().filter(|e| now < e.expires_at).count()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }
}

impl Inner {
    async fn lookup(self: Arc<Self>, ip: Ipv4Addr) -> bool {
        let _in_flight = InFlight { inner: &self, ip };
        let outcome = match self.confirm(ip).await {
            Ok(outcome) => outcome,
            Err(DnsError::Decode { name, message }) => DnsOutcome::Malformed { name, message },
            Err(e @ DnsError::Fetch(_)) => {
                warn!(%ip, error = %e, "dns verification failed, treating as unverified");
                return false;
            }
        };
        debug!(%ip, ?outcome, "dns verification finished");
        let verified = outcome.is_confirmed();
        let expires_at = self.clock.now() + self.ttl;
        self.state.lock().cache.insert(
            ip,
            CacheEntry {
                verified,
                expires_at,
            },
        );
        verified
    }

    /// Reverse lookup, domain check, forward lookup; each step gates the next.
    async fn confirm(&self, ip: Ipv4Addr) -> Result<DnsOutcome, DnsError> {
        let ptr = self.resolver.lookup(&reverse_name(ip), RecordType::Ptr).await?;
        let Some(hostname) = ptr.into_iter().next() else {
            return Ok(DnsOutcome::NoPtrAnswer);
        };
        let hostname = hostname.strip_suffix('.').unwrap_or(&hostname).to_string();

        if !self.domains.authorizes(&hostname) {
            return Ok(DnsOutcome::ForeignDomain { hostname });
        }

        let forward = self.resolver.lookup(&hostname, RecordType::A).await?;
        let round_trips = forward
            .iter()
            .filter_map(|data| data.trim().parse::<Ipv4Addr>().ok())
            .any(|addr| addr == ip);

        Ok(if round_trips {
            DnsOutcome::Confirmed { hostname }
        } else {
            DnsOutcome::ForwardMismatch { hostname }
        })
    }
}

/// Removes the in-flight entry when a lookup ends, however it ends.
struct InFlight<'a> {
    inner: &'a Inner,
    ip: Ipv4Addr,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.inner.state.lock().in_flight.remove(&self.ip);
    }
}
