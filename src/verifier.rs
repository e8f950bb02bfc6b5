//! The orchestrator: user-agent gate, range fast path, DNS slow path.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::VerifierConfig;
use crate::dns::{DnsVerifier, DohResolver};
use crate::error::FetchError;
use crate::http::HttpFetch;
use crate::identity::{AuthorizedDomains, CrawlerTokens};
use crate::ranges::{EmbeddedRangeSource, RangeMatcher, RemoteRangeSource};

/// Why a request was or was not accepted as a Google crawler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The user agent does not claim to be a Google crawler; nothing was checked.
    NotClaimed,
    /// The address is inside a published crawler range.
    PublishedRange,
    /// Reverse and forward DNS agree on a Google-owned hostname.
    DnsConfirmed,
    /// Claimed, but neither check passed (or DNS was unavailable).
    Unverified,
}

impl Verdict {
    pub fn is_verified(self) -> bool {
        matches!(self, Verdict::PublishedRange | Verdict::DnsConfirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::NotClaimed => "not-claimed",
            Verdict::PublishedRange => "published-range",
            Verdict::DnsConfirmed => "dns-confirmed",
            Verdict::Unverified => "unverified",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a request claiming to be Googlebot really is.
///
/// The range check is free but can lag Google's real fleet and omits some
/// tools; the DNS check covers any address but costs two round trips. DNS
/// therefore only runs when the range check says no.
#[derive(Clone)]
pub struct BotVerifier {
    tokens: CrawlerTokens,
    ranges: RangeMatcher,
    dns: DnsVerifier,
}

impl BotVerifier {
    pub fn new(tokens: CrawlerTokens, ranges: RangeMatcher, dns: DnsVerifier) -> Self {
        Self {
            tokens,
            ranges,
            dns,
        }
    }

    /// Ranges fetched from `config.ranges_url` and refreshed after
    /// `config.ranges_ttl`; DNS over `config.doh_endpoint`. Both share `fetch`.
    pub fn remote(config: &VerifierConfig, fetch: Arc<dyn HttpFetch>) -> Result<Self, FetchError> {
        let source = RemoteRangeSource::new(
            Arc::clone(&fetch),
            config.ranges_url.as_str(),
            config.ranges_ttl,
        );
        let ranges = RangeMatcher::new(Arc::new(source)).retry_after(config.ranges_retry_after);
        Ok(Self::new(
            CrawlerTokens::new(&config.crawler_tokens),
            ranges,
            dns_verifier(config, fetch)?,
        ))
    }

    /// Ranges from the compiled-in snapshot; only DNS touches the network.
    pub fn embedded(
        config: &VerifierConfig,
        source: EmbeddedRangeSource,
        dns_fetch: Arc<dyn HttpFetch>,
    ) -> Result<Self, FetchError> {
        Ok(Self::new(
            CrawlerTokens::new(&config.crawler_tokens),
            RangeMatcher::embedded(source),
            dns_verifier(config, dns_fetch)?,
        ))
    }

    pub fn ranges(&self) -> &RangeMatcher {
        &self.ranges
    }

    pub fn dns(&self) -> &DnsVerifier {
        &self.dns
    }

    pub async fn verdict(&self, user_agent: &str, address: &str) -> Verdict {
        if !self.tokens.is_claimed_by(user_agent) {
            return Verdict::NotClaimed;
        }

        self.ranges.ensure_fresh().await;
        if self.ranges.matches(address) {
            debug!(address, "crawler address in published range");
            return Verdict::PublishedRange;
        }

        if self.dns.verify(address).await {
            debug!(address, "crawler address confirmed by dns");
            Verdict::DnsConfirmed
        } else {
            debug!(address, user_agent, "claimed crawler failed verification");
            Verdict::Unverified
        }
    }

    pub async fn is_verified_bot(&self, user_agent: &str, address: &str) -> bool {
        self.verdict(user_agent, address).await.is_verified()
    }
}

fn dns_verifier(config: &VerifierConfig, fetch: Arc<dyn HttpFetch>) -> Result<DnsVerifier, FetchError> {
    let resolver = DohResolver::new(fetch, &config.doh_endpoint)?;
    Ok(DnsVerifier::new(
        Arc::new(resolver),
        AuthorizedDomains::new(&config.authorized_domains),
        config.dns_cache_ttl,
    ))
}
