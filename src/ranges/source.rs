//! Where range snapshots come from.
//!
//! The matcher only sees [`RangeSource`]; swapping a live fetch for the
//! compiled-in snapshot does not touch matching.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use super::snapshot::{PrefixList, RangeDocument, RangeSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::error::RangeError;
use crate::http::HttpFetch;

/// Snapshot written by `googlebot-ranges fetch` and compiled in.
pub const BUNDLED_RANGES: &str = include_str!("../../data/googlebot-ranges.json");

/// How often a source wants to be reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Load once; the data never changes for the life of the process.
    Never,
    /// Reload once the snapshot is older than this.
    After(Duration),
}

#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Produce a complete snapshot. Partial results are never returned.
    async fn load(&self) -> Result<RangeSnapshot, RangeError>;

    fn refresh_policy(&self) -> RefreshPolicy;
}

/// Fetches Google's range document over HTTP.
pub struct RemoteRangeSource {
    fetch: Arc<dyn HttpFetch>,
    url: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RemoteRangeSource {
    pub fn new(fetch: Arc<dyn HttpFetch>, url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            fetch,
            url: url.into(),
            ttl,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fetch and decode the document without parsing the prefixes.
    pub async fn fetch_prefix_list(&self) -> Result<PrefixList, RangeError> {
        let body = self.fetch.get(&self.url).await?;
        let document = RangeDocument::from_slice(&body)?;
        Ok(PrefixList::from_document(&document, self.url.as_str()))
    }
}

#[async_trait]
impl RangeSource for RemoteRangeSource {
    async fn load(&self) -> Result<RangeSnapshot, RangeError> {
        let list = self.fetch_prefix_list().await?;
        let snapshot = RangeSnapshot::from_prefix_list(&list, self.clock.now());
        // an empty answer would silently disable the fast path
        if snapshot.is_empty() {
            return Err(RangeError::Decode(format!(
                "no usable prefixes in document from {}",
                self.url
            )));
        }
        debug!(
            url = %self.url,
            ipv4 = snapshot.ipv4.len(),
            ipv6 = snapshot.ipv6.len(),
            "fetched range document"
        );
        Ok(snapshot)
    }

    fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::After(self.ttl)
    }
}

/// A prefix list baked into the binary. No I/O, never refreshed.
pub struct EmbeddedRangeSource {
    list: PrefixList,
    clock: Arc<dyn Clock>,
}

impl EmbeddedRangeSource {
    pub fn new(list: PrefixList) -> Self {
        Self {
            list,
            clock: Arc::new(SystemClock),
        }
    }

    /// The snapshot compiled in from `data/googlebot-ranges.json`.
    pub fn bundled() -> Self {
        Self::from_json(BUNDLED_RANGES)
    }

    /// Parse a serialized [`PrefixList`]. A broken artifact degrades to an
    /// empty list so every lookup falls through to DNS.
    pub fn from_json(text: &str) -> Self {
        let list = PrefixList::from_json(text).unwrap_or_else(|e| {
            error!(error = %e, "embedded range snapshot is unreadable");
            PrefixList::default()
        });
        Self::new(list)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn prefix_list(&self) -> &PrefixList {
        &self.list
    }

    pub fn snapshot(&self) -> RangeSnapshot {
        RangeSnapshot::from_prefix_list(&self.list, self.clock.now())
    }
}

#[async_trait]
impl RangeSource for EmbeddedRangeSource {
    async fn load(&self) -> Result<RangeSnapshot, RangeError> {
        Ok(self.snapshot())
    }

    fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::Never
    }
}
