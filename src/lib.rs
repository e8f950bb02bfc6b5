//! Googlebot verification.
//!
//! A request that claims to come from a Google crawler is checked in two
//! steps: its address is matched against Google's published crawler ranges,
//! and if that fails, a reverse (PTR) lookup followed by a forward (A) lookup
//! over DNS-over-HTTPS must agree on a Google-owned hostname.
//!
//! ```ignore
//! use std::sync::Arc;
//! use googlebot_verify::{BotVerifier, ReqwestFetch, VerifierConfig};
//!
//! let config = VerifierConfig::default();
//! let fetch = Arc::new(ReqwestFetch::new(config.request_timeout)?);
//! let verifier = BotVerifier::remote(&config, fetch)?;
//!
//! if verifier.is_verified_bot(user_agent, "66.249.66.1").await {
//!     // serve crawler content
//! }
//! ```
//!
//! Nothing in the public surface returns an error for a bad address or an
//! unreachable resolver: every check answers `false` instead.

pub mod client_ip;
pub mod clock;
pub mod config;
pub mod dns;
pub mod error;
pub mod http;
pub mod identity;
pub mod ranges;
mod verifier;

pub use client_ip::client_address;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::VerifierConfig;
pub use dns::{DnsResolver, DnsVerifier, DohResolver, RecordType};
pub use error::{ConfigError, DnsError, FetchError, RangeError};
#[cfg(feature = "native")]
pub use http::ReqwestFetch;
pub use http::HttpFetch;
pub use identity::{AuthorizedDomains, CrawlerTokens};
pub use ranges::{EmbeddedRangeSource, RangeMatcher, RangeSnapshot, RangeSource, RemoteRangeSource};
pub use verifier::{BotVerifier, Verdict};
