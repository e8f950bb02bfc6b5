//! Verifier configuration.
//!
//! Every field has a default, so an empty JSON object (or no configuration at
//! all) yields a working setup pointed at Google's public endpoints.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Google's published Googlebot ranges.
pub const GOOGLEBOT_RANGES_URL: &str =
    "https://developers.google.com/static/search/apis/ipranges/googlebot.json";

/// Google Public DNS JSON API.
pub const GOOGLE_DOH_ENDPOINT: &str = "https://dns.google/resolve";

pub const DEFAULT_CRAWLER_TOKENS: &[&str] = &[
    "Googlebot",
    "Google-InspectionTool",
    "GoogleOther",
    "Storebot-Google",
    "Google-Extended",
    "AdsBot-Google",
    "Mediapartners-Google",
    "APIs-Google",
    "FeedFetcher-Google",
    "Google-Site-Verification",
];

pub const DEFAULT_AUTHORIZED_DOMAINS: &[&str] =
    &["googlebot.com", "google.com", "googleusercontent.com"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    /// User-agent tokens that mark a request as claiming to be a Google crawler.
    pub crawler_tokens: Vec<String>,
    /// Domains whose subdomains may host Google crawlers.
    pub authorized_domains: Vec<String>,
    pub ranges_url: String,
    #[serde(rename = "ranges_ttl_ms", with = "millis")]
    pub ranges_ttl: Duration,
    /// Minimum spacing between range fetch attempts after a failure.
    #[serde(rename = "ranges_retry_after_ms", with = "millis")]
    pub ranges_retry_after: Duration,
    pub doh_endpoint: String,
    #[serde(rename = "dns_cache_ttl_ms", with = "millis")]
    pub dns_cache_ttl: Duration,
    /// Upper bound for a single outbound request, enforced by the transport.
    #[serde(rename = "request_timeout_ms", with = "millis")]
    pub request_timeout: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            crawler_tokens: DEFAULT_CRAWLER_TOKENS.iter().map(|t| t.to_string()).collect(),
            authorized_domains: DEFAULT_AUTHORIZED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            ranges_url: GOOGLEBOT_RANGES_URL.to_string(),
            ranges_ttl: Duration::from_secs(10 * 60),
            ranges_retry_after: Duration::from_secs(30),
            doh_endpoint: GOOGLE_DOH_ENDPOINT.to_string(),
            dns_cache_ttl: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_millis(800),
        }
    }
}

impl VerifierConfig {
    /// Keys accepted by [`VerifierConfig::set`].
    pub const KEYS: &'static [&'static str] = &[
        "crawler_tokens",
        "authorized_domains",
        "ranges_url",
        "ranges_ttl_ms",
        "ranges_retry_after_ms",
        "doh_endpoint",
        "dns_cache_ttl_ms",
        "request_timeout_ms",
    ];

    /// Parse a JSON configuration document. Missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError(e.to_string()))
    }

    /// Override a single key from a flat string store (for example a Fastly
    /// config store). Returns `false` when the key is unknown or the value
    /// does not parse, leaving the config untouched.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let list = |v: &str| -> Vec<String> {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        let ms = |v: &str| v.trim().parse::<u64>().ok().map(Duration::from_millis);

        match key {
            "crawler_tokens" => self.crawler_tokens = list(value),
            "authorized_domains" => self.authorized_domains = list(value),
            "ranges_url" => self.ranges_url = value.trim().to_string(),
            "doh_endpoint" => self.doh_endpoint = value.trim().to_string(),
            "ranges_ttl_ms" => match ms(value) {
                Some(d) => self.ranges_ttl = d,
                None => return false,
            },
            "ranges_retry_after_ms" => match ms(value) {
                Some(d) => self.ranges_retry_after = d,
                None => return false,
            },
            "dns_cache_ttl_ms" => match ms(value) {
                Some(d) => self.dns_cache_ttl = d,
                None => return false,
            },
            "request_timeout_ms" => match ms(value) {
                Some(d) => self.request_timeout = d,
                None => return false,
            },
            _ => return false,
        }
        true
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_defaults() {
        let config = VerifierConfig::from_json("{}").unwrap();
        assert_eq!(config.ranges_ttl, Duration::from_secs(600));
        assert_eq!(config.dns_cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.doh_endpoint, GOOGLE_DOH_ENDPOINT);
        assert!(config.crawler_tokens.iter().any(|t| t == "Googlebot"));
    }

    #[test]
    fn durations_are_milliseconds() {
        let config = VerifierConfig::from_json(
            r#"{"ranges_ttl_ms": 1500, "crawler_tokens": ["Googlebot"]}"#,
        )
        .unwrap();
        assert_eq!(config.ranges_ttl, Duration::from_millis(1500));
        assert_eq!(config.crawler_tokens, vec!["Googlebot".to_string()]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(VerifierConfig::from_json(r#"{"ranges_tll_ms": 5}"#).is_err());
    }

    #[test]
    fn flat_overrides() {
        let mut config = VerifierConfig::default();
        assert!(config.set("authorized_domains", "googlebot.com, google.com"));
        assert!(config.set("request_timeout_ms", "250"));
        assert!(!config.set("request_timeout_ms", "soon"));
        assert!(!config.set("nope", "1"));

        assert_eq!(config.authorized_domains, vec!["googlebot.com", "google.com"]);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn every_listed_key_is_settable() {
        let mut config = VerifierConfig::default();
        for key in VerifierConfig::KEYS {
            let value = if key.ends_with("_ms") { "1000" } else { "value" };
            assert!(config.set(key, value), "{key}");
        }
        assert_eq!(config.dns_cache_ttl, Duration::from_secs(1));
    }
}
