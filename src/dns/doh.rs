//! DNS-over-HTTPS lookups against a JSON resolver API (`dns.google/resolve`).

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::{DnsError, FetchError};
use crate::http::HttpFetch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Ptr,
    A,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Ptr => "PTR",
            RecordType::A => "A",
        }
    }

    /// RR type code as it appears in the JSON `type` field.
    fn code(self) -> u16 {
        match self {
            RecordType::Ptr => 12,
            RecordType::A => 1,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves one record type for one name.
///
/// "No such record" is an empty list, not an error; errors are reserved for
/// transport failures and undecodable answers.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn lookup(&self, name: &str, record: RecordType) -> Result<Vec<String>, DnsError>;
}

/// `{ "Answer": [ { "type": 12, "data": "..." } ] }`
#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Option<Vec<DohAnswer>>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type", default)]
    record_type: Option<u16>,
    #[serde(default)]
    data: Option<String>,
}

/// Decode a JSON DoH answer, keeping the `data` of records of the requested
/// type. CNAME links in a chain are skipped.
pub fn decode_answers(name: &str, record: RecordType, body: &[u8]) -> Result<Vec<String>, DnsError> {
    let response: DohResponse = serde_json::from_slice(body).map_err(|e| DnsError::Decode {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(response
        .answer
        .unwrap_or_default()
        .into_iter()
        .filter(|a| a.record_type.map_or(true, |t| t == record.code()))
        .filter_map(|a| a.data)
        .collect())
}

/// `66.249.66.1` -> `1.66.249.66.in-addr.arpa`
pub fn reverse_name(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{d}.{c}.{b}.{a}.in-addr.arpa")
}

/// [`DnsResolver`] speaking the JSON DoH API over any [`HttpFetch`].
pub struct DohResolver {
    fetch: Arc<dyn HttpFetch>,
    endpoint: Url,
}

impl DohResolver {
    pub fn new(fetch: Arc<dyn HttpFetch>, endpoint: &str) -> Result<Self, FetchError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| FetchError::InvalidUrl(format!("{endpoint}: {e}")))?;
        Ok(Self { fetch, endpoint })
    }

    pub fn query_url(&self, name: &str, record: RecordType) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("type", record.as_str());
        url
    }
}

#[async_trait]
impl DnsResolver for DohResolver {
    async fn lookup(&self, name: &str, record: RecordType) -> Result<Vec<String>, DnsError> {
        let url = self.query_url(name, record);
        let body = self.fetch.get(url.as_str()).await?;
        decode_answers(name, record, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unused;

    #[async_trait]
    impl HttpFetch for Unused {
        async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Transport {
                url: url.to_string(),
                message: "offline".into(),
            })
        }
    }

    #[test]
    fn reverse_name_flips_octets() {
        assert_eq!(
            reverse_name(Ipv4Addr::new(66, 249, 66, 1)),
            "1.66.249.66.in-addr.arpa"
        );
    }

    #[test]
    fn query_url_encodes_name() {
        let resolver = DohResolver::new(Arc::new(Unused), "https://dns.google/resolve").unwrap();
        let url = resolver.query_url("1.66.249.66.in-addr.arpa", RecordType::Ptr);
        assert_eq!(
            url.as_str(),
            "https://dns.google/resolve?name=1.66.249.66.in-addr.arpa&type=PTR"
        );

        let hostile = resolver.query_url("a&type=TXT.googlebot.com", RecordType::A);
        assert_eq!(hostile.query(), Some("name=a%26type%3DTXT.googlebot.com&type=A"));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(DohResolver::new(Arc::new(Unused), "not a url").is_err());
    }

    #[test]
    fn answers_are_filtered_by_type() {
        let body = br#"{
            "Status": 0,
            "Answer": [
                {"name": "crawl.googlebot.com.", "type": 5, "TTL": 300, "data": "alias.googlebot.com."},
                {"name": "alias.googlebot.com.", "type": 1, "TTL": 300, "data": "66.249.66.1"},
                {"name": "alias.googlebot.com.", "type": 1, "TTL": 300}
            ]
        }"#;
        let answers = decode_answers("crawl.googlebot.com", RecordType::A, body).unwrap();
        assert_eq!(answers, vec!["66.249.66.1".to_string()]);
    }

    #[test]
    fn missing_answer_is_empty() {
        let nx = br#"{"Status": 3, "Authority": [{"name": "66.in-addr.arpa.", "type": 6}]}"#;
        assert!(decode_answers("x", RecordType::Ptr, nx).unwrap().is_empty());
        assert!(decode_answers("x", RecordType::Ptr, br#"{"Answer": []}"#)
            .unwrap()
            .is_empty());
        assert!(decode_answers("x", RecordType::Ptr, b"<html>").is_err());
    }

    #[tokio::test]
    async fn transport_errors_surface_as_dns_errors() {
        let resolver = DohResolver::new(Arc::new(Unused), "https://dns.google/resolve").unwrap();
        let err = resolver.lookup("example.com", RecordType::A).await.unwrap_err();
        assert!(matches!(err, DnsError::Fetch(FetchError::Transport { .. })));
    }
}
