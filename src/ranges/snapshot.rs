//! Parsed range sets and the documents they are built from.

use std::net::IpAddr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cidr::{parse_address, CidrBlock, Ipv4Block, Ipv6Block};
use crate::error::RangeError;

/// Blocks for one address family. Order carries no meaning.
#[derive(Debug, Clone)]
pub struct RangeSet<B> {
    blocks: Vec<B>,
}

impl<B> Default for RangeSet<B> {
    fn default() -> Self {
        Self { blocks: Vec::new() }
    }
}

impl<B: CidrBlock> RangeSet<B> {
    pub fn contains(&self, addr: B::Addr) -> bool {
        self.blocks.iter().any(|block| block.contains(addr))
    }

    pub fn blocks(&self) -> &[B] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl<B> FromIterator<B> for RangeSet<B> {
    fn from_iter<I: IntoIterator<Item = B>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

/// A complete, immutable view of the published ranges.
#[derive(Debug, Clone, Default)]
pub struct RangeSnapshot {
    pub ipv4: RangeSet<Ipv4Block>,
    pub ipv6: RangeSet<Ipv6Block>,
    /// When the blocks were obtained; `None` for a cold snapshot.
    pub fetched_at: Option<Instant>,
}

impl RangeSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse prefix strings, dropping any that do not parse.
    pub fn from_prefix_list(list: &PrefixList, fetched_at: Instant) -> Self {
        let ipv4: RangeSet<Ipv4Block> = parse_all(&list.ipv4_prefixes, Ipv4Block::parse);
        let ipv6: RangeSet<Ipv6Block> = parse_all(&list.ipv6_prefixes, Ipv6Block::parse);
        Self {
            ipv4,
            ipv6,
            fetched_at: Some(fetched_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }

    /// Is `address` inside any block? Malformed text is never a match.
    pub fn matches(&self, address: &str) -> bool {
        match parse_address(address) {
            Some(IpAddr::V4(v4)) => self.ipv4.contains(u32::from(v4)),
            Some(IpAddr::V6(v6)) => self.ipv6.contains(u128::from(v6)),
            None => false,
        }
    }
}

fn parse_all<B>(prefixes: &[String], parse: fn(&str) -> Option<B>) -> RangeSet<B> {
    prefixes
        .iter()
        .filter_map(|cidr| {
            let block = parse(cidr);
            if block.is_none() {
                debug!(cidr = %cidr, "dropping malformed prefix");
            }
            block
        })
        .collect()
}

/// Google's range document (`googlebot.json`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeDocument {
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub prefixes: Vec<PrefixEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixEntry {
    #[serde(default)]
    pub ipv4_prefix: Option<String>,
    #[serde(default)]
    pub ipv6_prefix: Option<String>,
}

impl RangeDocument {
    pub fn from_slice(body: &[u8]) -> Result<Self, RangeError> {
        serde_json::from_slice(body).map_err(|e| RangeError::Decode(e.to_string()))
    }
}

/// Serialized prefix strings, the artifact written at build time and
/// compiled into the binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixList {
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub ipv4_prefixes: Vec<String>,
    #[serde(default)]
    pub ipv6_prefixes: Vec<String>,
}

impl PrefixList {
    /// Collect the prefixes of a range document. Entries carrying neither
    /// family are skipped; the strings are not validated here.
    pub fn from_document(document: &RangeDocument, source: impl Into<String>) -> Self {
        let mut list = Self {
            creation_time: document.creation_time.clone(),
            source: source.into(),
            ..Self::default()
        };
        for entry in &document.prefixes {
            if let Some(v4) = &entry.ipv4_prefix {
                list.ipv4_prefixes.push(v4.clone());
            }
            if let Some(v6) = &entry.ipv6_prefix {
                list.ipv6_prefixes.push(v6.clone());
            }
        }
        list
    }

    pub fn from_json(text: &str) -> Result<Self, RangeError> {
        serde_json::from_str(text).map_err(|e| RangeError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "creationTime": "2025-01-07T23:00:00.000000",
        "prefixes": [
            {"ipv6Prefix": "2001:4860:4801:10::/64"},
            {"ipv4Prefix": "66.249.64.0/27"},
            {"ipv4Prefix": "66.249.66.0/27", "service": "ignored"},
            {"ipv4Prefix": "66.249.66.0/40"},
            {"scope": "nothing here"}
        ]
    }"#;

    fn snapshot() -> RangeSnapshot {
        let document = RangeDocument::from_slice(DOCUMENT.as_bytes()).unwrap();
        let list = PrefixList::from_document(&document, "test");
        RangeSnapshot::from_prefix_list(&list, Instant::now())
    }

    #[test]
    fn document_entries_are_split_by_family() {
        let document = RangeDocument::from_slice(DOCUMENT.as_bytes()).unwrap();
        let list = PrefixList::from_document(&document, "test");
        assert_eq!(list.creation_time.as_deref(), Some("2025-01-07T23:00:00.000000"));
        assert_eq!(list.ipv4_prefixes.len(), 3);
        assert_eq!(list.ipv6_prefixes, vec!["2001:4860:4801:10::/64".to_string()]);
    }

    #[test]
    fn malformed_prefixes_are_dropped() {
        let snapshot = snapshot();
        assert_eq!(snapshot.ipv4.len(), 2);
        assert_eq!(snapshot.ipv6.len(), 1);
        assert!(snapshot.fetched_at.is_some());
    }

    #[test]
    fn matches_both_families() {
        let snapshot = snapshot();
        assert!(snapshot.matches("66.249.66.1"));
        assert!(snapshot.matches("66.249.64.31"));
        assert!(!snapshot.matches("66.249.64.32"));
        assert!(snapshot.matches("2001:4860:4801:10::abcd"));
        assert!(!snapshot.matches("2001:4860:4801:11::1"));
    }

    #[test]
    fn malformed_addresses_never_match() {
        let snapshot = snapshot();
        for bad in ["999.1.1.1", "1.2.3", "not-an-ip", "", "66.249.66.1/27"] {
            assert!(!snapshot.matches(bad), "{bad:?}");
        }
    }

    #[test]
    fn empty_snapshot_matches_nothing() {
        let snapshot = RangeSnapshot::empty();
        assert!(snapshot.is_empty());
        assert!(!snapshot.matches("66.249.66.1"));
        assert!(!snapshot.matches("::1"));
    }

    #[test]
    fn missing_prefixes_is_an_empty_document() {
        let document = RangeDocument::from_slice(b"{}").unwrap();
        assert!(document.prefixes.is_empty());
        assert!(RangeDocument::from_slice(b"<html>").is_err());
    }

    #[test]
    fn prefix_list_round_trips_through_json() {
        let document = RangeDocument::from_slice(DOCUMENT.as_bytes()).unwrap();
        let list = PrefixList::from_document(&document, "test");
        let text = serde_json::to_string(&list).unwrap();
        assert!(text.contains("\"ipv4Prefixes\""));
        assert_eq!(PrefixList::from_json(&text).unwrap(), list);
    }
}
