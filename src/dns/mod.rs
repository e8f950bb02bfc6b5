//! DNS-based crawler verification.

mod doh;
mod verifier;

pub use doh::{decode_answers, reverse_name, DnsResolver, DohResolver, RecordType};
pub use verifier::{DnsOutcome, DnsVerifier};
