//! Error types used inside the verification core.
//!
//! None of these cross the public verdict boundary: the matcher, the DNS
//! verifier and the orchestrator all collapse failures into `false`.

use thiserror::Error;

/// A failed outbound HTTP GET.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },
    /// The upstream answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    /// The response body could not be read.
    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
    /// The URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Failure loading a range snapshot.
#[derive(Debug, Clone, Error)]
pub enum RangeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("malformed range document: {0}")]
    Decode(String),
}

/// Failure resolving a record over DNS-over-HTTPS.
#[derive(Debug, Clone, Error)]
pub enum DnsError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("malformed DoH response for {name}: {message}")]
    Decode { name: String, message: String },
}

/// A configuration document that could not be parsed.
#[derive(Debug, Clone, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);
