//! Fastly Compute service: verifies Googlebot claims at the edge.
//!
//! `GET /verify?ip=a.b.c.d` answers with a JSON verdict. Every other request is
//! forwarded to the origin with `x-googlebot-verified` set, so the origin can
//! pick crawler content without trusting the user agent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fastly::http::{header, Method, StatusCode};
use fastly::{ConfigStore, Error, Request, Response};
use futures::executor::block_on;
use googlebot_verify::ranges::parse_address;
use googlebot_verify::{
    client_address, BotVerifier, EmbeddedRangeSource, FetchError, HttpFetch, Verdict,
    VerifierConfig,
};
use tracing_subscriber::EnvFilter;

/// The name of a backend server associated with this service.
/// When configuring the backend using Fastly's UI, make sure it points to "dns.google"
/// and carries a first-byte timeout that fits the request budget.
const DNS_RESOLVER: &str = "origin_0";

/// Backend that receives all non-`/verify` traffic.
const ORIGIN: &str = "origin";

/// Optional config store overriding [`VerifierConfig`] keys, plus
/// `trusted_ip_header` naming a header set by a proxy in front of this service.
const CONFIG_STORE: &str = "googlebot_verify";

const VERIFIED_HEADER: &str = "x-googlebot-verified";
const VERDICT_HEADER: &str = "x-googlebot-verdict";

/// The outcome of a lookup request.
enum Outcome {
    /// The client request had no query string.
    MissingQueryString,
    /// The client request had an invalid query string.
    InvalidQueryString,
    /// The address checked out as a Google crawler.
    IsGoogleBot { ip: String, verdict: Verdict },
    /// The address could not be confirmed.
    NotGoogleBot { ip: String, verdict: Verdict },
}

/// Convert a lookup request's [`Outcome`] into an HTTP [`Response`].
impl From<Outcome> for Response {
    fn from(outcome: Outcome) -> Self {
        use Outcome::*;
        let (result, reason, status) = match outcome {
            MissingQueryString => (
                "error",
                "Missing query string ?ip=a.b.c.d".to_string(),
                StatusCode::BAD_REQUEST,
            ),
            InvalidQueryString => (
                "error",
                "Invalid query string ?ip=a.b.c.d".to_string(),
                StatusCode::BAD_REQUEST,
            ),
            IsGoogleBot { ip, verdict } => (
                "yes",
                match verdict {
                    Verdict::PublishedRange => format!("{ip} is in a published Googlebot range"),
                    _ => format!("{ip} reverse and forward DNS resolve to a Google domain"),
                },
                StatusCode::OK,
            ),
            NotGoogleBot { ip, verdict } => (
                "no",
                match verdict {
                    Verdict::NotClaimed => "User agent does not claim to be a Google crawler".to_string(),
                    _ => format!(
                        "{ip} is outside the published ranges and its DNS does not confirm a Google domain"
                    ),
                },
                StatusCode::OK,
            ),
        };
        let body_json = serde_json::json!({
            "result": result,
            "reason": reason,
        });

        Response::from_status(status)
            .with_header(header::CONTENT_TYPE, "application/json")
            .with_header(VERIFIED_HEADER, result)
            .with_body(body_json.to_string())
    }
}

/// [`HttpFetch`] through a named Fastly backend. The backend's own timeouts
/// bound each request.
struct FastlyFetch {
    backend: &'static str,
}

#[async_trait]
impl HttpFetch for FastlyFetch {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut beresp = Request::get(url)
            .with_header(header::ACCEPT, "application/json")
            .send(self.backend)
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        if !beresp.get_status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: beresp.get_status().as_u16(),
            });
        }
        Ok(beresp.take_body_bytes())
    }
}

#[fastly::main]
fn main(req: Request) -> Result<Response, Error> {
    init_logging();
    let (config, trusted_ip_header) = load_config();
    let verifier = BotVerifier::embedded(
        &config,
        EmbeddedRangeSource::bundled(),
        Arc::new(FastlyFetch {
            backend: DNS_RESOLVER,
        }),
    )?;

    // Pattern match on the request method and path.
    match (req.get_method(), req.get_path()) {
        (&Method::GET, "/verify") => match handle_lookup_request(&verifier, &req) {
            Ok(response) => Ok(response),
            Err(error) => Ok(Response::from_status(StatusCode::BAD_REQUEST)
                .with_body_text_plain(&format!("ERROR: {}", error))),
        },

        _ => forward(&verifier, trusted_ip_header.as_deref(), req),
    }
}

fn handle_lookup_request(verifier: &BotVerifier, req: &Request) -> Result<Response, Error> {
    // extract the ip address from query string ?ip=value, and optionally ?ua=value
    let qs_params: HashMap<String, String> = req.get_query()?;

    let ip = match qs_params.get("ip") {
        Some(ip) => ip,
        // handle missing param
        _ => {
            return Ok(Outcome::MissingQueryString.into());
        }
    };
    if parse_address(ip).is_none() {
        return Ok(Outcome::InvalidQueryString.into());
    }
    let user_agent = qs_params.get("ua").map(String::as_str).unwrap_or("Googlebot");

    let verdict = block_on(verifier.verdict(user_agent, ip));
    let ip = ip.to_string();
    Ok(if verdict.is_verified() {
        Outcome::IsGoogleBot { ip, verdict }
    } else {
        Outcome::NotGoogleBot { ip, verdict }
    }
    .into())
}

fn forward(
    verifier: &BotVerifier,
    trusted_ip_header: Option<&str>,
    mut req: Request,
) -> Result<Response, Error> {
    let user_agent = req.get_header_str(header::USER_AGENT).unwrap_or_default().to_string();
    let address = client_address(
        trusted_ip_header.and_then(|name| req.get_header_str(name)),
        req.get_client_ip_addr(),
        req.get_header_str("x-forwarded-for"),
    );

    let verdict = block_on(verifier.verdict(&user_agent, &address));
    tracing::debug!(%address, %verdict, "forwarding to origin");

    // overwrite whatever the client sent
    req.set_header(VERIFIED_HEADER, if verdict.is_verified() { "yes" } else { "no" });
    req.set_header(VERDICT_HEADER, verdict.as_str());
    Ok(req.send(ORIGIN)?)
}

fn load_config() -> (VerifierConfig, Option<String>) {
    let mut config = VerifierConfig::default();
    let Ok(store) = ConfigStore::try_open(CONFIG_STORE) else {
        return (config, None);
    };
    for key in VerifierConfig::KEYS {
        if let Some(value) = store.get(key) {
            if !config.set(key, &value) {
                tracing::warn!(key, value = %value, "ignoring invalid config value");
            }
        }
    }
    let trusted_ip_header = store.get("trusted_ip_header").filter(|h| !h.trim().is_empty());
    (config, trusted_ip_header)
}

fn init_logging() {
    // stderr is captured by Fastly's log tailing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();
}
