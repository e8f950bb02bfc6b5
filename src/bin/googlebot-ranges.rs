//! Build-time and diagnostic tooling for Googlebot verification.
//!
//! `fetch` regenerates the snapshot compiled into the library,
//! `check` tests addresses against a snapshot, and `verify` runs the full
//! range-then-DNS check against live endpoints.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use googlebot_verify::ranges::{EmbeddedRangeSource, RemoteRangeSource};
use googlebot_verify::{BotVerifier, ReqwestFetch, VerifierConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "googlebot-ranges", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download Google's range document and write the snapshot artifact.
    Fetch {
        #[arg(long, default_value = googlebot_verify::config::GOOGLEBOT_RANGES_URL)]
        url: String,
        #[arg(long, default_value = "data/googlebot-ranges.json")]
        out: PathBuf,
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
    /// Check addresses against a snapshot (the compiled-in one by default).
    Check {
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(required = true)]
        addresses: Vec<String>,
    },
    /// Run full verification against live endpoints.
    Verify {
        #[arg(long, default_value = "Googlebot/2.1")]
        user_agent: String,
        /// JSON configuration file; defaults apply to missing keys.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(required = true)]
        addresses: Vec<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Fetch {
            url,
            out,
            timeout_ms,
        } => fetch(url, out, timeout_ms).await,
        Command::Check {
            snapshot,
            addresses,
        } => check(snapshot, &addresses),
        Command::Verify {
            user_agent,
            config,
            addresses,
        } => verify(&user_agent, config, &addresses).await,
    }
}

async fn fetch(url: String, out: PathBuf, timeout_ms: u64) -> anyhow::Result<()> {
    let http = ReqwestFetch::new(Duration::from_millis(timeout_ms))?;
    // one-shot fetch, the refresh ttl is never consulted
    let source = RemoteRangeSource::new(Arc::new(http), url.as_str(), Duration::ZERO);
    let list = source
        .fetch_prefix_list()
        .await
        .with_context(|| format!("failed to fetch {url}"))?;
    if list.ipv4_prefixes.is_empty() && list.ipv6_prefixes.is_empty() {
        bail!("{url} listed no prefixes; refusing to overwrite {}", out.display());
    }

    let mut text = serde_json::to_string_pretty(&list)?;
    text.push('\n');
    std::fs::write(&out, text).with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "wrote {} ({} IPv4 prefixes, {} IPv6 prefixes)",
        out.display(),
        list.ipv4_prefixes.len(),
        list.ipv6_prefixes.len()
    );
    Ok(())
}

fn check(snapshot: Option<PathBuf>, addresses: &[String]) -> anyhow::Result<()> {
    let source = match snapshot {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            EmbeddedRangeSource::from_json(&text)
        }
        None => EmbeddedRangeSource::bundled(),
    };
    let snapshot = source.snapshot();
    println!(
        "loaded {} IPv4 ranges, {} IPv6 ranges",
        snapshot.ipv4.len(),
        snapshot.ipv6.len()
    );
    for address in addresses {
        let verdict = if snapshot.matches(address) { "in range" } else { "not in range" };
        println!("{address}: {verdict}");
    }
    Ok(())
}

async fn verify(
    user_agent: &str,
    config: Option<PathBuf>,
    addresses: &[String],
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            VerifierConfig::from_json(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => VerifierConfig::default(),
    };
    let http = ReqwestFetch::new(config.request_timeout)?;
    let verifier = BotVerifier::remote(&config, Arc::new(http))?;

    for address in addresses {
        let verdict = verifier.verdict(user_agent, address).await;
        println!("{address}: {verdict}");
    }
    Ok(())
}
