//! Who counts as a Google crawler: user-agent claims and hostname suffixes.

/// Case-insensitive user-agent tokens.
#[derive(Debug, Clone)]
pub struct CrawlerTokens {
    tokens: Vec<String>,
}

impl CrawlerTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Does this user agent claim to be one of the configured crawlers?
    pub fn is_claimed_by(&self, user_agent: &str) -> bool {
        if user_agent.is_empty() {
            return false;
        }
        let ua = user_agent.to_ascii_lowercase();
        self.tokens.iter().any(|token| ua.contains(token.as_str()))
    }
}

/// Domains whose subdomains are trusted reverse-DNS names.
#[derive(Debug, Clone)]
pub struct AuthorizedDomains {
    // stored as ".domain" so the check is a plain suffix match on a label boundary
    suffixes: Vec<String>,
}

impl AuthorizedDomains {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            suffixes: domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .map(|d| format!(".{d}"))
                .collect(),
        }
    }

    /// Check a PTR hostname. One trailing root dot is ignored.
    pub fn authorizes(&self, hostname: &str) -> bool {
        let host = hostname.strip_suffix('.').unwrap_or(hostname).to_ascii_lowercase();
        self.suffixes
            .iter()
            .any(|suffix| host.len() > suffix.len() && host.ends_with(suffix.as_str()))
    }
}
