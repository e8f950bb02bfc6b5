//! Outbound HTTP GET, the one I/O primitive the core needs.

use async_trait::async_trait;

use crate::error::FetchError;

/// Fetch a URL and return its body. Any non-success status is an error.
///
/// Implementations own their timeout: a request that exceeds it must resolve
/// to [`FetchError::Timeout`] rather than hang.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[cfg(feature = "native")]
pub use self::native::ReqwestFetch;

#[cfg(feature = "native")]
mod native {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::HttpFetch;
    use crate::error::FetchError;

    /// [`HttpFetch`] over a shared `reqwest` client.
    #[derive(Debug, Clone)]
    pub struct ReqwestFetch {
        client: reqwest::Client,
    }

    impl ReqwestFetch {
        pub fn new(timeout: Duration) -> Result<Self, FetchError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(timeout)
                .user_agent(concat!("googlebot-verify/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| FetchError::Transport {
                    url: String::new(),
                    message: e.to_string(),
                })?;
            Ok(Self { client })
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    fn classify(url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    #[async_trait]
    impl HttpFetch for ReqwestFetch {
        async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            let response = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| classify(url, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    classify(url, e)
                } else {
                    FetchError::Body {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;
            Ok(body.to_vec())
        }
    }
}
