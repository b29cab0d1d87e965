use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Request, Response};
use std::time::Duration;

/// Error produced by an [`HttpTransport`]
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Executes a single HTTP exchange
///
/// Timeouts and cancellation are the transport's business; the fetcher
/// waits for whatever the transport returns.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, TransportError>;
}

/// Transport backed by a `reqwest` client
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("cloudconf-agent/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        Ok(self.client.execute(request).await?)
    }
}
