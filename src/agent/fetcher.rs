use anyhow::Context;
use flate2::read::GzDecoder;
use reqwest::header::{
    ACCEPT, CACHE_CONTROL, CONNECTION, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue,
};
use reqwest::{Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use super::config::WireHeaders;
use super::identity::{UserIdentity, non_empty};
use super::transport::{HttpTransport, TransportError};

/// Errors from a single conditional fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid config URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid value for header {name}")]
    InvalidHeader {
        name: HeaderName,
        #[source]
        source: InvalidHeaderValue,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("unexpected response status {status} from {url}")]
    UnexpectedStatus {
        url: String,
        status: StatusCode,
        headers: HeaderMap,
    },

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decompress config from {url}: {source}")]
    Decompress {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Name of the step that failed
    pub fn op(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } | FetchError::InvalidHeader { .. } => "new-request",
            FetchError::Transport { .. } => "fetch-cloud-config",
            FetchError::UnexpectedStatus { .. } => "unexpected-status",
            FetchError::Body { .. } => "read-body",
            FetchError::Decompress { .. } => "decompress",
        }
    }

    /// Status code of the response, if one was received
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Resolved header names
#[derive(Debug, Clone)]
struct HeaderNames {
    etag: HeaderName,
    if_none_match: HeaderName,
    fronted_url: HeaderName,
    user_id: HeaderName,
    token: HeaderName,
}

impl TryFrom<&WireHeaders> for HeaderNames {
    type Error = anyhow::Error;

    fn try_from(headers: &WireHeaders) -> anyhow::Result<Self> {
        let parse = |name: &str| {
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name: {:?}", name))
        };

        Ok(Self {
            etag: parse(&headers.etag)?,
            if_none_match: parse(&headers.if_none_match)?,
            fronted_url: parse(&headers.fronted_url)?,
            user_id: parse(&headers.user_id)?,
            token: parse(&headers.token)?,
        })
    }
}

/// Fetches the cloud config with conditional requests
///
/// The last cache tag seen for each config URL is remembered in memory and
/// sent back on the next request, so an unchanged config costs a 304 and no
/// body. Tags are lost on restart, which just means one full download.
pub struct ConditionalFetcher {
    identity: Arc<dyn UserIdentity>,
    transport: Arc<dyn HttpTransport>,
    headers: HeaderNames,
    etags: HashMap<String, HeaderValue>,
}

impl ConditionalFetcher {
    /// Create a fetcher using the default header names
    pub fn new(identity: Arc<dyn UserIdentity>, transport: Arc<dyn HttpTransport>) -> Self {
        let headers = HeaderNames {
            etag: HeaderName::from_static("etag"),
            if_none_match: HeaderName::from_static("if-none-match"),
            fronted_url: HeaderName::from_static("x-fronted-url"),
            user_id: HeaderName::from_static("x-user-id"),
            token: HeaderName::from_static("x-pro-token"),
        };

        Self {
            identity,
            transport,
            headers,
            etags: HashMap::new(),
        }
    }

    /// Use custom header names on the wire
    pub fn with_headers(mut self, headers: &WireHeaders) -> anyhow::Result<Self> {
        self.headers = HeaderNames::try_from(headers)?;
        Ok(self)
    }

    /// Last cache tag recorded for `url`
    ///
    /// Tags are opaque and kept byte for byte, they need not be valid UTF-8.
    pub fn cached_tag(&self, url: &str) -> Option<&HeaderValue> {
        self.etags.get(url)
    }

    /// Fetch the config at `url`, naming `fronted_url` as the alternate path
    ///
    /// # Returns
    /// * `Ok(Some(bytes))` with the decompressed config on 200
    /// * `Ok(None)` if the config is unchanged (304)
    pub async fn fetch(&mut self, url: &str, fronted_url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        tracing::debug!("Fetching cloud config from {} ({})", url, fronted_url);

        let request = self.build_request(url, fronted_url)?;

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        tracing::debug!(
            "Response headers: {} {:?}",
            response.status(),
            response.headers()
        );

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                tracing::debug!("Config unchanged in cloud");
                drain(response).await;
                Ok(None)
            }
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(&self.headers.etag)
                    .cloned()
                    .unwrap_or_else(|| HeaderValue::from_static(""));
                tracing::debug!("New cache tag for {}: {:?}", url, etag);
                self.etags.insert(url.to_string(), etag);

                let bytes = decompress(url, response).await?;
                tracing::debug!("Fetched cloud config ({} bytes)", bytes.len());
                Ok(Some(bytes))
            }
            status => {
                let headers = response.headers().clone();
                drain(response).await;
                Err(FetchError::UnexpectedStatus {
                    url: url.to_string(),
                    status,
                    headers,
                })
            }
        }
    }

    fn build_request(&self, url: &str, fronted_url: &str) -> Result<Request, FetchError> {
        let token = Uuid::new_v4().to_string();
        let nocache = cache_bust(url, &token).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let mut request = Request::new(Method::GET, nocache);
        let headers = request.headers_mut();

        // Keyed on the URL without the cache buster
        if let Some(etag) = self.etags.get(url).filter(|t| !t.is_empty()) {
            tracing::debug!("Using cache tag for conditional request: {:?}", etag);
            headers.insert(self.headers.if_none_match.clone(), etag.clone());
        }

        headers.insert(ACCEPT, HeaderValue::from_static("application/x-gzip"));
        // Keep domain fronters from caching the content
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        // The fronted URL may be empty, the proxy still gets the bare token
        let fronted = cache_bust(fronted_url, &token)
            .map(String::from)
            .unwrap_or_else(|_| format!("{}?{}", fronted_url, token));
        headers.insert(
            self.headers.fronted_url.clone(),
            header_value(&self.headers.fronted_url, &fronted)?,
        );

        if let Some(id) = non_empty(self.identity.user_id()) {
            headers.insert(self.headers.user_id.clone(), header_value(&self.headers.user_id, &id)?);
        }
        if let Some(tok) = non_empty(self.identity.token()) {
            headers.insert(self.headers.token.clone(), header_value(&self.headers.token, &tok)?);
        }

        // A reused connection occasionally hits EOF on the next poll
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        Ok(request)
    }
}

/// Add a single-use query token so caches see a unique request
fn cache_bust(url: &str, token: &str) -> Result<Url, url::ParseError> {
    let mut busted = Url::parse(url)?;
    let query = match busted.query() {
        Some(query) if !query.is_empty() => format!("{}&{}", query, token),
        _ => token.to_string(),
    };
    busted.set_query(Some(&query));
    Ok(busted)
}

fn header_value(name: &HeaderName, value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value).map_err(|source| FetchError::InvalidHeader {
        name: name.clone(),
        source,
    })
}

async fn decompress(url: &str, response: Response) -> Result<Vec<u8>, FetchError> {
    let body = response.bytes().await.map_err(|source| FetchError::Body {
        url: url.to_string(),
        source,
    })?;

    let mut bytes = Vec::new();
    GzDecoder::new(body.as_ref())
        .read_to_end(&mut bytes)
        .map_err(|source| FetchError::Decompress {
            url: url.to_string(),
            source,
        })?;

    Ok(bytes)
}

/// Read the rest of the body so the connection is released
async fn drain(response: Response) {
    if let Err(e) = response.bytes().await {
        tracing::debug!("Error closing response body: {}", e);
    }
}
