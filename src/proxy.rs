//! Upstream forwarding
//!
//! [`UpstreamProxy`] relays a request to a fixed upstream base URL with reqwest and
//! turns the reply back into an axum response. It is the downstream both gates sit
//! in front of when the gateway binary runs.

use crate::{Result, X402Error};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Connection-scoped headers that must not be relayed
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_headers(headers: &HeaderMap, extra: &[&str]) -> HeaderMap {
    let mut kept = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lowered = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lowered) || extra.contains(&lowered) {
            continue;
        }
        kept.append(name.clone(), value.clone());
    }
    kept
}

/// Relays requests to one upstream server
#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: reqwest::Client,
    base: Url,
    max_body_bytes: usize,
}

impl UpstreamProxy {
    pub fn new(base: &str, max_body_bytes: usize) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| X402Error::config(format!("invalid upstream URL {base}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| X402Error::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base,
            max_body_bytes,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Upstream URL for a request path and query
    pub fn target(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.base.as_str().trim_end_matches('/'),
            path_and_query
        )
    }

    /// Send `request` upstream and buffer the reply
    pub async fn forward(&self, request: Request) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| X402Error::request_body(e.to_string()))?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let target = self.target(path_and_query);

        let mut upstream = self
            .client
            .request(parts.method.clone(), &target)
            .headers(strip_headers(&parts.headers, &["host", "content-length"]))
            .body(body)
            .send()
            .await
            .map_err(|e| X402Error::upstream_transport(format!("{target}: {e}")))?;

        if let Some(length) = upstream.content_length() {
            if length > self.max_body_bytes as u64 {
                return Err(X402Error::upstream_transport(format!(
                    "upstream response too large: {length} bytes"
                )));
            }
        }

        let status = upstream.status();
        let headers = strip_headers(upstream.headers(), &[]);
        let mut buffer = Vec::new();
        while let Some(chunk) = upstream
            .chunk()
            .await
            .map_err(|e| X402Error::upstream_transport(format!("{target}: {e}")))?
        {
            if buffer.len() + chunk.len() > self.max_body_bytes {
                return Err(X402Error::upstream_transport(format!(
                    "upstream response exceeds {} bytes",
                    self.max_body_bytes
                )));
            }
            buffer.extend_from_slice(&chunk);
        }

        let mut response = Response::new(Body::from(buffer));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Fallback handler forwarding every request through the shared proxy
pub async fn proxy_handler(State(proxy): State<Arc<UpstreamProxy>>, request: Request) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    match proxy.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(%method, %uri, error = %e, "Upstream request failed");
            e.into_response()
        }
    }
}

/// True for headers [`UpstreamProxy`] never relays
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}
