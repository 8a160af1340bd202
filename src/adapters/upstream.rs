use crate::config::UpstreamConfig;
use crate::error::AppError;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, header};
use axum::response::Response;

/// Headers scoped to a single connection; never forwarded in either direction.
const HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forwards gated requests to the page renderer.
#[derive(Clone, Debug)]
pub struct UpstreamProxy {
    http: reqwest::Client,
    base_url: String,
    max_body_bytes: usize,
}

impl UpstreamProxy {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &UpstreamConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build()?;
        Ok(Self {
            http,
            base_url: config.upstream_url.trim_end_matches('/').to_string(),
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Sends `request` upstream and relays the answer, redirects included.
    ///
    /// # Errors
    /// [`AppError::PayloadTooLarge`] for oversized bodies, [`AppError::Upstream`] when the
    /// renderer cannot be reached.
    #[tracing::instrument(skip_all, fields(path = %request.uri().path()))]
    pub async fn forward(&self, request: Request) -> Result<Response, AppError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_bytes).await.map_err(|_| AppError::PayloadTooLarge)?;

        let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        let upstream = self
            .http
            .request(parts.method, format!("{}{path_and_query}", self.base_url))
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        let body = upstream.bytes().await.map_err(|e| AppError::Upstream(e.to_string()))?;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}
