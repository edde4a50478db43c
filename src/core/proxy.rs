use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::Response;
use url::Url;

use crate::core::filename::{content_disposition, download_name, extension_for_content_type, filename_from_url};
use crate::error::ApiError;
use crate::platforms::Platform;

const FORWARDED_HEADERS: [HeaderName; 6] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::LAST_MODIFIED,
    header::ETAG,
];

const EXPOSED_HEADERS: &str = "Content-Disposition, Content-Length, Content-Range, Accept-Ranges";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub target: Url,
    pub filename: Option<String>,
    pub referer: Option<String>,
    pub platform: Option<String>,
    pub disposition: Disposition,
    pub default_ext: &'static str,
}

/// Rejects anything that is not an absolute `http(s)` URL.
pub fn validate_target(raw: Option<&str>) -> Result<Url, ApiError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(ApiError::MissingUrl)?;
    let url = Url::parse(raw).map_err(|_| ApiError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ApiError::InvalidUrl),
    }
}

pub fn resolve_referer(req: &ProxyRequest) -> String {
    if let Some(referer) = req.referer.as_deref().and_then(|r| Url::parse(r).ok()) {
        if matches!(referer.scheme(), "http" | "https") {
            return referer.to_string();
        }
    }

    req.platform
        .as_deref()
        .and_then(Platform::from_name)
        .or_else(|| Platform::from_url(req.target.as_str()))
        .map(|p| p.referer().to_string())
        .unwrap_or_else(|| format!("{}/", req.target.origin().ascii_serialization()))
}

/// A client-given name forces `attachment`; otherwise the route decides.
pub fn disposition_header(req: &ProxyRequest, content_type: Option<&str>) -> String {
    let default_ext = content_type
        .and_then(extension_for_content_type)
        .unwrap_or(req.default_ext);

    let (disposition, raw_name) = match req.filename.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(name) => (Disposition::Attachment, name.to_string()),
        None => (
            req.disposition,
            filename_from_url(req.target.as_str()).unwrap_or_default(),
        ),
    };

    content_disposition(disposition.as_str(), &download_name(&raw_name, default_ext))
}

/// `302 Found` to the target; used when delivery is set to redirect.
pub fn redirect_response(target: &Url) -> Result<Response, ApiError> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, target.as_str())
        .header(header::CACHE_CONTROL, "no-store")
        .header(header::ACCESS_CONTROL_EXPOSE_HEADERS, "Content-Disposition")
        .body(Body::empty())
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub struct StreamProxy {
    client: reqwest::Client,
}

impl StreamProxy {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        // No total timeout: large downloads stream for as long as the client reads.
        let client = crate::core::http_client::apply_global_proxy(reqwest::Client::builder())
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }

    pub async fn forward(&self, req: &ProxyRequest, client_headers: &HeaderMap) -> Result<Response, ApiError> {
        let referer = resolve_referer(req);
        tracing::debug!(target_url = %req.target, referer = %referer, "proxying media");

        let mut upstream = self
            .client
            .get(req.target.as_str())
            .header(header::ACCEPT, "*/*")
            .header(header::REFERER, referer);

        for name in [header::RANGE, header::IF_RANGE] {
            if let Some(value) = client_headers.get(&name) {
                upstream = upstream.header(name, value.clone());
            }
        }

        let response = upstream
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        let status = response.status();
        if !matches!(
            status,
            StatusCode::OK | StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE
        ) {
            return Err(ApiError::Upstream(format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut builder = Response::builder().status(status);
        for name in FORWARDED_HEADERS {
            if let Some(value) = response.headers().get(&name) {
                builder = builder.header(name, value.clone());
            }
        }

        let disposition = disposition_header(req, content_type.as_deref());
        let disposition = HeaderValue::from_str(&disposition)
            .map_err(|e| ApiError::Internal(format!("bad Content-Disposition: {}", e)))?;

        builder
            .header(header::CONTENT_DISPOSITION, disposition)
            .header(header::CACHE_CONTROL, "no-store")
            .header(header::ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSED_HEADERS)
            .body(Body::from_stream(response.bytes_stream()))
            .map_err(|e| ApiError::Internal(e.to_string()))
    }
}
