//! Streaming proxy routes.
//!
//! Every route validates the target, then either answers `302` (redirect
//! delivery) or streams the upstream body through [`StreamProxy`].

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use super::AppState;
use crate::core::proxy::{redirect_response, validate_target, Disposition, ProxyRequest};
use crate::error::ApiError;
use crate::models::settings::DeliveryMode;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/direct", get(get_direct))
        .route("/api/download", get(get_download))
        .route("/api/audio", get(get_audio))
        .route("/api/facebook-download", get(get_facebook_download))
        .route("/api/threads-download", get(get_threads_download))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
    pub filename: Option<String>,
    pub referer: Option<String>,
    pub platform: Option<String>,
    #[serde(rename = "originalUrl")]
    pub original_url: Option<String>,
}

struct Route {
    disposition: Disposition,
    default_ext: &'static str,
    default_platform: Option<&'static str>,
}

const DIRECT: Route = Route {
    disposition: Disposition::Inline,
    default_ext: "mp4",
    default_platform: None,
};

const DOWNLOAD: Route = Route {
    disposition: Disposition::Attachment,
    default_ext: "mp4",
    default_platform: None,
};

async fn deliver(
    state: &AppState,
    query: ProxyQuery,
    target: Option<String>,
    route: Route,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let target = validate_target(target.as_deref())?;

    if state.delivery_mode() == DeliveryMode::Redirect {
        tracing::debug!(target_url = %target, "redirecting to media");
        return redirect_response(&target);
    }

    let request = ProxyRequest {
        target,
        filename: query.filename,
        referer: query.referer,
        platform: query.platform.or_else(|| route.default_platform.map(String::from)),
        disposition: route.disposition,
        default_ext: route.default_ext,
    };
    state.proxy.forward(&request, headers).await
}

pub async fn get_direct(
    State(state): State<Arc<AppState>>,
    Query(mut query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = query.url.take();
    deliver(&state, query, target, DIRECT, &headers).await
}

pub async fn get_download(
    State(state): State<Arc<AppState>>,
    Query(mut query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = query.url.take();
    deliver(&state, query, target, DOWNLOAD, &headers).await
}

pub async fn get_audio(
    State(state): State<Arc<AppState>>,
    Query(mut query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = query.url.take();
    let route = Route {
        default_ext: "mp3",
        ..DOWNLOAD
    };
    deliver(&state, query, target, route, &headers).await
}

pub async fn get_facebook_download(
    State(state): State<Arc<AppState>>,
    Query(mut query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = query.url.take();
    let route = Route {
        default_platform: Some("facebook"),
        ..DOWNLOAD
    };
    deliver(&state, query, target, route, &headers).await
}

/// Older clients send the media URL as `originalUrl`.
pub async fn get_threads_download(
    State(state): State<Arc<AppState>>,
    Query(mut query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = query
        .url
        .take()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| query.original_url.take());
    let route = Route {
        default_platform: Some("threads"),
        ..DOWNLOAD
    };
    deliver(&state, query, target, route, &headers).await
}

#[cfg(test)]
mod tests {
    use crate::models::settings::{DeliveryMode, Settings};
    use crate::routes::test_support::{get, get_json, state_with};
    use axum::http::{header, StatusCode};

    fn redirect_settings() -> Settings {
        let mut settings = Settings::default();
        settings.delivery.mode = DeliveryMode::Redirect;
        settings
    }

    #[tokio::test]
    async fn missing_and_invalid_targets_are_400() {
        for path in ["/api/direct", "/api/download", "/api/audio", "/api/facebook-download"] {
            let (status, body) = get_json(state_with(Settings::default(), Vec::new()), path).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
            assert_eq!(body["error"], "Missing url");
        }

        let (status, body) =
            get_json(state_with(Settings::default(), Vec::new()), "/api/direct?url=file:///etc/passwd").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid url");
    }

    #[tokio::test]
    async fn redirect_delivery_answers_302() {
        let (status, headers, body) = get(
            state_with(redirect_settings(), Vec::new()),
            "/api/download?url=https%3A%2F%2Fcdn.example.com%2Fv.mp4&filename=clip",
        )
        .await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "https://cdn.example.com/v.mp4");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn threads_accepts_original_url() {
        let (status, headers, _) = get(
            state_with(redirect_settings(), Vec::new()),
            "/api/threads-download?originalUrl=https%3A%2F%2Fscontent.cdninstagram.com%2Fv.mp4",
        )
        .await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "https://scontent.cdninstagram.com/v.mp4");

        let (status, _) = get_json(state_with(redirect_settings(), Vec::new()), "/api/threads-download").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
