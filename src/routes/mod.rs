//! Axum router construction.
//!
//! [`build`] merges the health, media-info and proxy routes and wraps them
//! in a request-tracing layer that tags every request with a uuid.

mod direct;
mod health;
mod info;
pub mod state;

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use state::AppState;

pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(info::router())
        .merge(direct::router())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    request_id = %Uuid::new_v4(),
                    method = %req.method(),
                    path = %req.uri().path(),
                )
            }),
        )
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::core::registry::ExtractorRegistry;
    use crate::models::media::{MediaFormat, MediaInfo};
    use crate::models::settings::Settings;
    use crate::platforms::traits::MediaExtractor;

    use super::AppState;

    /// Extractor that claims one host and returns a canned result.
    pub struct Stub {
        pub name: &'static str,
        pub host: &'static str,
        pub result: fn() -> anyhow::Result<MediaInfo>,
    }

    #[async_trait]
    impl MediaExtractor for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn can_handle(&self, url: &str) -> bool {
            url.contains(self.host)
        }

        async fn extract(&self, _url: &str) -> anyhow::Result<MediaInfo> {
            (self.result)()
        }
    }

    pub fn video() -> anyhow::Result<MediaInfo> {
        Ok(MediaInfo::new("youtube", "Clip").with_formats(vec![
            MediaFormat::from_url("https://cdn.example.com/720.mp4", "0", "720p"),
            {
                let mut page = MediaFormat::from_url("https://cdn.example.com/watch", "1", "Page");
                page.mime_type = "text/html".into();
                page
            },
        ]))
    }

    pub fn unplayable() -> anyhow::Result<MediaInfo> {
        let mut f = MediaFormat::from_url("https://cdn.example.com/watch", "0", "Page");
        f.mime_type = "text/html".into();
        Ok(MediaInfo::new("tiktok", "Page").with_formats(vec![f]))
    }

    /// A stream URL with no extension: kept by the lenient filter on its
    /// mime type, dropped by the strict one because nothing answers `HEAD`.
    pub fn unverifiable() -> anyhow::Result<MediaInfo> {
        Ok(MediaInfo::new("twitch", "Stream").with_formats(vec![
            MediaFormat::from_url("http://127.0.0.1:9/stream", "0", "720p"),
        ]))
    }

    pub fn direct_only() -> anyhow::Result<MediaInfo> {
        let mut info = MediaInfo::new("facebook", "Direct");
        info.direct_url = Some("https://video.xx.fbcdn.net/v/clip.mp4".into());
        info.media_type = crate::models::media::MediaType::Video;
        Ok(info)
    }

    pub fn failing() -> anyhow::Result<MediaInfo> {
        Err(anyhow::anyhow!("HTTP 500").context("all vimeo extraction methods failed"))
    }

    pub fn state_with(settings: Settings, stubs: Vec<Stub>) -> Arc<AppState> {
        let mut registry = ExtractorRegistry::new();
        for stub in stubs {
            registry.register(Arc::new(stub));
        }
        Arc::new(AppState::new(settings, registry).unwrap())
    }

    pub async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let app = super::build(state);
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    pub async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = get(state, uri).await;
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }
}
