use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::models::media::MediaFormat;

static PLAYABLE_EXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(mp4|m4v|mov|webm|m3u8|mpd|mp3|m4a|aac|ogg|wav|jpe?g|png|gif|webp)(\?|#|$)")
        .unwrap()
});

const STREAMING_TYPES: &[&str] = &[
    "application/dash+xml",
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
];

pub fn looks_playable_by_extension(url: &str) -> bool {
    PLAYABLE_EXT_RE.is_match(url)
}

/// `video/*`, `audio/*`, `image/*` or an HLS/DASH manifest type.
pub fn is_media_type(content_type: &str) -> bool {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    ct.starts_with("video/")
        || ct.starts_with("audio/")
        || ct.starts_with("image/")
        || STREAMING_TYPES.contains(&ct.as_str())
}

/// Narrows extractor output to formats a client can actually open.
pub struct PlayableFilter {
    strict: bool,
    client: reqwest::Client,
}

impl PlayableFilter {
    pub fn new(strict: bool, user_agent: &str) -> anyhow::Result<Self> {
        let client = crate::core::http_client::apply_global_proxy(reqwest::Client::builder())
            .user_agent(user_agent)
            .timeout(Duration::from_secs(12))
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()?;

        Ok(Self { strict, client })
    }

    pub async fn filter(&self, formats: Vec<MediaFormat>) -> Vec<MediaFormat> {
        let checks = formats.iter().map(|f| self.is_playable(f));
        let verdicts = futures::future::join_all(checks).await;

        formats
            .into_iter()
            .zip(verdicts)
            .filter_map(|(f, ok)| ok.then_some(f))
            .collect()
    }

    async fn is_playable(&self, format: &MediaFormat) -> bool {
        if format.url.is_empty() {
            return false;
        }
        if looks_playable_by_extension(&format.url) {
            return true;
        }
        if !self.strict {
            return is_media_type(&format.mime_type);
        }
        self.head_playable(&format.url).await
    }

    async fn head_playable(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => {
                let status = response.status();
                if !(status.is_success() || status.is_redirection()) {
                    return false;
                }
                response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(is_media_type)
            }
            Err(e) => {
                tracing::debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(url: &str, mime: &str) -> MediaFormat {
        let mut f = MediaFormat::from_url(url, "0", "HD");
        f.mime_type = mime.to_string();
        f
    }

    #[test]
    fn extension_check_matches_query_and_fragment() {
        assert!(looks_playable_by_extension("https://a/v.mp4"));
        assert!(looks_playable_by_extension("https://a/v.MP4?sig=1"));
        assert!(looks_playable_by_extension("https://a/master.m3u8#t"));
        assert!(looks_playable_by_extension("https://i.pinimg.com/originals/a.jpeg"));
        assert!(!looks_playable_by_extension("https://a/videoplayback?id=1"));
        assert!(!looks_playable_by_extension("https://a/v.mp4x"));
    }

    #[test]
    fn media_types() {
        assert!(is_media_type("video/mp4"));
        assert!(is_media_type("Audio/MPEG; charset=binary"));
        assert!(is_media_type("application/x-mpegURL"));
        assert!(!is_media_type("text/html"));
        assert!(!is_media_type(""));
    }

    #[tokio::test]
    async fn lenient_filter_accepts_media_mime_and_keeps_order() {
        let filter = PlayableFilter::new(false, "test").unwrap();
        let formats = vec![
            format("https://rr1.googlevideo.com/videoplayback?itag=18", "video/mp4"),
            format("https://a/page", "text/html"),
            format("https://a/v.webm", "text/html"),
            format("", "video/mp4"),
        ];
        let kept = filter.filter(formats).await;
        let urls: Vec<&str> = kept.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(urls, vec!["https://rr1.googlevideo.com/videoplayback?itag=18", "https://a/v.webm"]);
    }

    #[tokio::test]
    async fn strict_filter_drops_unverifiable_urls() {
        let filter = PlayableFilter::new(true, "test").unwrap();
        let formats = vec![
            format("https://a/v.mp4", "video/mp4"),
            format("http://127.0.0.1:9/stream", "video/mp4"),
        ];
        let kept = filter.filter(formats).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://a/v.mp4");
    }

    async fn spawn_upstream() -> String {
        use axum::extract::Path;
        use axum::http::header;
        use axum::response::{IntoResponse, Redirect};
        use axum::routing::get;
        use axum::Router;

        async fn hop(Path(n): Path<u32>) -> Redirect {
            if n == 0 {
                Redirect::temporary("/stream")
            } else {
                Redirect::temporary(&format!("/hop/{}", n - 1))
            }
        }

        let app = Router::new()
            .route("/stream", get(|| async { ([(header::CONTENT_TYPE, "video/mp4")], "").into_response() }))
            .route(
                "/live",
                get(|| async { ([(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")], "").into_response() }),
            )
            .route("/page", get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>").into_response() }))
            .route("/hop/{n}", get(hop));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn strict_filter_checks_head_content_type() {
        let base = spawn_upstream().await;
        let filter = PlayableFilter::new(true, "test").unwrap();
        let formats = vec![
            format(&format!("{}/stream", base), "video/mp4"),
            format(&format!("{}/page", base), "video/mp4"),
            format(&format!("{}/live", base), "application/x-mpegURL"),
        ];

        let kept = filter.filter(formats).await;
        let urls: Vec<String> = kept.into_iter().map(|f| f.url).collect();
        assert_eq!(urls, vec![format!("{}/stream", base), format!("{}/live", base)]);
    }

    #[tokio::test]
    async fn strict_filter_follows_short_redirect_chains_only() {
        let base = spawn_upstream().await;
        let filter = PlayableFilter::new(true, "test").unwrap();

        let near = format(&format!("{}/hop/0", base), "video/mp4");
        let far = format(&format!("{}/hop/6", base), "video/mp4");
        let kept = filter.filter(vec![near, far]).await;

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, format!("{}/hop/0", base));
    }
}
