use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::core::fallback::Chain;
use crate::core::scrape::meta_content;
use crate::models::media::{MediaInfo, MediaType};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

const EMBED_BASE: &str = "https://open.spotify.com/embed";
const EMBED_KINDS: &[&str] = &["track", "album", "playlist", "episode", "show", "artist"];

/// Spotify streams are DRM-protected, so this only ever returns metadata
/// and an embeddable player URL.
pub struct SpotifyExtractor {
    client: reqwest::Client,
}

impl SpotifyExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: crate::core::http_client::browser_client(
                &settings.extraction.user_agent,
                Duration::from_secs(settings.extraction.request_timeout_secs),
            ),
        }
    }

    /// `open.spotify.com/[intl-xx/]<kind>/<id>` → `open.spotify.com/embed/<kind>/<id>`.
    fn embed_url(url: &str) -> String {
        let Ok(parsed) = url::Url::parse(url) else {
            return url.to_string();
        };
        let segments: Vec<&str> = parsed
            .path()
            .split('/')
            .filter(|s| !s.is_empty() && !s.starts_with("intl-"))
            .collect();

        match segments.as_slice() {
            ["embed", ..] => url.to_string(),
            [kind, id, ..] if EMBED_KINDS.contains(kind) => format!("{}/{}/{}", EMBED_BASE, kind, id),
            _ => url.to_string(),
        }
    }

    fn media_from_html(html: &str, url: &str) -> MediaInfo {
        let title = meta_content(html, "og:title").unwrap_or_else(|| Platform::Spotify.display_name().to_string());
        Self::embed_info(title, meta_content(html, "og:image"), url)
    }

    fn embed_info(title: String, thumbnail: Option<String>, url: &str) -> MediaInfo {
        let mut info = MediaInfo::new(Platform::Spotify.name(), title).with_thumbnail(thumbnail);
        info.embed_url = Some(Self::embed_url(url));
        info.media_type = MediaType::Audio;
        info
    }

    async fn try_page(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Spotify page returned HTTP {}", response.status()));
        }
        let html = response.text().await?;
        Ok(Self::media_from_html(&html, url))
    }
}

#[async_trait]
impl MediaExtractor for SpotifyExtractor {
    fn name(&self) -> &str {
        "spotify"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::Spotify)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        Chain::new(self.name())
            .then("page", self.try_page(url))
            .then("embed", async {
                anyhow::Ok(Self::embed_info(Platform::Spotify.default_title(), None, url))
            })
            .run()
            .await
    }
}
