use std::sync::LazyLock;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::core::fallback::Chain;
use crate::core::scrape::{json_after, meta_content};
use crate::core::ytdlp::YtdlpOptions;
use crate::models::media::{MediaFormat, MediaInfo, MediaType};
use crate::models::settings::Settings;
use crate::platforms::music::{self, MusicExtractor};
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

static CLIENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"client_id=([^&"'\s]+)"#).unwrap());

const HYDRATION_MARKER: &str = "window.__sc_hydration =";

/// Page metadata and the progressive transcoding found in the hydration
/// blob.
#[derive(Debug, Default)]
struct TrackPage {
    title: Option<String>,
    thumbnail: Option<String>,
    client_id: Option<String>,
    progressive_url: Option<String>,
    duration_ms: Option<f64>,
}

pub struct SoundCloudExtractor {
    client: reqwest::Client,
    ytdlp: YtdlpOptions,
}

impl SoundCloudExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: crate::core::http_client::browser_client(
                &settings.extraction.user_agent,
                Duration::from_secs(settings.extraction.request_timeout_secs),
            ),
            ytdlp: MusicExtractor::audio_options(settings),
        }
    }

    fn parse_page(html: &str) -> TrackPage {
        let mut page = TrackPage {
            title: meta_content(html, "og:title"),
            thumbnail: meta_content(html, "og:image"),
            client_id: CLIENT_ID_RE
                .captures(html)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
            ..Default::default()
        };

        let Some(Value::Array(entries)) = json_after(html, HYDRATION_MARKER) else {
            return page;
        };

        let track = entries
            .iter()
            .filter_map(|e| e.get("data"))
            .find(|d| d.pointer("/media/transcodings").is_some());

        if let Some(track) = track {
            page.progressive_url = track
                .pointer("/media/transcodings")
                .and_then(|t| t.as_array())
                .and_then(|list| {
                    list.iter().find(|t| {
                        t.pointer("/format/protocol").and_then(|p| p.as_str()) == Some("progressive")
                    })
                })
                .and_then(|t| t.get("url"))
                .and_then(|u| u.as_str())
                .map(String::from);
            page.duration_ms = track.get("duration").and_then(|d| d.as_f64());
            if page.title.is_none() {
                page.title = track.get("title").and_then(|t| t.as_str()).map(String::from);
            }
        }

        page
    }

    fn title_of(page: &TrackPage) -> String {
        page.title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| Platform::SoundCloud.default_title())
    }

    async fn fetch_page(&self, url: &str) -> anyhow::Result<TrackPage> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("SoundCloud page returned HTTP {}", response.status()));
        }
        let html = response.text().await?;
        Ok(Self::parse_page(&html))
    }

    async fn resolve_stream(&self, transcoding_url: &str, client_id: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .get(transcoding_url)
            .query(&[("client_id", client_id)])
            .header("Referer", Platform::SoundCloud.referer())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("SoundCloud stream lookup returned HTTP {}", response.status()));
        }

        let json: Value = response.json().await?;
        json.get("url")
            .and_then(|u| u.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow!("SoundCloud stream lookup returned no url"))
    }

    async fn try_hydration(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let page = self.fetch_page(url).await?;
        let transcoding = page
            .progressive_url
            .as_deref()
            .ok_or_else(|| anyhow!("no progressive transcoding in hydration data"))?;
        let client_id = page
            .client_id
            .as_deref()
            .ok_or_else(|| anyhow!("no client_id on page"))?;

        let stream = self.resolve_stream(transcoding, client_id).await?;
        Ok(Self::media_from_stream(&page, stream))
    }

    fn media_from_stream(page: &TrackPage, stream: String) -> MediaInfo {
        let mut format = MediaFormat::from_url(stream, "progressive", "128kbps").into_audio();
        format.audio_bitrate = Some(128.0);

        MediaInfo::new(Platform::SoundCloud.name(), Self::title_of(page))
            .with_formats(vec![format])
            .with_thumbnail(page.thumbnail.clone())
            .with_duration(page.duration_ms.map(|ms| ms / 1000.0))
    }

    /// Metadata plus the page itself as `embed_url`, for clients that can
    /// only show the player.
    async fn embed_only(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let page = self.fetch_page(url).await.unwrap_or_default();
        Ok(Self::embed_info(&page, url))
    }

    fn embed_info(page: &TrackPage, url: &str) -> MediaInfo {
        let mut info = MediaInfo::new(Platform::SoundCloud.name(), Self::title_of(page))
            .with_thumbnail(page.thumbnail.clone());
        info.embed_url = Some(url.to_string());
        info.media_type = MediaType::Audio;
        info
    }
}

#[async_trait]
impl MediaExtractor for SoundCloudExtractor {
    fn name(&self) -> &str {
        "soundcloud"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::SoundCloud)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        Chain::new(self.name())
            .then("hydration", self.try_hydration(url))
            .then("ytdlp", music::extract_audio(url, &self.ytdlp, Platform::SoundCloud))
            .then("embed", self.embed_only(url))
            .run()
            .await
    }
}
