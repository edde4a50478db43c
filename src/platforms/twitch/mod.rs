use std::sync::LazyLock;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::core::fallback::Chain;
use crate::core::scrape::{capture_all, dedup, meta_content, page_title};
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::{MediaFormat, MediaInfo};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

const GQL_URL: &str = "https://gql.twitch.tv/gql";
const CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";
const TOKEN_HASH: &str = "36b89d2507fce29e5ca551df756d27c1cfe079e2609642b4390aa4c35796eb11";

static CLIP_CDN_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r#"(?i)(https://clips-media-assets\d*\.twitch\.tv/[^"'\s\\]+\.mp4)"#).unwrap(),
        Regex::new(r#"(?i)(https://production-assets\.clips\.twitchcdn\.net/[^"'\s\\]+\.mp4)"#).unwrap(),
    ]
});

#[derive(Deserialize)]
struct GqlMetadataResponse {
    data: GqlMetadataData,
}

#[derive(Deserialize)]
struct GqlMetadataData {
    clip: Option<ClipData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClipData {
    title: String,
    duration_seconds: f64,
    #[serde(rename = "medium")]
    thumbnail_url: Option<String>,
    video_qualities: Option<Vec<TwitchVideoQuality>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwitchVideoQuality {
    quality: String,
    #[serde(rename = "sourceURL")]
    source_url: String,
}

#[derive(Deserialize)]
struct GqlTokenResponse {
    data: GqlTokenData,
}

#[derive(Deserialize)]
struct GqlTokenData {
    clip: Option<TokenClipData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenClipData {
    playback_access_token: Option<PlaybackAccessToken>,
}

#[derive(Deserialize)]
struct PlaybackAccessToken {
    signature: String,
    value: String,
}

pub struct TwitchExtractor {
    client: reqwest::Client,
    ytdlp: YtdlpOptions,
}

impl TwitchExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: crate::core::http_client::browser_client(
                &settings.extraction.user_agent,
                Duration::from_secs(settings.extraction.request_timeout_secs),
            ),
            ytdlp: YtdlpOptions::from_settings(&settings.extraction).referer(Platform::Twitch.referer()),
        }
    }

    /// `clips.twitch.tv/<slug>` or `twitch.tv/<channel>/clip/<slug>`.
    fn extract_clip_slug(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();

        if host == "clips.twitch.tv" || host.ends_with(".clips.twitch.tv") {
            return segments.first().map(|s| s.to_string());
        }

        if segments.len() >= 3 && segments.get(1) == Some(&"clip") {
            return segments.get(2).map(|s| s.to_string());
        }

        None
    }

    async fn fetch_clip_metadata(&self, slug: &str) -> anyhow::Result<ClipData> {
        let query = format!(
            r#"{{ clip(slug: "{}") {{ durationSeconds medium: thumbnailURL(width: 480, height: 272) title videoQualities {{ quality sourceURL }} }} }}"#,
            slug
        );

        let response = self
            .client
            .post(GQL_URL)
            .header("client-id", CLIENT_ID)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Twitch GQL returned HTTP {}", response.status()));
        }

        let gql: GqlMetadataResponse = response.json().await?;
        gql.data.clip.ok_or_else(|| anyhow!("clip not found: {}", slug))
    }

    async fn fetch_access_token(&self, slug: &str) -> anyhow::Result<PlaybackAccessToken> {
        let body = serde_json::json!([{
            "operationName": "VideoAccessToken_Clip",
            "variables": { "slug": slug },
            "extensions": {
                "persistedQuery": {
                    "version": 1,
                    "sha256Hash": TOKEN_HASH
                }
            }
        }]);

        let response = self
            .client
            .post(GQL_URL)
            .header("client-id", CLIENT_ID)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Twitch GQL token returned HTTP {}", response.status()));
        }

        let gql: Vec<GqlTokenResponse> = response.json().await?;

        gql.into_iter()
            .next()
            .and_then(|r| r.data.clip)
            .and_then(|c| c.playback_access_token)
            .ok_or_else(|| anyhow!("no playback token for clip {}", slug))
    }

    fn build_authenticated_url(source_url: &str, token: &PlaybackAccessToken) -> String {
        format!(
            "{}?sig={}&token={}",
            source_url,
            urlencoding::encode(&token.signature),
            urlencoding::encode(&token.value),
        )
    }

    fn media_from_clip(clip: ClipData, token: &PlaybackAccessToken) -> anyhow::Result<MediaInfo> {
        let mut qualities = clip.video_qualities.unwrap_or_default();
        if qualities.is_empty() {
            return Err(anyhow!("clip has no video qualities"));
        }
        qualities.sort_by_key(|q| std::cmp::Reverse(q.quality.parse::<u32>().unwrap_or(0)));

        let formats = qualities
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let height = q.quality.parse::<u32>().ok();
                let label = height.map(|h| format!("{}p", h)).unwrap_or_else(|| q.quality.clone());
                let mut f = MediaFormat::from_url(
                    Self::build_authenticated_url(&q.source_url, token),
                    i.to_string(),
                    &label,
                );
                f.height = height;
                f
            })
            .collect();

        let title = Some(clip.title.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| Platform::Twitch.default_title());

        Ok(MediaInfo::new(Platform::Twitch.name(), title)
            .with_formats(formats)
            .with_thumbnail(clip.thumbnail_url)
            .with_duration(Some(clip.duration_seconds)))
    }

    async fn try_clip_gql(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let slug = Self::extract_clip_slug(url).ok_or_else(|| anyhow!("not a clip URL"))?;
        let clip = self.fetch_clip_metadata(&slug).await?;
        let token = self.fetch_access_token(&slug).await?;
        Self::media_from_clip(clip, &token)
    }

    fn media_from_html(html: &str) -> anyhow::Result<MediaInfo> {
        let clips = dedup(CLIP_CDN_PATTERNS.iter().flat_map(|re| capture_all(re, html)));
        if clips.is_empty() {
            return Err(anyhow!("no clip media found"));
        }

        let formats = clips
            .into_iter()
            .enumerate()
            .map(|(i, u)| MediaFormat::from_url(u, i.to_string(), if i == 0 { "Best" } else { "Alt" }))
            .collect();

        let title = page_title(html).unwrap_or_else(|| Platform::Twitch.default_title());

        Ok(MediaInfo::new(Platform::Twitch.name(), title)
            .with_formats(formats)
            .with_thumbnail(meta_content(html, "og:image")))
    }

    async fn try_html(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let response = self
            .client
            .get(url)
            .header("Referer", Platform::Twitch.referer())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Twitch page returned HTTP {}", response.status()));
        }

        let html = response.text().await?;
        Self::media_from_html(&html)
    }
}

#[async_trait]
impl MediaExtractor for TwitchExtractor {
    fn name(&self) -> &str {
        "twitch"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::Twitch)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let mut chain = Chain::new(self.name());
        if Self::extract_clip_slug(url).is_some() {
            chain = chain.then("gql", self.try_clip_gql(url));
        }

        chain
            .then("html", self.try_html(url))
            .then(
                "ytdlp",
                ytdlp::extract(
                    url,
                    &self.ytdlp,
                    Platform::Twitch.name(),
                    "Twitch Media",
                    Selection::AnyWithUrl,
                ),
            )
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::MediaType;

    #[test]
    fn clip_slugs() {
        assert_eq!(
            TwitchExtractor::extract_clip_slug("https://clips.twitch.tv/FunnyClipSlug").as_deref(),
            Some("FunnyClipSlug")
        );
        assert_eq!(
            TwitchExtractor::extract_clip_slug("https://www.twitch.tv/streamer/clip/OtherSlug-abc?t=1").as_deref(),
            Some("OtherSlug-abc")
        );
        assert!(TwitchExtractor::extract_clip_slug("https://www.twitch.tv/videos/123456").is_none());
        assert!(TwitchExtractor::extract_clip_slug("https://www.twitch.tv/streamer").is_none());
    }

    #[test]
    fn signed_clip_urls_sorted_by_height() {
        let clip: ClipData = serde_json::from_value(serde_json::json!({
            "title": "  Big play ",
            "durationSeconds": 28.5,
            "medium": "https://clips-media-assets2.twitch.tv/thumb-480x272.jpg",
            "videoQualities": [
                { "quality": "360", "sourceURL": "https://production.assets.clips.twitchcdn.net/360.mp4" },
                { "quality": "1080", "sourceURL": "https://production.assets.clips.twitchcdn.net/1080.mp4" }
            ]
        }))
        .unwrap();
        let token = PlaybackAccessToken {
            signature: "abc".into(),
            value: r#"{"a":1}"#.into(),
        };

        let info = TwitchExtractor::media_from_clip(clip, &token).unwrap();
        assert_eq!(info.title, "Big play");
        assert_eq!(info.duration_seconds, Some(28.5));
        assert_eq!(info.formats[0].quality, "1080p");
        assert_eq!(
            info.formats[0].url,
            "https://production.assets.clips.twitchcdn.net/1080.mp4?sig=abc&token=%7B%22a%22%3A1%7D"
        );
        assert_eq!(info.direct_url.as_deref(), Some(info.formats[0].url.as_str()));
        assert_eq!(info.media_type, MediaType::Video);
    }

    #[test]
    fn html_scan_finds_clip_assets() {
        let html = r#"<html><head><title>Clip - Twitch</title></head><body>
            "https://clips-media-assets2.twitch.tv/AT-cm%7C123.mp4"
            "https://production-assets.clips.twitchcdn.net/v1/abc.mp4"
            "https://clips-media-assets2.twitch.tv/AT-cm%7C123.mp4"
            </body></html>"#;

        let info = TwitchExtractor::media_from_html(html).unwrap();
        assert_eq!(info.title, "Clip - Twitch");
        assert_eq!(info.formats.len(), 2);
        assert_eq!(info.formats[0].quality, "Best");
        assert_eq!(info.formats[1].quality, "Alt");
    }

    #[test]
    fn html_without_assets_fails() {
        assert!(TwitchExtractor::media_from_html("<html><title>Twitch</title></html>").is_err());
    }
}
