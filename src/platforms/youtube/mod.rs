use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use crate::core::fallback::Chain;
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::{quality_to_number, MediaFormat, MediaInfo, MediaType};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

const VIDFLY_URL: &str = "https://api.vidfly.ai/api/media/youtube/download";

pub struct YouTubeExtractor {
    client: reqwest::Client,
    ytdlp: YtdlpOptions,
}

impl YouTubeExtractor {
    pub fn new(settings: &Settings) -> Self {
        let client = crate::core::http_client::apply_global_proxy(reqwest::Client::builder())
            .user_agent(&settings.extraction.user_agent)
            .timeout(Duration::from_secs(25))
            .build()
            .unwrap_or_default();

        Self {
            client,
            ytdlp: YtdlpOptions::from_settings(&settings.extraction).referer(Platform::YouTube.referer()),
        }
    }

    fn extract_video_id(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();

        if host.contains("youtu.be") {
            return segments.first().map(|s| s.to_string());
        }

        if host.contains("youtube.com") || host.contains("youtube-nocookie.com") {
            if matches!(segments.first(), Some(&"shorts") | Some(&"embed") | Some(&"live")) {
                return segments.get(1).map(|s| s.to_string());
            }

            return parsed
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.to_string());
        }

        None
    }

    /// Shorts, embeds and `youtu.be` links become a plain watch URL.
    fn canonical_url(url: &str) -> String {
        match Self::extract_video_id(url) {
            Some(id) if !id.is_empty() => format!("https://www.youtube.com/watch?v={}", id),
            _ => url.to_string(),
        }
    }

    async fn fetch_vidfly(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let response = self
            .client
            .get(VIDFLY_URL)
            .query(&[("url", url)])
            .header("accept", "*/*")
            .header("content-type", "application/json")
            .header("x-app-name", "vidfly-web")
            .header("x-app-version", "1.0.0")
            .header("Referer", "https://vidfly.ai/")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Vidfly returned HTTP {}", response.status()));
        }

        let json: Value = response.json().await?;
        Self::parse_vidfly(&json)
    }

    fn parse_vidfly(json: &Value) -> anyhow::Result<MediaInfo> {
        let data = json
            .get("data")
            .ok_or_else(|| anyhow!("Vidfly response has no data"))?;
        let items = data
            .get("items")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("Vidfly response has no items"))?;
        let title = data
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("Vidfly response has no title"))?;

        let mut best: Option<(u32, usize)> = None;
        let mut formats = Vec::new();

        for item in items.iter().filter(|it| it.get("url").and_then(|u| u.as_str()).is_some_and(|u| !u.is_empty())) {
            let kind = item.get("type").and_then(|v| v.as_str()).unwrap_or("");
            let audio_only = kind == "audio" || kind == "audio-only";
            let video_only = kind == "video-only";
            let quality = item
                .get("label")
                .or_else(|| item.get("quality"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            let ext = item
                .get("ext")
                .or_else(|| item.get("extension"))
                .and_then(|v| v.as_str())
                .unwrap_or("mp4");

            let index = formats.len();
            if kind == "video" {
                let rank = quality_to_number(quality);
                if best.map_or(true, |(r, _)| rank > r) {
                    best = Some((rank, index));
                }
            }

            let mut f = MediaFormat::from_url(
                item.get("url").and_then(|u| u.as_str()).unwrap_or_default(),
                index.to_string(),
                quality,
            );
            f.mime_type = format!("{}/{}", if audio_only { "audio" } else { "video" }, ext);
            f.container = ext.to_string();
            f.has_audio = !video_only;
            f.has_video = !audio_only;
            f.audio_bitrate = audio_only.then_some(128.0);
            f.video_codec = Some(if audio_only { "none" } else { "h264" }.to_string());
            f.audio_codec = Some(if video_only { "none" } else { "aac" }.to_string());
            formats.push(f);
        }

        if formats.is_empty() {
            return Err(anyhow!("Vidfly returned no downloadable items"));
        }

        let best_url = formats[best.map(|(_, i)| i).unwrap_or(0)].url.clone();

        let mut info = MediaInfo::new(Platform::YouTube.name(), title)
            .with_formats(formats)
            .with_thumbnail(data.get("cover").and_then(|v| v.as_str()).map(String::from))
            .with_duration(data.get("duration").and_then(|v| v.as_f64()));
        info.direct_url = Some(best_url);
        info.media_type = MediaType::Video;
        Ok(info)
    }
}

#[async_trait]
impl MediaExtractor for YouTubeExtractor {
    fn name(&self) -> &str {
        "youtube"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::YouTube)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let url = Self::canonical_url(url);

        Chain::new(self.name())
            .then("vidfly", self.fetch_vidfly(&url))
            .then(
                "ytdlp",
                ytdlp::extract(
                    &url,
                    &self.ytdlp,
                    Platform::YouTube.name(),
                    "YouTube Video",
                    Selection::ProgressiveFirst,
                ),
            )
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn video_ids() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=1", "dQw4w9WgXcQ"),
            ("https://youtu.be/dQw4w9WgXcQ?si=x", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/shorts/abc123", "abc123"),
            ("https://www.youtube.com/embed/xyz", "xyz"),
            ("https://music.youtube.com/watch?v=m1", "m1"),
        ];
        for (url, id) in cases {
            assert_eq!(YouTubeExtractor::extract_video_id(url).as_deref(), Some(id), "{}", url);
        }
        assert!(YouTubeExtractor::extract_video_id("https://www.youtube.com/@channel").is_none());
    }

    #[test]
    fn canonicalizes_shorts() {
        assert_eq!(
            YouTubeExtractor::canonical_url("https://www.youtube.com/shorts/abc123"),
            "https://www.youtube.com/watch?v=abc123"
        );
        assert_eq!(
            YouTubeExtractor::canonical_url("https://www.youtube.com/@channel"),
            "https://www.youtube.com/@channel"
        );
    }

    #[test]
    fn vidfly_best_is_highest_muxed_video() {
        let json = json!({ "data": {
            "title": "Song",
            "cover": "https://i.ytimg.com/vi/x/hq.jpg",
            "duration": 212,
            "items": [
                { "type": "video-only", "label": "1080p", "ext": "mp4", "url": "https://rr1.googlevideo.com/1080" },
                { "type": "video", "label": "360p", "ext": "mp4", "url": "https://rr1.googlevideo.com/360" },
                { "type": "video", "quality": "720p", "ext": "mp4", "url": "https://rr1.googlevideo.com/720" },
                { "type": "audio", "label": "128kbps", "extension": "m4a", "url": "https://rr1.googlevideo.com/a" },
                { "type": "video", "label": "144p", "url": "" }
            ]
        }});

        let info = YouTubeExtractor::parse_vidfly(&json).unwrap();
        assert_eq!(info.title, "Song");
        assert_eq!(info.formats.len(), 4);
        assert_eq!(info.direct_url.as_deref(), Some("https://rr1.googlevideo.com/720"));
        assert_eq!(info.duration_seconds, Some(212.0));
        assert_eq!(info.media_type, MediaType::Video);

        let video_only = &info.formats[0];
        assert!(!video_only.has_audio && video_only.has_video);
        let audio = &info.formats[3];
        assert_eq!(audio.mime_type, "audio/m4a");
        assert!(audio.has_audio && !audio.has_video);
        assert_eq!(audio.itag, "3");
    }

    #[test]
    fn vidfly_without_title_fails() {
        let json = json!({ "data": { "items": [] } });
        assert!(YouTubeExtractor::parse_vidfly(&json).is_err());
    }
}
