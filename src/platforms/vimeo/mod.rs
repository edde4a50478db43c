use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use crate::core::fallback::Chain;
use crate::core::scrape::{json_after, meta_content, page_title};
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::{MediaFormat, MediaInfo};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

const PLAYER_CONFIG_URL: &str = "https://player.vimeo.com/video";
const INLINE_CONFIG_MARKERS: &[&str] = &["window.playerConfig =", "var config ="];

pub struct VimeoExtractor {
    client: reqwest::Client,
    ytdlp: YtdlpOptions,
}

impl VimeoExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: crate::core::http_client::browser_client(
                &settings.extraction.user_agent,
                Duration::from_secs(settings.extraction.request_timeout_secs),
            ),
            ytdlp: YtdlpOptions::from_settings(&settings.extraction).referer(Platform::Vimeo.referer()),
        }
    }

    /// Numeric id plus the unlisted hash, from `vimeo.com/<id>[/<hash>]`,
    /// `player.vimeo.com/video/<id>?h=<hash>` or channel/group paths.
    fn extract_video_id_and_hash(url: &str) -> Option<(String, Option<String>)> {
        let parsed = url::Url::parse(url).ok()?;
        let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();
        let is_numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

        let query_hash = parsed
            .query_pairs()
            .find(|(k, _)| k == "h")
            .map(|(_, v)| v.to_string());

        let position = segments.iter().rposition(|s| is_numeric(s))?;
        let id = segments[position].to_string();

        let path_hash = segments
            .get(position + 1)
            .filter(|s| s.chars().all(|c| c.is_ascii_alphanumeric()) && !is_numeric(s))
            .map(|s| s.to_string());

        Some((id, query_hash.or(path_hash)))
    }

    fn config_url(id: &str, hash: Option<&str>) -> String {
        match hash {
            Some(h) => format!("{}/{}/config?h={}", PLAYER_CONFIG_URL, id, h),
            None => format!("{}/{}/config", PLAYER_CONFIG_URL, id),
        }
    }

    /// Progressive files sorted by height, tallest first, then the default
    /// HLS CDN as one extra format.
    fn formats_from_config(config: &Value) -> Vec<MediaFormat> {
        let progressive = config
            .pointer("/request/files/progressive")
            .or_else(|| config.pointer("/video/play/progressive"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut files: Vec<(u32, &str, Option<&str>)> = progressive
            .iter()
            .filter_map(|f| {
                let url = f.get("url").and_then(|v| v.as_str()).filter(|u| !u.is_empty())?;
                let height = f.get("height").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                let label = f.get("quality").and_then(|v| v.as_str());
                Some((height, url, label))
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0));

        let mut formats: Vec<MediaFormat> = files
            .into_iter()
            .enumerate()
            .map(|(i, (height, url, label))| {
                let quality = match (height, label) {
                    (h, _) if h > 0 => format!("{}p", h),
                    (_, Some(l)) => l.to_string(),
                    _ => "Original".to_string(),
                };
                let mut f = MediaFormat::from_url(url, i.to_string(), &quality);
                f.height = (height > 0).then_some(height);
                f
            })
            .collect();

        if let Some(hls) = Self::hls_url(config) {
            let mut f = MediaFormat::from_url(hls, "hls", "Adaptive");
            f.mime_type = "application/x-mpegURL".into();
            f.container = "hls".into();
            f.has_audio = true;
            f.has_video = true;
            formats.push(f);
        }

        formats
    }

    fn hls_url(config: &Value) -> Option<String> {
        let hls = config.pointer("/request/files/hls")?;
        let cdns = hls.get("cdns")?.as_object()?;
        let default_cdn = hls.get("default_cdn").and_then(|v| v.as_str());

        default_cdn
            .and_then(|name| cdns.get(name))
            .or_else(|| cdns.values().next())
            .and_then(|cdn| cdn.get("url"))
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    fn media_from_config(config: &Value, page_title: Option<String>, page_thumb: Option<String>) -> anyhow::Result<MediaInfo> {
        let formats = Self::formats_from_config(config);
        if formats.is_empty() {
            return Err(anyhow!("Vimeo config has no playable files"));
        }

        let video = config.get("video");
        let title = video
            .and_then(|v| v.get("title"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .or(page_title)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| Platform::Vimeo.default_title());

        let thumbnail = video
            .and_then(|v| v.get("thumbs"))
            .and_then(|t| t.get("base").or_else(|| t.get("640")))
            .and_then(|v| v.as_str())
            .map(String::from)
            .or(page_thumb);

        Ok(MediaInfo::new(Platform::Vimeo.name(), title)
            .with_formats(formats)
            .with_thumbnail(thumbnail)
            .with_duration(video.and_then(|v| v.get("duration")).and_then(|v| v.as_f64())))
    }

    async fn fetch_json(&self, url: &str) -> anyhow::Result<Value> {
        let response = self
            .client
            .get(url)
            .header("Referer", Platform::Vimeo.referer())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Vimeo config returned HTTP {}", response.status()));
        }

        response.json().await.map_err(Into::into)
    }

    async fn try_player_config(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let (id, hash) = Self::extract_video_id_and_hash(url)
            .ok_or_else(|| anyhow!("could not find a Vimeo video id in {}", url))?;

        let config = self.fetch_json(&Self::config_url(&id, hash.as_deref())).await?;
        Self::media_from_config(&config, None, None)
    }

    fn media_from_page(html: &str) -> anyhow::Result<MediaInfo> {
        let config = INLINE_CONFIG_MARKERS
            .iter()
            .find_map(|marker| json_after(html, marker))
            .ok_or_else(|| anyhow!("no inline player config"))?;

        Self::media_from_config(&config, page_title(html), meta_content(html, "og:image"))
    }

    async fn try_page(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let response = self
            .client
            .get(url)
            .header("Referer", Platform::Vimeo.referer())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Vimeo page returned HTTP {}", response.status()));
        }

        let html = response.text().await?;
        Self::media_from_page(&html)
    }
}

#[async_trait]
impl MediaExtractor for VimeoExtractor {
    fn name(&self) -> &str {
        "vimeo"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::Vimeo)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        Chain::new(self.name())
            .then("config", self.try_player_config(url))
            .then("page", self.try_page(url))
            .then(
                "ytdlp",
                ytdlp::extract(
                    url,
                    &self.ytdlp,
                    Platform::Vimeo.name(),
                    "Vimeo Video",
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
    fn ids_and_hashes() {
        let cases = [
            ("https://vimeo.com/123456", ("123456", None)),
            ("https://vimeo.com/123456/abcdef12", ("123456", Some("abcdef12"))),
            ("https://player.vimeo.com/video/987?h=ff00", ("987", Some("ff00"))),
            ("https://vimeo.com/channels/staffpicks/555", ("555", None)),
        ];
        for (url, (id, hash)) in cases {
            let (got_id, got_hash) = VimeoExtractor::extract_video_id_and_hash(url).unwrap();
            assert_eq!(got_id, id, "{}", url);
            assert_eq!(got_hash.as_deref(), hash, "{}", url);
        }
        assert!(VimeoExtractor::extract_video_id_and_hash("https://vimeo.com/channels/staffpicks").is_none());
    }

    #[test]
    fn config_urls() {
        assert_eq!(
            VimeoExtractor::config_url("1", Some("ab")),
            "https://player.vimeo.com/video/1/config?h=ab"
        );
        assert_eq!(VimeoExtractor::config_url("1", None), "https://player.vimeo.com/video/1/config");
    }

    fn config() -> Value {
        json!({
            "request": { "files": {
                "progressive": [
                    { "url": "https://vod-progressive.akamaized.net/360.mp4", "height": 360, "quality": "360p" },
                    { "url": "https://vod-progressive.akamaized.net/1080.mp4", "height": 1080, "quality": "1080p" },
                    { "url": "https://vod-progressive.akamaized.net/720.mp4", "height": 720, "quality": "720p" }
                ],
                "hls": {
                    "default_cdn": "akfire_interconnect_quic",
                    "cdns": {
                        "fastly_skyfire": { "url": "https://skyfire.vimeocdn.com/master.m3u8" },
                        "akfire_interconnect_quic": { "url": "https://vod-adaptive.akamaized.net/master.m3u8" }
                    }
                }
            }},
            "video": {
                "title": "Short film",
                "duration": 95,
                "thumbs": { "640": "https://i.vimeocdn.com/video/1_640.jpg", "base": "https://i.vimeocdn.com/video/1" }
            }
        })
    }

    #[test]
    fn progressive_sorted_and_hls_appended() {
        let info = VimeoExtractor::media_from_config(&config(), None, None).unwrap();
        let qualities: Vec<&str> = info.formats.iter().map(|f| f.quality.as_str()).collect();
        assert_eq!(qualities, ["1080p", "720p", "360p", "Adaptive"]);
        assert_eq!(info.formats[3].url, "https://vod-adaptive.akamaized.net/master.m3u8");
        assert_eq!(info.formats[3].container, "hls");
        assert_eq!(info.direct_url.as_deref(), Some("https://vod-progressive.akamaized.net/1080.mp4"));
        assert_eq!(info.title, "Short film");
        assert_eq!(info.duration_seconds, Some(95.0));
        assert_eq!(info.thumbnail.as_deref(), Some("https://i.vimeocdn.com/video/1"));
    }

    #[test]
    fn inline_page_config() {
        let html = r#"<html><head><title>Page title</title>
            <meta property="og:image" content="https://i.vimeocdn.com/og.jpg"></head>
            <script>var config = {"video":{"play":{"progressive":[{"url":"https://cdn.vimeo.test/a.mp4","height":540}]}}}; if (!config.request) {}</script>
            </html>"#;

        let info = VimeoExtractor::media_from_page(html).unwrap();
        assert_eq!(info.title, "Page title");
        assert_eq!(info.thumbnail.as_deref(), Some("https://i.vimeocdn.com/og.jpg"));
        assert_eq!(info.formats.len(), 1);
        assert_eq!(info.formats[0].height, Some(540));
    }

    #[test]
    fn empty_config_fails() {
        assert!(VimeoExtractor::media_from_config(&json!({}), None, None).is_err());
        assert!(VimeoExtractor::media_from_page("<html></html>").is_err());
    }
}
