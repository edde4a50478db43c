use std::cmp::Reverse;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::core::fallback::Chain;
use crate::core::redirect;
use crate::core::scrape::{capture_all, dedup, meta_content, page_title, script_texts, unescape_url, walk_strings};
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::{MediaFormat, MediaInfo};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

static PIN_NOT_FOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""__typename"\s*:\s*"PinNotFound""#).unwrap());

/// First capture of each pattern is a video candidate.
static VIDEO_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)"video_url":"([^"]+)""#,
        r#"(?i)"contentUrl":\s*"(https://v\d*\.pinimg\.com[^"]+)""#,
        r#"(?i)"contentUrl":\s*"([^"]+\.mp4[^"]*)""#,
        r#"(?i)"v_hd":\s*\{[^}]*"url":\s*"([^"]+)""#,
        r#"(?i)"v_sd":\s*\{[^}]*"url":\s*"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static BARE_VIDEO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)(https://v\d*\.pinimg\.com/videos/[^\s"'\\]+\.mp4)"#).unwrap());

static ORIGINAL_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(https://i\.pinimg\.com/originals/[a-z0-9/._-]+\.(?:jpg|jpeg|png|gif|webp))").unwrap()
});

static SIZED_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(https://i\.pinimg\.com/\d+x/[a-z0-9/._-]+\.(?:jpg|jpeg|png|gif|webp))").unwrap()
});

static IMAGE_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif|webp)(?:$|\?)").unwrap());

static SIZE_HINT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d+)x/").unwrap());

pub struct PinterestExtractor {
    client: reqwest::Client,
    ytdlp: YtdlpOptions,
}

impl PinterestExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: crate::core::http_client::browser_client(
                &settings.extraction.user_agent,
                Duration::from_secs(settings.extraction.request_timeout_secs),
            ),
            ytdlp: YtdlpOptions::from_settings(&settings.extraction).referer(Platform::Pinterest.referer()),
        }
    }

    fn is_short_link(url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case("pin.it")))
            .unwrap_or(false)
    }

    fn clean(raw: &str) -> String {
        unescape_url(raw).replace('\\', "")
    }

    fn parse_title(html: &str) -> String {
        page_title(html)
            .map(|t| t.replace(" | Pinterest", "").trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| meta_content(html, "og:title"))
            .unwrap_or_else(|| Platform::Pinterest.default_title())
    }

    fn video_urls(html: &str) -> Vec<String> {
        let mut found: Vec<String> = VIDEO_PATTERNS
            .iter()
            .filter_map(|re| re.captures(html).and_then(|c| c.get(1)))
            .map(|m| m.as_str().to_string())
            .collect();

        found.extend(meta_content(html, "og:video"));
        found.extend(meta_content(html, "og:video:url"));
        found.extend(capture_all(&BARE_VIDEO_RE, html));

        for block in script_texts(html, r#"script[type="application/ld+json"]"#) {
            let Ok(data) = serde_json::from_str::<Value>(&block) else {
                continue;
            };
            let entries = match &data {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            };
            let content_url = entries
                .iter()
                .filter_map(|e| e.get("contentUrl").and_then(|v| v.as_str()))
                .find(|u| u.contains("pinimg.com") || u.contains(".mp4"));
            found.extend(content_url.map(String::from));
        }

        dedup(found.iter().map(|u| Self::clean(u)))
            .into_iter()
            .filter(|u| u.starts_with("http"))
            .collect()
    }

    fn size_hint(url: &str) -> Option<u32> {
        SIZE_HINT_RE
            .captures(url)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Originals first, then the largest `<N>x` size, then the longest URL.
    fn image_urls(html: &str) -> Vec<String> {
        let mut found = capture_all(&ORIGINAL_IMAGE_RE, html);
        found.extend(capture_all(&SIZED_IMAGE_RE, html));

        for blob in script_texts(html, r#"script[type="application/json"]"#) {
            let Ok(data) = serde_json::from_str::<Value>(&blob) else {
                continue;
            };
            walk_strings(&data, &mut |_, s| {
                if s.starts_with("http") && s.contains("i.pinimg.com") {
                    found.push(s.to_string());
                }
            });
        }

        found.extend(meta_content(html, "og:image"));

        let mut images: Vec<String> = dedup(found.iter().map(|u| Self::clean(u)))
            .into_iter()
            .filter(|u| IMAGE_EXT_RE.is_match(u))
            .collect();

        images.sort_by_key(|u| {
            (
                !u.contains("/originals/"),
                Reverse(Self::size_hint(u).unwrap_or(0)),
                Reverse(u.len()),
            )
        });
        images
    }

    fn image_label(url: &str) -> String {
        if url.contains("/originals/") {
            return "Original".into();
        }
        match Self::size_hint(url) {
            Some(n) => format!("{}px", n),
            None => "Image".into(),
        }
    }

    fn media_from_html(html: &str) -> anyhow::Result<MediaInfo> {
        if PIN_NOT_FOUND_RE.is_match(html) {
            return Err(anyhow!("Pin not found"));
        }

        let title = Self::parse_title(html);
        let thumbnail = meta_content(html, "og:image").map(|u| Self::clean(&u));

        let videos = Self::video_urls(html);
        if !videos.is_empty() {
            let formats = videos
                .into_iter()
                .enumerate()
                .map(|(i, u)| {
                    let label = if i == 0 { "Original Quality" } else { "Alt" };
                    MediaFormat::from_url(u, i.to_string(), label)
                })
                .collect();
            return Ok(MediaInfo::new(Platform::Pinterest.name(), title)
                .with_formats(formats)
                .with_thumbnail(thumbnail));
        }

        let images = Self::image_urls(html);
        if images.is_empty() {
            return Err(anyhow!("No media found in Pinterest page"));
        }

        let thumbnail = images.first().cloned().or(thumbnail);
        let formats = images
            .into_iter()
            .enumerate()
            .map(|(i, u)| {
                let label = Self::image_label(&u);
                MediaFormat::from_url(u, i.to_string(), &label).into_image()
            })
            .collect();

        Ok(MediaInfo::new(Platform::Pinterest.name(), title)
            .with_formats(formats)
            .with_thumbnail(thumbnail))
    }

    async fn try_html(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Referer", Platform::Pinterest.referer())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Pinterest page returned HTTP {}", response.status()));
        }

        let html = response.text().await?;
        Self::media_from_html(&html)
    }
}

#[async_trait]
impl MediaExtractor for PinterestExtractor {
    fn name(&self) -> &str {
        "pinterest"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::Pinterest)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let url = if Self::is_short_link(url) {
            redirect::expand_short_link(&self.client, url).await
        } else {
            url.to_string()
        };

        Chain::new(self.name())
            .then("html", self.try_html(&url))
            .then(
                "ytdlp",
                ytdlp::extract(
                    &url,
                    &self.ytdlp,
                    Platform::Pinterest.name(),
                    "Pinterest Media",
                    Selection::AnyWithUrl,
                ),
            )
            .run()
            .await
    }
}
