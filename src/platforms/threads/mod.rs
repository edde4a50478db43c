use std::sync::LazyLock;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;

use crate::core::fallback::Chain;
use crate::core::scrape::{meta_content, page_title, unescape_url};
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::{MediaFormat, MediaInfo};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

/// Inline JSON video fields, checked after the `og:video` tags. The first
/// match wins.
static VIDEO_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)"video_url":"([^"]+)""#,
        r#"(?i)"playbackUrl":"([^"]+)""#,
        r#"(?i)"mediaUrl":"([^"]+)""#,
        r#"(?i)"videoUrl":"([^"]+)""#,
        r#"(?i)"url":"([^"]+\.mp4[^"]*)""#,
        r#"(?i)(https?://[^\s"']+\.mp4[^\s"']*)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static IMAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)"display_url":"([^"]+)""#,
        r#"(?i)"image_url":"([^"]+)""#,
        r#"(?i)"thumbnail_url":"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub struct ThreadsExtractor {
    client: reqwest::Client,
    ytdlp: YtdlpOptions,
}

impl ThreadsExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: crate::core::http_client::browser_client(
                &settings.extraction.user_agent,
                Duration::from_secs(settings.extraction.request_timeout_secs),
            ),
            ytdlp: YtdlpOptions::from_settings(&settings.extraction).referer(Platform::Threads.referer()),
        }
    }

    fn clean(raw: &str) -> String {
        unescape_url(raw).replace('\\', "")
    }

    fn first_capture(patterns: &[Regex], html: &str) -> Option<String> {
        patterns
            .iter()
            .find_map(|re| re.captures(html).and_then(|c| c.get(1)))
            .map(|m| Self::clean(m.as_str()))
    }

    fn media_from_html(html: &str) -> anyhow::Result<MediaInfo> {
        let og_image = meta_content(html, "og:image");

        let video = meta_content(html, "og:video")
            .or_else(|| meta_content(html, "og:video:url"))
            .map(|u| Self::clean(&u))
            .or_else(|| Self::first_capture(&VIDEO_PATTERNS, html));

        let format = match video {
            Some(url) => MediaFormat::from_url(url, "0", "Original"),
            None => {
                let image = Self::first_capture(&IMAGE_PATTERNS, html)
                    .or_else(|| og_image.clone())
                    .ok_or_else(|| anyhow!("no media found in Threads page"))?;
                MediaFormat::from_url(image, "0", "Original").into_image()
            }
        };

        let thumbnail = og_image.or_else(|| format.is_image().then(|| format.url.clone()));

        let title = page_title(html)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| Platform::Threads.default_title());

        Ok(MediaInfo::new(Platform::Threads.name(), title)
            .with_formats(vec![format])
            .with_thumbnail(thumbnail))
    }

    async fn try_html(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Referer", Platform::Threads.referer())
            .header("Cache-Control", "no-cache")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Threads page returned HTTP {}", response.status()));
        }

        let html = response.text().await?;
        Self::media_from_html(&html)
    }
}

#[async_trait]
impl MediaExtractor for ThreadsExtractor {
    fn name(&self) -> &str {
        "threads"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::Threads)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        Chain::new(self.name())
            .then("html", self.try_html(url))
            .then(
                "ytdlp",
                ytdlp::extract(
                    url,
                    &self.ytdlp,
                    Platform::Threads.name(),
                    "Threads Post",
                    Selection::ProgressiveFirst,
                ),
            )
            .run()
            .await
    }
}
