use std::sync::LazyLock;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;

use crate::core::fallback::Chain;
use crate::core::scrape::{capture_all, dedup, meta_content, page_title, unescape_url};
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::{MediaFormat, MediaInfo};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

/// JSON fields carrying a progressive source, best first. Only the first hit
/// of each is taken.
static SOURCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "hd_src_no_ratelimit",
        "sd_src_no_ratelimit",
        "browser_native_hd_url",
        "browser_native_sd_url",
        "playable_url_quality_hd",
        "playable_url",
        "video_url",
    ]
    .iter()
    .map(|key| Regex::new(&format!(r#""{}":"([^"]+)""#, key)).unwrap())
    .collect()
});

/// Same fields inside escaped inline JS.
static ESCAPED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["hd_src", "sd_src", "playable_url"]
        .iter()
        .map(|key| Regex::new(&format!(r#"{}\\":\\"(https:[^"]+?)\\""#, key)).unwrap())
        .collect()
});

static BARE_CDN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(https?://video\.xx\.fbcdn\.net/[^"'\s]+)"#).unwrap());

static HD_HINT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"hd|1080|720").unwrap());

pub struct FacebookExtractor {
    client: reqwest::Client,
    cookie: Option<String>,
    ytdlp: YtdlpOptions,
}

impl FacebookExtractor {
    pub fn new(settings: &Settings) -> Self {
        let client = crate::core::http_client::browser_client(
            &settings.extraction.user_agent,
            Duration::from_secs(settings.extraction.request_timeout_secs),
        );

        Self {
            client,
            cookie: settings
                .auth
                .facebook_cookie
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from),
            ytdlp: YtdlpOptions::from_settings(&settings.extraction)
                .referer(Platform::Facebook.referer())
                .cookies(settings.auth.facebook_cookies_path()),
        }
    }

    fn clean_url(raw: &str) -> String {
        unescape_url(raw).replace('\\', "")
    }

    fn is_hd(url: &str) -> bool {
        HD_HINT_RE.is_match(url)
    }

    /// Candidate sources in the page, HD-looking ones first.
    fn scan_sources(html: &str) -> Vec<String> {
        let mut candidates = Vec::new();

        for re in SOURCE_PATTERNS.iter() {
            if let Some(m) = re.captures(html).and_then(|c| c.get(1)) {
                candidates.push(Self::clean_url(m.as_str()));
            }
        }

        candidates.extend(capture_all(&BARE_CDN_RE, html).iter().map(|u| Self::clean_url(u)));

        let decoded = html.replace("\\u0025", "%");
        for re in ESCAPED_PATTERNS.iter() {
            if let Some(m) = re.captures(&decoded).and_then(|c| c.get(1)) {
                candidates.push(Self::clean_url(m.as_str()));
            }
        }

        let mut list: Vec<String> = dedup(candidates)
            .into_iter()
            .filter(|u| u.contains("fbcdn.net") || u.contains("facebook.com"))
            .collect();

        list.sort_by_key(|u| !Self::is_hd(u));
        list
    }

    fn media_from_html(html: &str) -> anyhow::Result<MediaInfo> {
        let sources = Self::scan_sources(html);
        if sources.is_empty() {
            return Err(anyhow!("no direct media found in Facebook page"));
        }

        let formats = sources
            .iter()
            .enumerate()
            .map(|(i, u)| MediaFormat::from_url(u.as_str(), i.to_string(), if Self::is_hd(u) { "HD" } else { "SD" }))
            .collect();

        let title = page_title(html)
            .map(|t| t.replace(" | Facebook", "").trim().to_string())
            .filter(|t| !t.is_empty() && t != "Facebook")
            .unwrap_or_else(|| Platform::Facebook.default_title());

        Ok(MediaInfo::new(Platform::Facebook.name(), title)
            .with_formats(formats)
            .with_thumbnail(meta_content(html, "og:image")))
    }

    async fn try_html(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Referer", Platform::Facebook.referer())
            .header("Cache-Control", "no-cache");
        if let Some(cookie) = &self.cookie {
            request = request.header("Cookie", cookie);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Facebook page returned HTTP {}", response.status()));
        }

        let html = response.text().await?;
        Self::media_from_html(&html)
    }
}

#[async_trait]
impl MediaExtractor for FacebookExtractor {
    fn name(&self) -> &str {
        "facebook"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::Facebook)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        Chain::new(self.name())
            .then("html", self.try_html(url))
            .then(
                "ytdlp",
                ytdlp::extract(
                    url,
                    &self.ytdlp,
                    Platform::Facebook.name(),
                    "Facebook Video",
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
    use crate::models::media::MediaType;

    const PAGE: &str = r#"<html><head><title>Funny cat | Facebook</title>
        <meta property="og:image" content="https://scontent.xx.fbcdn.net/v/thumb.jpg?a=1&amp;b=2">
        </head><body><script>
        {"sd_src_no_ratelimit":"https:\/\/video.xx.fbcdn.net\/v\/t42\/sd.mp4?efg=1","hd_src_no_ratelimit":"https:\/\/video.xx.fbcdn.net\/v\/t42\/hd.mp4?efg=1"}
        {"playable_url":"https:\/\/evil.example.com\/x.mp4"}
        </script></body></html>"#;

    #[test]
    fn scans_and_orders_sources() {
        let sources = FacebookExtractor::scan_sources(PAGE);
        assert_eq!(
            sources,
            vec![
                "https://video.xx.fbcdn.net/v/t42/hd.mp4?efg=1".to_string(),
                "https://video.xx.fbcdn.net/v/t42/sd.mp4?efg=1".to_string(),
            ]
        );
    }

    #[test]
    fn html_media_has_title_and_thumbnail() {
        let info = FacebookExtractor::media_from_html(PAGE).unwrap();
        assert_eq!(info.title, "Funny cat");
        assert_eq!(info.thumbnail.as_deref(), Some("https://scontent.xx.fbcdn.net/v/thumb.jpg?a=1&b=2"));
        assert_eq!(info.formats[0].quality, "HD");
        assert_eq!(info.media_type, MediaType::Video);
        assert_eq!(info.direct_url.as_deref(), Some("https://video.xx.fbcdn.net/v/t42/hd.mp4?efg=1"));
    }

    #[test]
    fn escaped_js_sources() {
        let html = r#"<script>require("x",{\"hd_src\":\"https:\\/\\/video.xx.fbcdn.net\\/v\\/e.mp4?x=1\"})</script>"#;
        let sources = FacebookExtractor::scan_sources(html);
        assert_eq!(sources, vec!["https://video.xx.fbcdn.net/v/e.mp4?x=1".to_string()]);
    }

    #[test]
    fn page_without_sources_fails() {
        assert!(FacebookExtractor::media_from_html("<html><title>Log in | Facebook</title></html>").is_err());
    }
}
