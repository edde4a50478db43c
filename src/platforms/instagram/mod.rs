use std::sync::LazyLock;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::core::fallback::Chain;
use crate::core::redirect::expand_short_link;
use crate::core::scrape::{dedup, json_after, walk_strings};
use crate::core::ytdlp::{self, YtdlpOptions};
use crate::models::media::{MediaFormat, MediaInfo};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 15_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1";
const IG_APP_ID: &str = "936619743392459";
const IG_ASBD_ID: &str = "129477";

static SHORTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:instagram\.com/(?:p|reel|reels|tv)/|instagram\.com/stories/[^/]+/)([A-Za-z0-9_\-]+)").unwrap()
});

static MEDIA_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(mp4|m4v|jpg|jpeg|png|webp)(\?|#|$)").unwrap());

const MEDIA_KEYS: &[&str] = &["video_url", "display_url", "src", "url"];

/// Markers under which embedded page JSON carries the post.
const PAGE_JSON_MARKERS: &[&str] = &[
    "window._sharedData",
    "\"gql_data\":",
    "\"xdt_api__v1__media__shortcode__web_info\":",
];

pub struct InstagramExtractor {
    api_client: reqwest::Client,
    page_client: reqwest::Client,
    cookie: Option<String>,
    ytdlp: YtdlpOptions,
}

impl InstagramExtractor {
    pub fn new(settings: &Settings) -> Self {
        let api_client = crate::core::http_client::apply_global_proxy(reqwest::Client::builder())
            .user_agent(MOBILE_USER_AGENT)
            .timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .unwrap_or_default();

        let page_client = crate::core::http_client::browser_client(
            &settings.extraction.user_agent,
            Duration::from_secs(20),
        );

        let mut ytdlp = YtdlpOptions::from_settings(&settings.extraction)
            .referer(Platform::Instagram.referer())
            .cookies(settings.auth.instagram_cookies_path());
        ytdlp.user_agent = Some(MOBILE_USER_AGENT.to_string());

        Self {
            api_client,
            page_client,
            cookie: settings
                .auth
                .instagram_cookie
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from),
            ytdlp,
        }
    }

    fn extract_shortcode(url: &str) -> Option<String> {
        SHORTCODE_RE
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn is_share_link(url: &str) -> bool {
        url::Url::parse(url)
            .map(|u| u.path().starts_with("/share/"))
            .unwrap_or(false)
    }

    fn is_video_url(url: &str) -> bool {
        let u = url.to_lowercase();
        u.contains("video")
            || u.contains(".mp4")
            || u.contains(".m4v")
            || (!u.contains("photo") && !u.contains(".jpg") && !u.contains(".png") && !u.contains(".webp"))
    }

    fn media_extension(url: &str) -> &'static str {
        let u = url.to_lowercase();
        if u.contains(".mp4") || u.contains("video") {
            "mp4"
        } else if u.contains(".png") {
            "png"
        } else if u.contains(".webp") {
            "webp"
        } else if u.contains(".jpg") || u.contains(".jpeg") {
            "jpg"
        } else if Self::is_video_url(url) {
            "mp4"
        } else {
            "jpg"
        }
    }

    /// Every CDN or media URL in an API/page payload, first occurrence first.
    /// Profile pictures are skipped.
    fn collect_media_urls(data: &Value) -> Vec<String> {
        let mut found = Vec::new();

        walk_strings(data, &mut |key, s| {
            if !(s.starts_with("http://") || s.starts_with("https://")) {
                return;
            }
            if key.is_some_and(|k| k.contains("profile_pic")) {
                return;
            }

            let media_key = key.is_some_and(|k| MEDIA_KEYS.contains(&k));
            let cdn = s.contains("cdninstagram.com") || s.contains("fbcdn.net") || s.contains("scontent");

            if media_key || cdn || MEDIA_EXT_RE.is_match(s) {
                found.push(s.to_string());
            }
        });

        dedup(found)
    }

    /// The post object inside the shapes the API and page payloads use.
    fn post_root(data: &Value) -> &Value {
        data.pointer("/items/0")
            .or_else(|| data.pointer("/graphql/shortcode_media"))
            .or_else(|| data.pointer("/data/xdt_shortcode_media"))
            .or_else(|| data.get("shortcode_media"))
            .or_else(|| data.get("xdt_shortcode_media"))
            .unwrap_or(data)
    }

    fn extract_metadata(data: &Value) -> (String, Option<String>) {
        let post = Self::post_root(data);

        let title = [
            post.pointer("/caption/text"),
            post.pointer("/edge_media_to_caption/edges/0/node/text"),
            post.get("accessibility_caption"),
            post.get("alt_text"),
            post.get("title"),
        ]
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| s.chars().take(100).collect::<String>())
        .unwrap_or_else(|| Platform::Instagram.default_title());

        let thumbnail = [
            post.get("thumbnail_url"),
            post.get("display_url"),
            post.pointer("/image_versions2/candidates/0/url"),
            post.get("thumbnail"),
            post.get("image"),
        ]
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .find(|s| s.starts_with("http"))
        .map(String::from);

        (title, thumbnail)
    }

    fn format_for(url: &str, index: usize) -> MediaFormat {
        let is_video = Self::is_video_url(url);
        let ext = Self::media_extension(url);

        let mut f = MediaFormat::from_url(url, format!("ig_{}", index), "Original");
        f.mime_type = format!("{}/{}", if is_video { "video" } else { "image" }, ext);
        f.container = ext.to_string();
        f.has_audio = is_video;
        f.has_video = is_video;
        f.audio_bitrate = is_video.then_some(128.0);
        f.video_codec = Some(if is_video { "h264" } else { "none" }.to_string());
        f.audio_codec = Some(if is_video { "aac" } else { "none" }.to_string());
        f
    }

    fn media_from_urls(urls: Vec<String>, title: String, thumbnail: Option<String>, duration: Option<f64>) -> MediaInfo {
        let formats = urls
            .iter()
            .enumerate()
            .map(|(i, u)| Self::format_for(u, i))
            .collect();

        MediaInfo::new(Platform::Instagram.name(), title)
            .with_formats(formats)
            .with_thumbnail(thumbnail)
            .with_duration(duration)
    }

    fn media_from_payload(data: &Value) -> Option<MediaInfo> {
        let urls = Self::collect_media_urls(data);
        if urls.is_empty() {
            return None;
        }
        let (title, thumbnail) = Self::extract_metadata(data);
        Some(Self::media_from_urls(urls, title, thumbnail, None))
    }

    async fn try_api(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let shortcode = Self::extract_shortcode(url)
            .ok_or_else(|| anyhow!("could not extract Instagram shortcode"))?;

        let endpoints = [
            format!("https://www.instagram.com/api/v1/media/{}/info/", shortcode),
            format!("https://i.instagram.com/api/v1/media/{}/info/", shortcode),
            format!("https://www.instagram.com/p/{}/?__a=1&__d=dis", shortcode),
        ];

        let mut last_err = anyhow!("no Instagram API endpoint returned media");

        for endpoint in &endpoints {
            let mut request = self
                .api_client
                .get(endpoint)
                .header("Accept", "application/json, text/plain, */*")
                .header("Accept-Language", "en-US,en;q=0.9")
                .header("X-IG-App-ID", IG_APP_ID)
                .header("X-ASBD-ID", IG_ASBD_ID)
                .header("X-IG-WWW-Claim", "0")
                .header("Sec-Fetch-Dest", "empty")
                .header("Sec-Fetch-Mode", "cors")
                .header("Sec-Fetch-Site", "same-origin");
            if let Some(cookie) = &self.cookie {
                request = request.header("Cookie", cookie);
            }

            let response = match request.send().await {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    tracing::debug!("Instagram: {} returned HTTP {}", endpoint, r.status());
                    last_err = anyhow!("Instagram API returned HTTP {}", r.status());
                    continue;
                }
                Err(e) => {
                    tracing::debug!("Instagram: {} failed: {}", endpoint, e);
                    last_err = e.into();
                    continue;
                }
            };

            match response.json::<Value>().await {
                Ok(json) => {
                    if let Some(info) = Self::media_from_payload(&json) {
                        return Ok(info);
                    }
                }
                Err(e) => last_err = anyhow!("Instagram API returned non-JSON body: {}", e),
            }
        }

        Err(last_err)
    }

    async fn try_page(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let mut request = self
            .page_client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache");
        if let Some(cookie) = &self.cookie {
            request = request.header("Cookie", cookie);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Instagram page returned HTTP {}", response.status()));
        }
        let html = response.text().await?;

        Self::media_from_page(&html).ok_or_else(|| anyhow!("no embedded media JSON in Instagram page"))
    }

    fn media_from_page(html: &str) -> Option<MediaInfo> {
        PAGE_JSON_MARKERS
            .iter()
            .filter_map(|marker| json_after(html, marker))
            .find_map(|json| Self::media_from_payload(&json))
    }

    async fn try_ytdlp(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let info = ytdlp::dump_info(url, &self.ytdlp).await?;
        Self::media_from_ytdlp(&info)
    }

    fn media_from_ytdlp(info: &Value) -> anyhow::Result<MediaInfo> {
        let root = info.get("url").and_then(|v| v.as_str()).map(String::from);
        let formats = info
            .get("formats")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|f| f.get("url").and_then(|u| u.as_str()).map(String::from));

        let urls = dedup(root.into_iter().chain(formats));
        if urls.is_empty() {
            return Err(anyhow!("no URLs in yt-dlp output"));
        }

        let title = ["title", "fulltitle"]
            .iter()
            .filter_map(|k| info.get(*k).and_then(|v| v.as_str()))
            .find(|t| !t.trim().is_empty())
            .map(String::from)
            .unwrap_or_else(|| Platform::Instagram.default_title());

        Ok(Self::media_from_urls(
            urls,
            title,
            info.get("thumbnail").and_then(|v| v.as_str()).map(String::from),
            info.get("duration").and_then(|v| v.as_f64()),
        ))
    }
}

#[async_trait]
impl MediaExtractor for InstagramExtractor {
    fn name(&self) -> &str {
        "instagram"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::Instagram)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        if !url.to_lowercase().contains("instagram.com") {
            return Err(anyhow!("Invalid Instagram URL"));
        }

        let url = if Self::is_share_link(url) {
            expand_short_link(&self.page_client, url).await
        } else {
            url.to_string()
        };

        Chain::new(self.name())
            .then("api", self.try_api(&url))
            .then("page", self.try_page(&url))
            .then("ytdlp", self.try_ytdlp(&url))
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::MediaType;
    use serde_json::json;

    #[test]
    fn shortcodes() {
        let cases = [
            ("https://www.instagram.com/p/Cabc123_-x/", "Cabc123_-x"),
            ("https://www.instagram.com/reel/Cxyz/?igsh=1", "Cxyz"),
            ("https://instagram.com/tv/B1/", "B1"),
            ("https://www.instagram.com/stories/someone/3141592653/", "3141592653"),
        ];
        for (url, code) in cases {
            assert_eq!(InstagramExtractor::extract_shortcode(url).as_deref(), Some(code), "{}", url);
        }
        assert!(InstagramExtractor::extract_shortcode("https://www.instagram.com/someone/").is_none());
    }

    #[test]
    fn video_detection() {
        assert!(InstagramExtractor::is_video_url("https://scontent.cdninstagram.com/o1/v/t16/f1/m82/clip.mp4?x=1"));
        assert!(!InstagramExtractor::is_video_url("https://scontent.cdninstagram.com/v/t51/photo.jpg?x=1"));
        assert_eq!(InstagramExtractor::media_extension("https://a/b.webp"), "webp");
        assert_eq!(InstagramExtractor::media_extension("https://a/b.jpeg?x"), "jpg");
    }

    #[test]
    fn api_payload_yields_mixed_carousel() {
        let payload = json!({ "items": [{
            "caption": { "text": "  beach day  " },
            "user": { "profile_pic_url": "https://scontent.cdninstagram.com/v/t51/pp.jpg" },
            "image_versions2": { "candidates": [{ "url": "https://scontent.cdninstagram.com/v/t51/a.jpg" }] },
            "carousel_media": [
                { "video_versions": [{ "url": "https://scontent.cdninstagram.com/o1/v/t16/b.mp4" }] }
            ]
        }]});

        let info = InstagramExtractor::media_from_payload(&payload).unwrap();
        assert_eq!(info.title, "beach day");
        assert_eq!(info.thumbnail.as_deref(), Some("https://scontent.cdninstagram.com/v/t51/a.jpg"));
        assert_eq!(info.formats.len(), 2);
        assert!(info.formats.iter().all(|f| f.itag.starts_with("ig_")));
        assert!(!info.formats.iter().any(|f| f.url.contains("pp.jpg")));
        assert_eq!(info.media_type, MediaType::Mixed);
        assert_eq!(info.direct_url.as_deref(), Some("https://scontent.cdninstagram.com/o1/v/t16/b.mp4"));
    }

    #[test]
    fn page_shared_data_is_scraped() {
        let html = r#"<script>window._sharedData = {"entry_data":{"PostPage":[{"graphql":{"shortcode_media":{
            "video_url":"https://scontent.cdninstagram.com/v/clip.mp4",
            "edge_media_to_caption":{"edges":[{"node":{"text":"caption here"}}]}}}}]}};</script>"#;

        let info = InstagramExtractor::media_from_page(html).unwrap();
        assert_eq!(info.formats.len(), 1);
        assert_eq!(info.media_type, MediaType::Video);
        assert!(InstagramExtractor::media_from_page("<html></html>").is_none());
    }

    #[test]
    fn ytdlp_urls_are_deduplicated() {
        let info = json!({
            "title": "",
            "fulltitle": "Reel by someone",
            "url": "https://scontent.cdninstagram.com/v/a.mp4",
            "formats": [
                { "url": "https://scontent.cdninstagram.com/v/a.mp4" },
                { "url": "https://scontent.cdninstagram.com/v/b.mp4" }
            ]
        });
        let media = InstagramExtractor::media_from_ytdlp(&info).unwrap();
        assert_eq!(media.title, "Reel by someone");
        assert_eq!(media.formats.len(), 2);

        assert!(InstagramExtractor::media_from_ytdlp(&json!({})).is_err());
    }
}
