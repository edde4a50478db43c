use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use crate::core::fallback::Chain;
use crate::core::redirect::expand_short_link;
use crate::core::scrape::script_texts;
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::{MediaFormat, MediaInfo};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:135.0) Gecko/20100101 Firefox/135.0",
];

pub struct TikTokExtractor {
    client: reqwest::Client,
    ytdlp: YtdlpOptions,
}

impl TikTokExtractor {
    pub fn new(settings: &Settings) -> Self {
        let client = crate::core::http_client::apply_global_proxy(reqwest::Client::builder())
            .user_agent(Self::pick_user_agent())
            .cookie_store(true)
            .timeout(Duration::from_secs(settings.extraction.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            ytdlp: YtdlpOptions::from_settings(&settings.extraction).referer(Platform::TikTok.referer()),
        }
    }

    fn pick_user_agent() -> &'static str {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static IDX: AtomicUsize = AtomicUsize::new(0);
        let i = IDX.fetch_add(1, Ordering::Relaxed);
        USER_AGENTS[i % USER_AGENTS.len()]
    }

    fn is_short_link(url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .is_some_and(|h| h.starts_with("vm.") || h.starts_with("vt."))
    }

    fn extract_post_id(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();

        if segments.len() >= 3
            && segments[0].starts_with('@')
            && (segments[1] == "video" || segments[1] == "photo")
        {
            let id = segments[2];
            if id.chars().all(|c| c.is_ascii_digit()) {
                return Some(id.to_string());
            }
        }

        None
    }

    fn is_captcha_page(html: &str) -> bool {
        html.contains("verify-bar-close")
            || html.contains("captcha_verify")
            || html.contains("tiktok-verify-page")
            || html.contains("verify/page")
            || (html.contains("Verify to continue") && !html.contains("__UNIVERSAL_DATA_FOR_REHYDRATION__"))
    }

    fn is_valid_play_addr(url: &str) -> bool {
        (url.starts_with("http://") || url.starts_with("https://"))
            && !url.contains("verify")
            && !url.contains("captcha")
    }

    /// `itemInfo.itemStruct` out of the rehydration blob.
    fn parse_item_struct(html: &str) -> anyhow::Result<Value> {
        if Self::is_captcha_page(html) {
            return Err(anyhow!("TikTok served a captcha page"));
        }

        let script = script_texts(html, "script#__UNIVERSAL_DATA_FOR_REHYDRATION__")
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("TikTok page has no rehydration data"))?;

        let data: Value = serde_json::from_str(&script)
            .map_err(|e| anyhow!("TikTok rehydration JSON is invalid: {}", e))?;

        let video_detail = data
            .pointer("/__DEFAULT_SCOPE__/webapp.video-detail")
            .ok_or_else(|| anyhow!("webapp.video-detail not found in TikTok page"))?;

        if let Some(status_code) = video_detail.get("statusCode").and_then(|v| v.as_u64()) {
            if status_code != 0 {
                let msg = video_detail.get("statusMsg").and_then(|v| v.as_str()).unwrap_or("");
                return Err(anyhow!("TikTok post unavailable (status {}) {}", status_code, msg));
            }
        }

        let detail = video_detail
            .pointer("/itemInfo/itemStruct")
            .ok_or_else(|| anyhow!("itemInfo.itemStruct not found in TikTok page"))?;

        if detail
            .get("isContentClassified")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            return Err(anyhow!("TikTok post is age restricted"));
        }

        Ok(detail.clone())
    }

    fn media_from_item(detail: &Value) -> MediaInfo {
        let mut formats = Vec::new();

        let video_urls = [
            ("/video/playAddr", "Original"),
            ("/video/downloadAddr", "Download"),
        ];
        for (pointer, label) in video_urls {
            if let Some(url) = detail.pointer(pointer).and_then(|v| v.as_str()) {
                if Self::is_valid_play_addr(url) && !formats.iter().any(|f: &MediaFormat| f.url == url) {
                    let mut f = MediaFormat::from_url(url, format!("tt_{}", formats.len()), label);
                    f.height = detail.pointer("/video/height").and_then(|v| v.as_u64()).map(|h| h as u32);
                    formats.push(f);
                }
            }
        }

        if let Some(images) = detail.pointer("/imagePost/images").and_then(|v| v.as_array()) {
            for (i, img) in images.iter().enumerate() {
                let url = img
                    .pointer("/imageURL/urlList")
                    .and_then(|v| v.as_array())
                    .and_then(|list| list.iter().filter_map(|u| u.as_str()).find(|u| Self::is_valid_play_addr(u)));
                if let Some(url) = url {
                    formats.push(
                        MediaFormat::from_url(url, format!("tt_img_{}", i), &format!("Image {}", i + 1)).into_image(),
                    );
                }
            }
        }

        if let Some(url) = detail
            .pointer("/music/playUrl")
            .and_then(|v| v.as_str())
            .filter(|u| Self::is_valid_play_addr(u))
        {
            formats.push(MediaFormat::from_url(url, "tt_audio", "Audio").into_audio());
        }

        let title = detail
            .get("desc")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from)
            .unwrap_or_else(|| Platform::TikTok.default_title());

        MediaInfo::new(Platform::TikTok.name(), title)
            .with_formats(formats)
            .with_thumbnail(
                detail
                    .pointer("/video/cover")
                    .or_else(|| detail.pointer("/video/originCover"))
                    .and_then(|v| v.as_str())
                    .map(String::from),
            )
            .with_duration(detail.pointer("/video/duration").and_then(|v| v.as_f64()))
    }

    async fn fetch_page(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let page_url = match Self::extract_post_id(url) {
            Some(id) => format!("https://www.tiktok.com/@i/video/{}", id),
            None => url.to_string(),
        };

        tracing::debug!("TikTok: fetching {}", page_url);

        let response = self
            .client
            .get(&page_url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("TikTok returned HTTP {}", status));
        }

        let html = response.text().await?;
        let detail = Self::parse_item_struct(&html)?;
        Ok(Self::media_from_item(&detail))
    }
}

#[async_trait]
impl MediaExtractor for TikTokExtractor {
    fn name(&self) -> &str {
        "tiktok"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::TikTok)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let url = if Self::is_short_link(url) {
            expand_short_link(&self.client, url).await
        } else {
            url.to_string()
        };

        Chain::new(self.name())
            .then("page", self.fetch_page(&url))
            .then(
                "ytdlp",
                ytdlp::extract(
                    &url,
                    &self.ytdlp,
                    Platform::TikTok.name(),
                    "TikTok Video",
                    Selection::ProgressiveFirst,
                ),
            )
            .run()
            .await
    }
}
