use async_trait::async_trait;
use serde_json::Value;

use crate::core::playable::looks_playable_by_extension;
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::error::ExtractError;
use crate::models::media::{best_format, MediaFormat, MediaInfo};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;

const DEFAULT_TITLE: &str = "Media";

/// Last resort for hosts no other extractor claims.
pub struct GenericYtdlpExtractor {
    ytdlp: YtdlpOptions,
}

impl GenericYtdlpExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ytdlp: YtdlpOptions::from_settings(&settings.extraction),
        }
    }

    fn is_manifest(f: &MediaFormat) -> bool {
        matches!(f.container.as_str(), "hls" | "dash")
            || f.url.contains(".m3u8")
            || f.url.contains(".mpd")
    }

    /// Video or HLS/DASH formats whose URL looks playable; otherwise every
    /// format with a URL.
    fn pick(formats: Vec<MediaFormat>) -> Option<MediaFormat> {
        let candidates: Vec<MediaFormat> = formats
            .iter()
            .filter(|f| {
                (f.has_video || Self::is_manifest(f))
                    && (looks_playable_by_extension(&f.url) || Self::is_manifest(f))
            })
            .cloned()
            .collect();

        let pool = if candidates.is_empty() { &formats } else { &candidates };
        best_format(pool).cloned()
    }

    fn parse_video_info(json: &Value) -> anyhow::Result<MediaInfo> {
        let formats = ytdlp::select_formats(json, Selection::AnyWithUrl);
        let best = Self::pick(formats)
            .ok_or_else(|| ExtractError::NoMedia("yt-dlp returned no usable formats".into()))?;

        let title = json
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE);

        tracing::debug!(
            extractor = json.get("extractor_key").and_then(|v| v.as_str()).unwrap_or("generic"),
            format = %best.itag,
            "generic extraction picked format"
        );

        Ok(MediaInfo::new("generic", title)
            .with_formats(vec![best])
            .with_thumbnail(json.get("thumbnail").and_then(|v| v.as_str()).map(String::from))
            .with_duration(json.get("duration").and_then(|v| v.as_f64())))
    }
}

#[async_trait]
impl MediaExtractor for GenericYtdlpExtractor {
    fn name(&self) -> &str {
        "generic"
    }

    fn can_handle(&self, url: &str) -> bool {
        if let Ok(parsed) = url::Url::parse(url) {
            let scheme = parsed.scheme();
            return scheme == "http" || scheme == "https";
        }
        false
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let json = ytdlp::dump_info(url, &self.ytdlp).await?;
        let mut info = Self::parse_video_info(&json)?;
        info.extracted_by = Some("ytdlp".into());
        Ok(info)
    }
}
