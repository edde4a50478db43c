use async_trait::async_trait;
use anyhow::anyhow;

use crate::core::fallback::Chain;
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::{MediaInfo, MediaType};
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

const AUDIO_FORMAT: &str = "bestaudio/best";

/// yt-dlp audio extraction for one music service, with that service's
/// referer. Formats come back sorted by bitrate, highest first.
pub async fn extract_audio(url: &str, base: &YtdlpOptions, platform: Platform) -> anyhow::Result<MediaInfo> {
    let opts = base.clone().referer(platform.referer());
    let mut info = ytdlp::extract(
        url,
        &opts,
        platform.name(),
        &platform.default_title(),
        Selection::AudioOnly,
    )
    .await?;
    info.media_type = MediaType::Audio;
    Ok(info)
}

/// Music services without a dedicated extractor.
pub struct MusicExtractor {
    ytdlp: YtdlpOptions,
}

impl MusicExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ytdlp: Self::audio_options(settings),
        }
    }

    pub fn audio_options(settings: &Settings) -> YtdlpOptions {
        YtdlpOptions::from_settings(&settings.extraction).format(AUDIO_FORMAT)
    }

    /// Spotify is DRM-only and SoundCloud has its own chain, but both are
    /// still accepted when the music route is forced.
    fn service_of(url: &str) -> Option<Platform> {
        Platform::from_url(url).filter(|p| p.is_music())
    }
}

#[async_trait]
impl MediaExtractor for MusicExtractor {
    fn name(&self) -> &str {
        "music"
    }

    fn can_handle(&self, url: &str) -> bool {
        matches!(
            Self::service_of(url),
            Some(
                Platform::Bandcamp
                    | Platform::Deezer
                    | Platform::AppleMusic
                    | Platform::AmazonMusic
                    | Platform::Mixcloud
                    | Platform::Audiomack
            )
        )
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let service = Self::service_of(url).ok_or_else(|| anyhow!("Unsupported music platform: {}", url))?;

        Chain::new(self.name())
            .then("ytdlp", extract_audio(url, &self.ytdlp, service))
            .run()
            .await
    }
}
