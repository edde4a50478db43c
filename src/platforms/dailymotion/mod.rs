use async_trait::async_trait;

use crate::core::fallback::Chain;
use crate::core::ytdlp::{self, Selection, YtdlpOptions};
use crate::models::media::MediaInfo;
use crate::models::settings::Settings;
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

pub struct DailymotionExtractor {
    ytdlp: YtdlpOptions,
}

impl DailymotionExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ytdlp: YtdlpOptions::from_settings(&settings.extraction).referer(Platform::Dailymotion.referer()),
        }
    }
}

#[async_trait]
impl MediaExtractor for DailymotionExtractor {
    fn name(&self) -> &str {
        "dailymotion"
    }

    fn can_handle(&self, url: &str) -> bool {
        Platform::from_url(url) == Some(Platform::Dailymotion)
    }

    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo> {
        Chain::new(self.name())
            .then(
                "ytdlp",
                ytdlp::extract(
                    url,
                    &self.ytdlp,
                    Platform::Dailymotion.name(),
                    "Dailymotion Video",
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

    #[test]
    fn claims_dailymotion_hosts() {
        let extractor = DailymotionExtractor::new(&Settings::default());
        assert!(extractor.can_handle("https://www.dailymotion.com/video/x8abcd"));
        assert!(extractor.can_handle("https://dai.ly/x8abcd"));
        assert!(!extractor.can_handle("https://vimeo.com/1"));
        assert_eq!(extractor.ytdlp.referer.as_deref(), Some("https://www.dailymotion.com/"));
    }
}
