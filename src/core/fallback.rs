use std::future::Future;

use anyhow::anyhow;
use futures::future::BoxFuture;

use crate::models::error::ExtractError;
use crate::models::media::MediaInfo;

/// Ordered list of extraction methods for one URL. Each method is a lazy
/// future, so nothing runs until [`Chain::run`] reaches it.
pub struct Chain<'a> {
    platform: &'a str,
    attempts: Vec<(&'static str, BoxFuture<'a, anyhow::Result<MediaInfo>>)>,
}

impl<'a> Chain<'a> {
    pub fn new(platform: &'a str) -> Self {
        Self {
            platform,
            attempts: Vec::new(),
        }
    }

    pub fn then<F>(mut self, method: &'static str, attempt: F) -> Self
    where
        F: Future<Output = anyhow::Result<MediaInfo>> + Send + 'a,
    {
        self.attempts.push((method, Box::pin(attempt)));
        self
    }

    /// First method producing media wins and is recorded in `extracted_by`.
    /// Failures fall through to the next method, except a login wall.
    pub async fn run(self) -> anyhow::Result<MediaInfo> {
        let platform = self.platform;
        let mut last_err: Option<anyhow::Error> = None;

        for (method, attempt) in self.attempts {
            tracing::debug!(platform, method, "trying extraction method");

            match attempt.await {
                Ok(mut info) if info.has_media() => {
                    tracing::debug!(platform, method, formats = info.formats.len(), "extraction succeeded");
                    info.extracted_by = Some(method.to_string());
                    return Ok(info);
                }
                Ok(_) => {
                    tracing::debug!(platform, method, "method returned no media");
                    last_err = Some(ExtractError::NoMedia(format!("{} returned no media", method)).into());
                }
                Err(e) if ExtractError::is_auth_required(&e) => {
                    tracing::warn!(platform, method, error = %e, "login required, stopping");
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(platform, method, error = %format!("{:#}", e), "method failed");
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or_else(|| anyhow!("no extraction methods configured"));
        tracing::warn!(platform, error = %format!("{:#}", err), "all extraction methods failed");
        Err(err.context(format!("all {} extraction methods failed", platform)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::MediaFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn media(url: &str) -> anyhow::Result<MediaInfo> {
        Ok(MediaInfo::new("test", "Test").with_formats(vec![MediaFormat::from_url(url, "0", "HD")]))
    }

    fn fail(msg: &str) -> anyhow::Result<MediaInfo> {
        Err(anyhow!(msg.to_string()))
    }

    #[tokio::test]
    async fn first_success_wins_and_is_tagged() {
        let calls = AtomicUsize::new(0);
        let info = Chain::new("test")
            .then("api", async { fail("HTTP 500") })
            .then("html", async {
                calls.fetch_add(1, Ordering::SeqCst);
                media("https://a/html.mp4")
            })
            .then("ytdlp", async {
                calls.fetch_add(10, Ordering::SeqCst);
                media("https://a/ytdlp.mp4")
            })
            .run()
            .await
            .unwrap();

        assert_eq!(info.extracted_by.as_deref(), Some("html"));
        assert_eq!(info.direct_url.as_deref(), Some("https://a/html.mp4"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_result_falls_through() {
        let info = Chain::new("test")
            .then("empty", async { anyhow::Ok(MediaInfo::new("test", "Empty")) })
            .then("ytdlp", async { media("https://a/x.mp4") })
            .run()
            .await
            .unwrap();
        assert_eq!(info.extracted_by.as_deref(), Some("ytdlp"));
    }

    #[tokio::test]
    async fn embed_only_counts_as_media() {
        let mut embed = MediaInfo::new("spotify", "Track");
        embed.embed_url = Some("https://open.spotify.com/embed/track/1".into());
        let info = Chain::new("spotify")
            .then("page", async move { anyhow::Ok(embed) })
            .run()
            .await
            .unwrap();
        assert!(info.formats.is_empty());
        assert_eq!(info.extracted_by.as_deref(), Some("page"));
    }

    #[tokio::test]
    async fn auth_required_stops_chain() {
        let reached = AtomicUsize::new(0);
        let err = Chain::new("instagram")
            .then("ytdlp", async {
                Err::<MediaInfo, anyhow::Error>(ExtractError::AuthRequired("login_required".into()).into())
            })
            .then("never", async {
                reached.fetch_add(1, Ordering::SeqCst);
                media("https://a/x.mp4")
            })
            .run()
            .await
            .unwrap_err();

        assert!(ExtractError::is_auth_required(&err));
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_failures_report_platform_and_last_error() {
        let err = Chain::new("vimeo")
            .then("config", async { fail("config missing") })
            .then("ytdlp", async { fail("yt-dlp failed: boom") })
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "all vimeo extraction methods failed");
        assert!(format!("{:#}", err).contains("yt-dlp failed: boom"));
    }
}
