//! UniSaver backend.
//!
//! Startup order:
//! 1. Load settings from the data directory.
//! 2. Initialise tracing (JSON when configured).
//! 3. Report the external tools (yt-dlp, ffmpeg).
//! 4. Register the extractors and serve the Axum router with graceful shutdown.

use std::sync::Arc;

use tracing::{info, warn};

pub mod core;
pub mod error;
pub mod models;
pub mod platforms;
pub mod routes;
pub mod storage;

use crate::core::registry::ExtractorRegistry;
use crate::models::settings::Settings;
use crate::platforms::*;
use crate::routes::AppState;

/// Extractors in detection order. Generic claims every http(s) URL, so it
/// must stay last.
pub fn build_registry(settings: &Settings) -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    registry.register(Arc::new(youtube::YouTubeExtractor::new(settings)));
    registry.register(Arc::new(facebook::FacebookExtractor::new(settings)));
    registry.register(Arc::new(instagram::InstagramExtractor::new(settings)));
    registry.register(Arc::new(tiktok::TikTokExtractor::new(settings)));
    registry.register(Arc::new(twitter::TwitterExtractor::new(settings)));
    registry.register(Arc::new(threads::ThreadsExtractor::new(settings)));
    registry.register(Arc::new(pinterest::PinterestExtractor::new(settings)));
    registry.register(Arc::new(vimeo::VimeoExtractor::new(settings)));
    registry.register(Arc::new(dailymotion::DailymotionExtractor::new(settings)));
    registry.register(Arc::new(twitch::TwitchExtractor::new(settings)));
    registry.register(Arc::new(soundcloud::SoundCloudExtractor::new(settings)));
    registry.register(Arc::new(spotify::SpotifyExtractor::new(settings)));
    registry.register(Arc::new(music::MusicExtractor::new(settings)));
    registry.register(Arc::new(generic_ytdlp::GenericYtdlpExtractor::new(settings)));
    registry
}

fn init_tracing(settings: &Settings) {
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match settings.logging.level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: log level '{}' is not a valid tracing filter ({}); falling back to 'info'",
                    settings.logging.level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if settings.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

pub async fn run() -> anyhow::Result<()> {
    let loaded = storage::config::load_settings();
    let settings = loaded.settings;
    core::http_client::init_proxy(settings.proxy.clone());
    init_tracing(&settings);

    info!(version = env!("CARGO_PKG_VERSION"), "unisaver starting");
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }
    if settings.proxy.is_active() {
        info!(proxy_type = %settings.proxy.proxy_type, host = %settings.proxy.host, "outbound proxy enabled");
    }
    core::dependencies::log_dependency_report().await;

    let registry = build_registry(&settings);
    info!(extractors = ?registry.names(), "extractors registered");

    let addr = settings.server.socket_addr();
    let state = Arc::new(AppState::new(settings, registry)?);
    let app = routes::build(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("unisaver stopped");
    Ok(())
}

/// Resolves on SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_detection_order() {
        let registry = build_registry(&Settings::default());
        let names = registry.names();
        assert_eq!(names.first(), Some(&"youtube"));
        assert_eq!(names.last(), Some(&"generic"));

        let pick = |url: &str| registry.find_platform(url).map(|e| e.name().to_string());
        assert_eq!(pick("https://youtu.be/abc").as_deref(), Some("youtube"));
        assert_eq!(pick("https://www.tiktok.com/@a/video/1").as_deref(), Some("tiktok"));
        assert_eq!(pick("https://soundcloud.com/a/b").as_deref(), Some("soundcloud"));
        assert_eq!(pick("https://www.deezer.com/track/1").as_deref(), Some("music"));
        assert_eq!(pick("https://example.org/video").as_deref(), Some("generic"));
        assert!(pick("ftp://example.org/video").is_none());
    }
}
