//! Media-info routes: detect, extract, normalize, filter.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;
use crate::models::media::{MediaFormat, MediaInfo, MediaType};
use crate::platforms::traits::MediaExtractor;
use crate::platforms::Platform;

const NO_PLAYABLE_DETAIL: &str =
    "The URL was parsed but produced no direct playable streams (MP4/HLS/DASH).";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/info", get(get_info))
        .route("/api/special-media", get(get_special_media))
        .route("/api/{platform}", get(get_platform))
}

#[derive(Debug, Deserialize)]
pub struct InfoQuery {
    pub url: Option<String>,
}

impl InfoQuery {
    fn url(&self) -> Result<&str, ApiError> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ApiError::MissingUrl)
    }
}

#[derive(Debug, Serialize)]
pub struct Thumbnail {
    pub url: String,
}

/// Body of every successful media-info response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaResponse {
    pub success: bool,
    pub platform: String,
    pub media_type: MediaType,
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: String,
    pub thumbnails: Vec<Thumbnail>,
    pub formats: Vec<MediaFormat>,
    pub direct_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_by: Option<String>,
}

impl MediaResponse {
    fn has_playable(&self) -> bool {
        !self.formats.is_empty() || self.direct_url.is_some() || self.embed_url.is_some()
    }
}

/// One synthetic format stands in for a bare `direct_url`.
fn synthetic_format(url: &str, media_type: MediaType) -> MediaFormat {
    let format = MediaFormat::from_url(url, "best", "Original Quality");
    match media_type {
        MediaType::Audio => format.into_audio(),
        MediaType::Image => format.into_image(),
        _ => MediaFormat {
            has_video: true,
            has_audio: true,
            ..format
        },
    }
}

pub fn normalize(info: MediaInfo) -> MediaResponse {
    let mut formats = info.formats;
    let mut direct_url = info.direct_url.filter(|u| !u.is_empty());

    if formats.is_empty() {
        if let Some(url) = direct_url.as_deref() {
            formats.push(synthetic_format(url, info.media_type));
        }
    }
    if direct_url.is_none() {
        direct_url = crate::models::media::best_format(&formats).map(|f| f.url.clone());
    }

    let media_type = match info.media_type {
        MediaType::Unknown => MediaType::from_formats(&formats),
        other => other,
    };
    let thumbnail = info.thumbnail.unwrap_or_default();

    MediaResponse {
        success: true,
        platform: info.platform,
        media_type,
        title: info.title,
        duration: info.duration_seconds,
        thumbnails: if thumbnail.is_empty() {
            Vec::new()
        } else {
            vec![Thumbnail { url: thumbnail.clone() }]
        },
        thumbnail,
        formats,
        direct_url,
        embed_url: info.embed_url,
        extracted_by: info.extracted_by,
    }
}

/// Swaps in the formats that survived the playable filter. A `direct_url`
/// that pointed at a dropped format goes with it, and the media type is
/// re-derived once anything was dropped. Bare direct URLs (no formats) are
/// left alone.
pub fn retain_playable(mut info: MediaInfo, kept: Vec<MediaFormat>) -> MediaInfo {
    if info.formats.is_empty() {
        return info;
    }
    let dropped = info.formats.len() != kept.len();

    info.direct_url = info
        .direct_url
        .filter(|u| kept.iter().any(|f| &f.url == u))
        .or_else(|| crate::models::media::best_format(&kept).map(|f| f.url.clone()));
    if dropped {
        info.media_type = MediaType::from_formats(&kept);
    }
    info.formats = kept;
    info
}

/// Extract, drop formats a client cannot open, then normalize.
async fn run_pipeline(
    state: &AppState,
    extractor: &dyn MediaExtractor,
    url: &str,
) -> anyhow::Result<MediaResponse> {
    tracing::info!(extractor = extractor.name(), url, "extracting media");
    let mut info = extractor.extract(url).await?;

    let formats = std::mem::take(&mut info.formats);
    let before = formats.len();
    let kept = state.playable.filter(formats.clone()).await;
    tracing::debug!(
        extractor = extractor.name(),
        kept = kept.len(),
        dropped = before - kept.len(),
        "playable filter applied"
    );
    info.formats = formats;

    Ok(normalize(retain_playable(info, kept)))
}

fn generic(state: &AppState) -> Result<Arc<dyn MediaExtractor>, ApiError> {
    state
        .registry
        .find_by_name("generic")
        .ok_or_else(|| ApiError::Internal("generic extractor not registered".into()))
}

/// Human name for error messages: `"YouTube"`, `"Music"`, ...
fn display_name(extractor: &str) -> String {
    if let Some(p) = Platform::from_name(extractor) {
        return p.display_name().to_string();
    }
    let mut chars = extractor.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub async fn get_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<MediaResponse>, ApiError> {
    let url = query.url()?;
    let extractor = match state.registry.find_platform(url) {
        Some(e) => e,
        None => generic(&state)?,
    };
    let platform = extractor.name().to_string();

    let response = run_pipeline(&state, extractor.as_ref(), url)
        .await
        .map_err(|e| ApiError::extraction("Failed to process media", &e, Some(&platform)))?;

    if !response.has_playable() {
        return Err(ApiError::NoPlayableMedia {
            detail: NO_PLAYABLE_DETAIL.into(),
            platform,
        });
    }

    Ok(Json(response))
}

pub async fn get_platform(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<MediaResponse>, ApiError> {
    let extractor = state
        .registry
        .find_by_name(&name)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown platform: {}", name)))?;
    let url = query.url()?;
    let display = display_name(extractor.name());

    let response = run_pipeline(&state, extractor.as_ref(), url)
        .await
        .map_err(|e| ApiError::extraction(format!("{} processing failed", display), &e, None))?;

    if !response.has_playable() {
        return Err(ApiError::Extraction {
            error: format!("{} processing failed", display),
            detail: format!("No playable {} formats", display),
            platform: None,
        });
    }

    Ok(Json(response))
}

/// Music services and the secondary video sites; anything else goes to the
/// generic extractor.
pub async fn get_special_media(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<MediaResponse>, ApiError> {
    let url = query.url()?;

    let special = Platform::from_url(url).is_some_and(|p| {
        p.is_music() || matches!(p, Platform::Vimeo | Platform::Dailymotion | Platform::Twitch)
    });
    let extractor = match special.then(|| state.registry.find_platform(url)).flatten() {
        Some(e) => e,
        None => generic(&state)?,
    };

    let response = run_pipeline(&state, extractor.as_ref(), url)
        .await
        .map_err(|e| ApiError::extraction("Failed to process special media", &e, None))?;

    Ok(Json(response))
}
