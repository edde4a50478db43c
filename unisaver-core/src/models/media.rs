use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "webm", "mov"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "ogg", "wav"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png", "gif", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Image,
    Mixed,
    Unknown,
}

impl MediaType {
    pub fn from_formats(formats: &[MediaFormat]) -> Self {
        if formats.is_empty() {
            return MediaType::Unknown;
        }

        let has_video = formats.iter().any(|f| f.has_video);
        let images = formats.iter().filter(|f| f.is_image()).count();

        match (has_video, images) {
            (true, 0) => MediaType::Video,
            (true, _) => MediaType::Mixed,
            (false, n) if n == formats.len() => MediaType::Image,
            (false, 0) => MediaType::Audio,
            (false, _) => MediaType::Mixed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Image => "image",
            MediaType::Mixed => "mixed",
            MediaType::Unknown => "unknown",
        }
    }
}

/// One discovered candidate stream or file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub itag: String,
    pub quality: String,
    pub url: String,
    pub mime_type: String,
    pub has_audio: bool,
    pub has_video: bool,
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

impl MediaFormat {
    /// Builds a format from nothing but its URL, guessing the container from
    /// the path extension.
    pub fn from_url(url: impl Into<String>, itag: impl Into<String>, label: &str) -> Self {
        let url = url.into();
        let ext = extension_of(&url).unwrap_or_else(|| "mp4".to_string());
        let (mime_type, has_audio, has_video, container) = describe_extension(&ext);

        Self {
            itag: itag.into(),
            quality: label.to_string(),
            url,
            mime_type,
            has_audio,
            has_video,
            container,
            content_length: None,
            height: None,
            audio_bitrate: None,
            video_codec: None,
            audio_codec: None,
        }
    }

    /// Forces image typing for URLs whose path gives no usable extension.
    pub fn into_image(mut self) -> Self {
        if !self.is_image() {
            self.mime_type = "image/jpeg".into();
            self.container = "jpg".into();
        }
        self.has_audio = false;
        self.has_video = false;
        self
    }

    /// Forces audio-only typing, keeping a known audio container.
    pub fn into_audio(mut self) -> Self {
        if !self.mime_type.starts_with("audio/") {
            self.mime_type = "audio/mpeg".into();
            self.container = "mp3".into();
        }
        self.has_audio = true;
        self.has_video = false;
        self
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video && !self.is_image()
    }

    fn rank(&self) -> (u32, u64) {
        let height = self
            .height
            .filter(|h| *h > 0)
            .unwrap_or_else(|| quality_to_number(&self.quality));
        let bitrate = self.audio_bitrate.map(|b| (b * 1000.0) as u64).unwrap_or(0);
        (height, bitrate)
    }
}

/// Result of one extraction: everything a client needs to play or save the
/// media behind a page URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub platform: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration_seconds: Option<f64>,
    pub media_type: MediaType,
    pub formats: Vec<MediaFormat>,
    pub direct_url: Option<String>,
    pub embed_url: Option<String>,
    pub extracted_by: Option<String>,
}

impl MediaInfo {
    pub fn new(platform: &str, title: impl Into<String>) -> Self {
        Self {
            platform: platform.to_string(),
            title: title.into(),
            thumbnail: None,
            duration_seconds: None,
            media_type: MediaType::Unknown,
            formats: Vec::new(),
            direct_url: None,
            embed_url: None,
            extracted_by: None,
        }
    }

    /// Attaches formats, deriving the media type and the direct URL from them.
    pub fn with_formats(mut self, formats: Vec<MediaFormat>) -> Self {
        self.media_type = MediaType::from_formats(&formats);
        self.direct_url = best_format(&formats).map(|f| f.url.clone());
        self.formats = formats;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail.filter(|t| !t.is_empty());
        self
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration_seconds = duration.filter(|d| *d > 0.0);
        self
    }

    pub fn has_media(&self) -> bool {
        !self.formats.is_empty() || self.direct_url.is_some() || self.embed_url.is_some()
    }

    pub fn best_format(&self) -> Option<&MediaFormat> {
        best_format(&self.formats)
    }
}

/// Picks the format a client should play by default: the tallest format with
/// video, then the highest audio bitrate. Without video, the first format
/// carrying a URL wins.
pub fn best_format(formats: &[MediaFormat]) -> Option<&MediaFormat> {
    let mut best: Option<&MediaFormat> = None;

    for f in formats.iter().filter(|f| !f.url.is_empty() && f.has_video) {
        match best {
            Some(b) if f.rank() <= b.rank() => {}
            _ => best = Some(f),
        }
    }

    best.or_else(|| formats.iter().find(|f| !f.url.is_empty()))
}

/// First run of digits in a quality label, e.g. `"720p"` → 720.
pub fn quality_to_number(quality: &str) -> u32 {
    DIGITS_RE
        .find(quality)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Media extension of a URL path, lowercased, `jpeg` folded into `jpg`.
pub fn extension_of(url: &str) -> Option<String> {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    };

    let last = path.rsplit('/').next().unwrap_or("");
    let ext = last
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .map(|ext| if ext == "jpeg" { "jpg".to_string() } else { ext });

    if let Some(ext) = ext {
        if is_known_extension(&ext) {
            return Some(ext);
        }
    }

    if url.to_lowercase().contains(".mp4") {
        return Some("mp4".to_string());
    }

    None
}

fn is_known_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext)
        || AUDIO_EXTENSIONS.contains(&ext)
        || IMAGE_EXTENSIONS.contains(&ext)
        || ext == "m3u8"
        || ext == "mpd"
}

fn describe_extension(ext: &str) -> (String, bool, bool, String) {
    match ext {
        "m3u8" => ("application/x-mpegURL".into(), true, true, "hls".into()),
        "mpd" => ("application/dash+xml".into(), true, true, "dash".into()),
        "mov" => ("video/quicktime".into(), true, true, "mov".into()),
        e if VIDEO_EXTENSIONS.contains(&e) => (format!("video/{}", e), true, true, e.into()),
        "mp3" => ("audio/mpeg".into(), true, false, "mp3".into()),
        "m4a" => ("audio/mp4".into(), true, false, "m4a".into()),
        e if AUDIO_EXTENSIONS.contains(&e) => (format!("audio/{}", e), true, false, e.into()),
        "jpg" => ("image/jpeg".into(), false, false, "jpg".into()),
        e if IMAGE_EXTENSIONS.contains(&e) => (format!("image/{}", e), false, false, e.into()),
        _ => ("video/mp4".into(), true, true, "mp4".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(url: &str, height: Option<u32>, quality: &str) -> MediaFormat {
        let mut f = MediaFormat::from_url(url, "0", quality);
        f.height = height;
        f
    }

    #[test]
    fn from_url_detects_video() {
        let f = MediaFormat::from_url("https://cdn.example.com/a/clip.MP4?sig=1", "0", "HD");
        assert_eq!(f.container, "mp4");
        assert_eq!(f.mime_type, "video/mp4");
        assert!(f.has_video && f.has_audio);
    }

    #[test]
    fn from_url_detects_image_and_folds_jpeg() {
        let f = MediaFormat::from_url("https://i.pinimg.com/originals/x/y.jpeg", "1", "Original");
        assert_eq!(f.container, "jpg");
        assert_eq!(f.mime_type, "image/jpeg");
        assert!(f.is_image());
        assert!(!f.has_video);
    }

    #[test]
    fn from_url_detects_audio() {
        let f = MediaFormat::from_url("https://cdn.example.com/track.m4a", "2", "Audio");
        assert!(f.is_audio_only());
        assert_eq!(f.mime_type, "audio/mp4");
    }

    #[test]
    fn from_url_hls_playlist() {
        let f = MediaFormat::from_url("https://cdn.example.com/master.m3u8", "0", "Auto");
        assert_eq!(f.container, "hls");
        assert_eq!(f.mime_type, "application/x-mpegURL");
    }

    #[test]
    fn from_url_unknown_defaults_to_mp4() {
        let f = MediaFormat::from_url("https://video.xx.fbcdn.net/v/t42/abc?efg=1", "0", "Best");
        assert_eq!(f.container, "mp4");
        assert!(f.has_video);
    }

    #[test]
    fn extension_found_in_query_mp4_hint() {
        assert_eq!(
            extension_of("https://example.com/stream?file=video.mp4").as_deref(),
            Some("mp4")
        );
    }

    #[test]
    fn media_type_mixed_when_video_and_image() {
        let formats = vec![
            MediaFormat::from_url("https://a/x.mp4", "0", "Original"),
            MediaFormat::from_url("https://a/y.jpg", "1", "Original"),
        ];
        assert_eq!(MediaType::from_formats(&formats), MediaType::Mixed);
    }

    #[test]
    fn media_type_image_and_audio() {
        let images = vec![MediaFormat::from_url("https://a/y.png", "0", "Image")];
        assert_eq!(MediaType::from_formats(&images), MediaType::Image);

        let audio = vec![MediaFormat::from_url("https://a/y.mp3", "0", "128kbps")];
        assert_eq!(MediaType::from_formats(&audio), MediaType::Audio);

        assert_eq!(MediaType::from_formats(&[]), MediaType::Unknown);
    }

    #[test]
    fn best_format_prefers_tallest_video() {
        let formats = vec![
            MediaFormat::from_url("https://a/audio.mp3", "a", "Audio"),
            video("https://a/360.mp4", Some(360), "360p"),
            video("https://a/720.mp4", Some(720), "720p"),
            video("https://a/480.mp4", Some(480), "480p"),
        ];
        assert_eq!(best_format(&formats).unwrap().url, "https://a/720.mp4");
    }

    #[test]
    fn best_format_uses_quality_label_without_height() {
        let formats = vec![
            video("https://a/sd.mp4", None, "360p"),
            video("https://a/hd.mp4", None, "1080p"),
        ];
        assert_eq!(best_format(&formats).unwrap().url, "https://a/hd.mp4");
    }

    #[test]
    fn best_format_keeps_first_on_tie() {
        let formats = vec![
            video("https://a/first.mp4", None, "Original"),
            video("https://a/second.mp4", None, "Alt"),
        ];
        assert_eq!(best_format(&formats).unwrap().url, "https://a/first.mp4");
    }

    #[test]
    fn best_format_skips_empty_urls() {
        let mut empty = video("", Some(2160), "2160p");
        empty.url.clear();
        let formats = vec![empty, MediaFormat::from_url("https://a/y.jpg", "1", "Image")];
        assert_eq!(best_format(&formats).unwrap().url, "https://a/y.jpg");
    }

    #[test]
    fn quality_number_takes_first_digits() {
        assert_eq!(quality_to_number("720p"), 720);
        assert_eq!(quality_to_number("1080p60"), 1080);
        assert_eq!(quality_to_number("Original"), 0);
    }

    #[test]
    fn with_formats_sets_direct_url_and_type() {
        let info = MediaInfo::new("vimeo", "Vimeo Video").with_formats(vec![
            video("https://a/540.mp4", Some(540), "540p"),
            video("https://a/1080.mp4", Some(1080), "1080p"),
        ]);
        assert_eq!(info.media_type, MediaType::Video);
        assert_eq!(info.direct_url.as_deref(), Some("https://a/1080.mp4"));
        assert!(info.has_media());
    }

    #[test]
    fn format_serializes_camel_case() {
        let f = MediaFormat::from_url("https://a/x.mp4", "18", "360p");
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["mimeType"], "video/mp4");
        assert_eq!(json["hasAudio"], true);
        assert!(json.get("contentLength").is_none());
    }

    #[test]
    fn forced_typing() {
        let img = MediaFormat::from_url("https://p16.tiktokcdn.com/obj/abc", "0", "Image").into_image();
        assert_eq!(img.mime_type, "image/jpeg");
        assert!(!img.has_video && img.is_image());

        let png = MediaFormat::from_url("https://a/b.png", "0", "Image").into_image();
        assert_eq!(png.mime_type, "image/png");

        let audio = MediaFormat::from_url("https://a/track", "0", "Audio").into_audio();
        assert_eq!(audio.mime_type, "audio/mpeg");
        assert!(audio.is_audio_only());
    }
}
