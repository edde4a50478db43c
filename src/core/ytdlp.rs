use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

use crate::core::dependencies::{bin_name, find_tool, managed_bin_dir};
use crate::models::error::ExtractError;
use crate::models::media::{MediaFormat, MediaInfo};
use crate::models::settings::ExtractionSettings;

static YTDLP_PATH: OnceCell<PathBuf> = OnceCell::const_new();

const LOGIN_MARKERS: &[&str] = &[
    "sign in to confirm",
    "login_required",
    "login required",
    "private",
];

const VIDEO_EXTS: &[&str] = &["mp4", "m4v", "webm", "mov", "flv", "3gp"];
const AUDIO_EXTS: &[&str] = &["mp3", "m4a", "aac", "ogg", "opus", "wav", "flac"];

/// Which yt-dlp formats become candidates, in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// mp4/m4v with audio and video, then mp4/m4v with video, then anything.
    ProgressiveFirst,
    AnyWithUrl,
    /// Formats carrying audio, highest bitrate first.
    AudioOnly,
}

#[derive(Debug, Clone)]
pub struct YtdlpOptions {
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub cookies_file: Option<PathBuf>,
    pub format: Option<String>,
    pub proxy: Option<String>,
    pub extra_flags: Vec<String>,
    pub timeout: Duration,
}

impl Default for YtdlpOptions {
    fn default() -> Self {
        Self {
            referer: None,
            user_agent: None,
            cookies_file: None,
            format: None,
            proxy: None,
            extra_flags: Vec::new(),
            timeout: Duration::from_secs(90),
        }
    }
}

impl YtdlpOptions {
    pub fn from_settings(settings: &ExtractionSettings) -> Self {
        Self {
            user_agent: Some(settings.user_agent.clone()),
            proxy: crate::core::http_client::proxy_url(),
            extra_flags: settings.extra_ytdlp_flags.clone(),
            timeout: Duration::from_secs(settings.ytdlp_timeout_secs.max(1)),
            ..Default::default()
        }
    }

    pub fn referer(mut self, referer: &str) -> Self {
        self.referer = Some(referer.to_string());
        self
    }

    pub fn cookies(mut self, cookies_file: Option<PathBuf>) -> Self {
        self.cookies_file = cookies_file;
        self
    }

    pub fn format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }
}

pub async fn find_ytdlp() -> Option<PathBuf> {
    find_tool("yt-dlp").await
}

/// Resolves the yt-dlp binary once per process, downloading it into the
/// managed bin dir when it is not installed.
pub async fn ensure_ytdlp() -> anyhow::Result<PathBuf> {
    YTDLP_PATH
        .get_or_try_init(|| async {
            if let Some(path) = find_ytdlp().await {
                return Ok(path);
            }
            tracing::info!("yt-dlp not found, downloading a local copy");
            download_ytdlp_binary().await
        })
        .await
        .cloned()
}

async fn download_ytdlp_binary() -> anyhow::Result<PathBuf> {
    let bin_dir = managed_bin_dir();
    tokio::fs::create_dir_all(&bin_dir).await?;
    let target = bin_dir.join(bin_name("yt-dlp"));

    let download_url = if cfg!(target_os = "windows") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos"
    } else {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp"
    };

    let client = crate::core::http_client::apply_global_proxy(reqwest::Client::builder())
        .timeout(Duration::from_secs(120))
        .build()?;

    let response = client.get(download_url).send().await?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download yt-dlp: HTTP {}",
            response.status()
        ));
    }

    let temp_path = bin_dir.join(".yt-dlp_download.tmp");
    {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| anyhow!("Stream error: {}", e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
    }
    tokio::fs::rename(&temp_path, &target).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        tokio::fs::set_permissions(&target, perms).await?;
    }

    tracing::info!("yt-dlp installed to {}", target.display());
    Ok(target)
}

pub fn build_args(url: &str, opts: &YtdlpOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "--dump-single-json",
        "--no-warnings",
        "--no-check-certificates",
        "--no-playlist",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(ref referer) = opts.referer {
        args.push("--referer".into());
        args.push(referer.clone());
    }
    if let Some(ref ua) = opts.user_agent {
        args.push("--user-agent".into());
        args.push(ua.clone());
    }
    if let Some(ref cookies) = opts.cookies_file {
        args.push("--cookies".into());
        args.push(cookies.to_string_lossy().to_string());
    }
    if let Some(ref format) = opts.format {
        args.push("-f".into());
        args.push(format.clone());
    }
    if let Some(ref proxy) = opts.proxy {
        args.push("--proxy".into());
        args.push(proxy.clone());
    }
    args.extend(opts.extra_flags.iter().cloned());

    args.push("--".into());
    args.push(url.to_string());
    args
}

/// Runs `yt-dlp --dump-single-json` and returns the parsed document.
pub async fn dump_info(url: &str, opts: &YtdlpOptions) -> anyhow::Result<Value> {
    let ytdlp = ensure_ytdlp().await?;

    let child = crate::core::process::command(&ytdlp)
        .args(build_args(url, opts))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow!("Failed to start yt-dlp: {}", e))?;

    let output = tokio::time::timeout(opts.timeout, child.wait_with_output())
        .await
        .map_err(|_| anyhow!("yt-dlp timed out after {}s", opts.timeout.as_secs()))?
        .map_err(|e| anyhow!("yt-dlp process failed: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(classify_failure(&stderr));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| anyhow!("yt-dlp returned invalid JSON: {}", e))
}

fn classify_failure(stderr: &str) -> anyhow::Error {
    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR"))
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("unknown error")
        .to_string();

    let lower = stderr.to_lowercase();
    if LOGIN_MARKERS.iter().any(|m| lower.contains(m)) {
        return ExtractError::AuthRequired(message).into();
    }

    anyhow!("yt-dlp failed: {}", message)
}

/// Dumps `url` and maps the result into a [`MediaInfo`].
pub async fn extract(
    url: &str,
    opts: &YtdlpOptions,
    platform: &str,
    default_title: &str,
    selection: Selection,
) -> anyhow::Result<MediaInfo> {
    let json = dump_info(url, opts).await?;
    media_info_from_json(&json, platform, default_title, selection)
}

pub fn media_info_from_json(
    json: &Value,
    platform: &str,
    default_title: &str,
    selection: Selection,
) -> anyhow::Result<MediaInfo> {
    let formats = select_formats(json, selection);
    if formats.is_empty() {
        return Err(ExtractError::NoMedia("yt-dlp returned no usable formats".into()).into());
    }

    let title = str_field(json, "title")
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(default_title);

    Ok(MediaInfo::new(platform, title)
        .with_formats(formats)
        .with_thumbnail(str_field(json, "thumbnail").map(String::from))
        .with_duration(json.get("duration").and_then(|v| v.as_f64())))
}

pub fn select_formats(json: &Value, selection: Selection) -> Vec<MediaFormat> {
    let all: Vec<&Value> = json
        .get("formats")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter(|f| has_url(f)).collect())
        .unwrap_or_default();

    let picked: Vec<&Value> = match selection {
        Selection::ProgressiveFirst => {
            let progressive: Vec<&Value> = all
                .iter()
                .copied()
                .filter(|f| is_mp4(f) && not_none(f, "vcodec") && not_none(f, "acodec"))
                .collect();
            if !progressive.is_empty() {
                progressive
            } else {
                let video: Vec<&Value> = all
                    .iter()
                    .copied()
                    .filter(|f| is_mp4(f) && not_none(f, "vcodec"))
                    .collect();
                if video.is_empty() {
                    all
                } else {
                    video
                }
            }
        }
        Selection::AnyWithUrl => all,
        Selection::AudioOnly => {
            let mut audio: Vec<&Value> = all.into_iter().filter(|f| carries_audio(f)).collect();
            audio.sort_by(|a, b| abr(b).total_cmp(&abr(a)));
            audio
        }
    };

    let mut formats: Vec<MediaFormat> = picked
        .iter()
        .enumerate()
        .map(|(i, f)| format_from_json(f, i, selection))
        .collect();

    if formats.is_empty() {
        if let Some(url) = str_field(json, "url").filter(|u| !u.is_empty()) {
            let mut f = MediaFormat::from_url(url, "best", "Best");
            if selection == Selection::AudioOnly {
                f.has_audio = true;
                f.has_video = false;
                if !f.mime_type.starts_with("audio/") {
                    f.mime_type = "audio/mpeg".into();
                    f.container = "mp3".into();
                }
            }
            formats.push(f);
        }
    }

    formats
}

pub fn format_from_json(f: &Value, index: usize, selection: Selection) -> MediaFormat {
    let url = str_field(f, "url").unwrap_or_default().to_string();
    let protocol = str_field(f, "protocol").unwrap_or_default();
    let is_hls = protocol.starts_with("m3u8") || url.contains(".m3u8");
    let ext = str_field(f, "ext")
        .filter(|e| !e.is_empty() && *e != "unknown_video")
        .unwrap_or("mp4")
        .to_lowercase();

    let vcodec = str_field(f, "vcodec");
    let acodec = str_field(f, "acodec");

    let (has_video, has_audio) = if selection == Selection::AudioOnly {
        (false, true)
    } else {
        let video = match vcodec {
            Some(v) => v != "none",
            None => is_hls || VIDEO_EXTS.contains(&ext.as_str()),
        };
        let audio = match acodec {
            Some(a) => a != "none",
            None => is_hls || VIDEO_EXTS.contains(&ext.as_str()) || AUDIO_EXTS.contains(&ext.as_str()),
        };
        (video, audio)
    };

    let height = f.get("height").and_then(|v| v.as_u64()).map(|h| h as u32);
    let audio_bitrate = f.get("abr").and_then(|v| v.as_f64()).filter(|b| *b > 0.0);

    let quality = if selection == Selection::AudioOnly {
        match audio_bitrate {
            Some(b) => format!("{}kbps", b.round() as u64),
            None => str_field(f, "format_note").unwrap_or("Best").to_string(),
        }
    } else {
        str_field(f, "format_note")
            .filter(|n| !n.is_empty())
            .map(String::from)
            .or_else(|| height.filter(|h| *h > 0).map(|h| format!("{}p", h)))
            .unwrap_or_else(|| "Best".to_string())
    };

    let (mime_type, container) = if is_hls {
        ("application/x-mpegURL".to_string(), "hls".to_string())
    } else {
        let mime = str_field(f, "mime_type")
            .map(String::from)
            .unwrap_or_else(|| mime_for(&ext, has_video));
        (mime, ext.clone())
    };

    let content_length = f
        .get("filesize")
        .and_then(number_as_u64)
        .or_else(|| f.get("filesize_approx").and_then(number_as_u64));

    MediaFormat {
        itag: str_field(f, "format_id")
            .map(String::from)
            .unwrap_or_else(|| index.to_string()),
        quality,
        url,
        mime_type,
        has_audio,
        has_video,
        container,
        content_length,
        height,
        audio_bitrate,
        video_codec: vcodec.map(String::from),
        audio_codec: acodec.map(String::from),
    }
}

fn mime_for(ext: &str, has_video: bool) -> String {
    match (ext, has_video) {
        ("mov", true) => "video/quicktime".into(),
        (e, true) => format!("video/{}", e),
        ("mp3", false) => "audio/mpeg".into(),
        ("m4a", false) | ("mp4", false) => "audio/mp4".into(),
        (e, false) => format!("audio/{}", e),
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(|v| v.as_str())
}

fn number_as_u64(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_f64().map(|f| f as u64))
}

fn has_url(f: &Value) -> bool {
    str_field(f, "url").is_some_and(|u| !u.is_empty())
}

fn is_mp4(f: &Value) -> bool {
    matches!(str_field(f, "ext"), Some("mp4") | Some("m4v"))
}

/// A codec field counts unless it is explicitly `"none"`.
fn not_none(f: &Value, key: &str) -> bool {
    str_field(f, key) != Some("none")
}

fn carries_audio(f: &Value) -> bool {
    match str_field(f, "acodec") {
        Some(a) => a != "none",
        None => str_field(f, "ext").is_some_and(|e| AUDIO_EXTS.contains(&e)),
    }
}

fn abr(f: &Value) -> f64 {
    f.get("abr").and_then(|v| v.as_f64()).unwrap_or(0.0)
}
