use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const MAX_NAME_CHARS: usize = 180;

pub fn sanitize_path_component(name: &str) -> String {
    let name: String = name.nfc().collect();
    let name = name.trim().replace(['\t', '\n', '\r'], "");
    let name = WS_RE.replace_all(&name, " ");
    let name = name.replace(" | ", "｜");

    let name = name.trim_end_matches([' ', '-', '.', ';']);

    let forbidden: &[(char, char)] = &[
        ('<', '＜'),
        ('>', '＞'),
        (':', '꞉'),
        ('"', '＂'),
        ('/', '⧸'),
        ('\\', '＼'),
        ('|', '｜'),
        ('?', '？'),
        ('*', ' '),
    ];

    let mut result = name.to_string();
    for (from, to) in forbidden {
        result = result.replace(*from, &to.to_string());
    }

    result.trim().to_string()
}

/// Cleans a client-supplied download name and keeps its extension, falling
/// back to `media.<default_ext>` when nothing usable is left.
pub fn download_name(raw: &str, default_ext: &str) -> String {
    let cleaned = sanitize_filename::sanitize(sanitize_path_component(raw));
    let cleaned = cleaned.trim_start_matches('.').trim();

    if cleaned.is_empty() {
        return format!("media.{}", default_ext);
    }

    let (stem, ext) = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && is_extension(ext) => (stem.to_string(), ext.to_lowercase()),
        _ => (cleaned.to_string(), default_ext.to_string()),
    };

    let stem: String = stem.chars().take(MAX_NAME_CHARS).collect();
    format!("{}.{}", stem.trim_end(), ext)
}

/// Short ASCII alphanumeric run with at least one letter: `mp4`, `m4a`, `3gp`.
/// Version suffixes such as the `2` in `v1.2` do not count.
fn is_extension(ext: &str) -> bool {
    (1..=5).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && ext.chars().any(|c| c.is_ascii_alphabetic())
}

/// Last path segment of `url` when it looks like a file name.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment).ok()?.into_owned();

    let (stem, ext) = decoded.rsplit_once('.')?;
    if stem.is_empty() || !is_extension(ext) {
        return None;
    }
    Some(decoded)
}

pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let ext = match ct.as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "audio/aac" => "aac",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" => "webm",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/vnd.apple.mpegurl" | "application/x-mpegurl" => "m3u8",
        "application/dash+xml" => "mpd",
        _ => return None,
    };
    Some(ext)
}

/// `Content-Disposition` value with an ASCII `filename` for old clients and
/// an RFC 5987 `filename*` carrying the UTF-8 name.
pub fn content_disposition(disposition: &str, filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition,
        ascii,
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_basic_forbidden_chars() {
        assert_eq!(sanitize_path_component("a:b?c"), "a꞉b？c");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_path_component("hello   world"), "hello world");
    }

    #[test]
    fn sanitize_trims_trailing_punctuation() {
        assert_eq!(sanitize_path_component("file name - "), "file name");
    }

    #[test]
    fn sanitize_unicode_nfc_normalization() {
        let decomposed = "e\u{0301}";
        let result = sanitize_path_component(decomposed);
        assert_eq!(result, "\u{00e9}");
    }

    #[test]
    fn sanitize_windows_forbidden_paths() {
        let chars = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
        for c in chars {
            let input = format!("test{}file", c);
            let result = sanitize_path_component(&input);
            assert!(!result.contains(c), "char '{}' should be replaced", c);
        }
    }

    #[test]
    fn download_name_keeps_extension() {
        assert_eq!(download_name("My Clip.MP4", "mp4"), "My Clip.mp4");
        assert_eq!(download_name("song", "mp3"), "song.mp3");
    }

    #[test]
    fn download_name_ignores_version_suffixes() {
        assert_eq!(download_name("clip v1.2", "mp4"), "clip v1.2.mp4");
        assert_eq!(download_name("take.two!", "mp3"), "take.two!.mp3");
        assert_eq!(download_name("phone.3gp", "mp4"), "phone.3gp");
        assert_eq!(
            filename_from_url("https://cdn.example.com/v/release-1.0").as_deref(),
            None
        );
    }

    #[test]
    fn download_name_strips_traversal() {
        let name = download_name("../../etc/passwd", "mp4");
        assert!(!name.contains('/'));
        assert!(!name.starts_with('.'));
    }

    #[test]
    fn download_name_empty_uses_default() {
        assert_eq!(download_name("   ", "mp3"), "media.mp3");
        assert_eq!(download_name("...", "mp4"), "media.mp4");
    }

    #[test]
    fn download_name_truncates_long_stem() {
        let long = format!("{}.mp4", "a".repeat(400));
        let name = download_name(&long, "mp4");
        assert!(name.ends_with(".mp4"));
        assert!(name.chars().count() <= MAX_NAME_CHARS + 4);
    }

    #[test]
    fn filename_from_url_decodes_last_segment() {
        assert_eq!(
            filename_from_url("https://cdn.example.com/v/My%20Video.mp4?x=1").as_deref(),
            Some("My Video.mp4")
        );
        assert_eq!(filename_from_url("https://cdn.example.com/v/abcdef"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }

    #[test]
    fn content_type_extensions() {
        assert_eq!(extension_for_content_type("video/mp4; codecs=avc1"), Some("mp4"));
        assert_eq!(extension_for_content_type("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for_content_type("application/octet-stream"), None);
    }

    #[test]
    fn content_disposition_has_ascii_and_utf8_names() {
        let value = content_disposition("attachment", "café \"clip\".mp4");
        assert!(value.starts_with("attachment; filename=\"caf_ _clip_.mp4\""));
        assert!(value.contains("filename*=UTF-8''caf%C3%A9%20%22clip%22.mp4"));
    }
}
