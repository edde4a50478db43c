use std::path::PathBuf;
use std::process::Stdio;

use unisaver_core::fs_paths::{AppPaths, ServerPaths};

pub fn managed_bin_dir() -> PathBuf {
    ServerPaths.bin_dir()
}

pub fn bin_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

pub async fn find_tool(tool: &str) -> Option<PathBuf> {
    let name = bin_name(tool);

    if let Ok(status) = crate::core::process::command(&name)
        .arg(version_flag_for(tool))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        if status.success() {
            return Some(PathBuf::from(&name));
        }
    }

    let managed = managed_bin_dir().join(&name);
    if managed.exists() {
        return Some(managed);
    }

    None
}

fn version_flag_for(tool: &str) -> &'static str {
    match tool {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    }
}

pub async fn check_version(tool: &str) -> Option<String> {
    let path = find_tool(tool).await?;
    let output = crate::core::process::command(&path)
        .arg(version_flag_for(tool))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    parse_version(tool, &String::from_utf8_lossy(&output.stdout))
}

fn parse_version(tool: &str, stdout: &str) -> Option<String> {
    let first_line = stdout.lines().next()?.trim();
    if first_line.is_empty() {
        return None;
    }

    if tool == "ffmpeg" || tool == "ffprobe" {
        first_line
            .split_whitespace()
            .nth(2)
            .map(|s| s.to_string())
    } else {
        Some(first_line.to_string())
    }
}

/// Startup check of the external tools. Nothing here is fatal: yt-dlp is
/// fetched on first use and ffmpeg only improves some yt-dlp extractions.
pub async fn log_dependency_report() {
    match check_version("yt-dlp").await {
        Some(v) => tracing::info!(version = %v, "yt-dlp available"),
        None => tracing::warn!(
            "yt-dlp not found; a local copy will be downloaded into {} on first use",
            managed_bin_dir().display()
        ),
    }

    match check_version("ffmpeg").await {
        Some(v) => tracing::info!(version = %v, "ffmpeg available"),
        None => tracing::warn!("ffmpeg not found; some yt-dlp formats may be unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffmpeg_version_is_third_word() {
        let out = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers\n";
        assert_eq!(parse_version("ffmpeg", out).as_deref(), Some("6.1.1-3ubuntu5"));
    }

    #[test]
    fn ytdlp_version_is_first_line() {
        assert_eq!(parse_version("yt-dlp", "2024.08.06\n").as_deref(), Some("2024.08.06"));
        assert_eq!(parse_version("yt-dlp", ""), None);
    }

    #[test]
    fn bin_name_matches_target() {
        let name = bin_name("yt-dlp");
        if cfg!(target_os = "windows") {
            assert_eq!(name, "yt-dlp.exe");
        } else {
            assert_eq!(name, "yt-dlp");
        }
    }
}
