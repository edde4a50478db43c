use unisaver_core::fs_paths::{AppPaths, ServerPaths};

fn enhanced_path() -> String {
    let bin_dir = ServerPaths.bin_dir();
    let sep = if cfg!(windows) { ";" } else { ":" };
    let current = std::env::var("PATH").unwrap_or_default();
    format!("{}{}{}", bin_dir.display(), sep, current)
}

/// Tokio command with the managed bin dir on `PATH`. The child is killed when
/// the handle is dropped, so an abandoned request never leaves it running.
pub fn command<S: AsRef<std::ffi::OsStr>>(program: S) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(0x08000000);
    cmd.env("PATH", enhanced_path());
    cmd.env("PYTHONIOENCODING", "utf-8");
    cmd.env("PYTHONUTF8", "1");
    cmd.kill_on_drop(true);
    cmd
}
