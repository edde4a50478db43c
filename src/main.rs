use unisaver_core::fs_paths::{AppPaths, ServerPaths};

/// Puts the managed tool directory on `PATH` so a downloaded yt-dlp is found
/// like a system one.
fn setup_environment() {
    std::env::remove_var("PYTHONHOME");
    std::env::remove_var("PYTHONPATH");

    let bin_dir = ServerPaths.bin_dir();
    let sep = if cfg!(windows) { ";" } else { ":" };
    let current = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}{}{}", bin_dir.display(), sep, current));

    std::env::set_var("PYTHONIOENCODING", "utf-8");
    std::env::set_var("PYTHONUTF8", "1");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_environment();
    unisaver_lib::run().await
}
