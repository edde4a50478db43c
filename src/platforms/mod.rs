pub use unisaver_core::platforms::Platform;

pub mod traits;

pub mod dailymotion;
pub mod facebook;
pub mod generic_ytdlp;
pub mod instagram;
pub mod music;
pub mod pinterest;
pub mod soundcloud;
pub mod spotify;
pub mod threads;
pub mod tiktok;
pub mod twitch;
pub mod twitter;
pub mod vimeo;
pub mod youtube;
