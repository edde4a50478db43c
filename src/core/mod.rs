pub mod dependencies;
pub mod fallback;
pub mod filename;
pub mod http_client;
pub mod playable;
pub mod process;
pub mod proxy;
pub mod redirect;
pub mod registry;
pub mod scrape;
pub mod ytdlp;
