use std::sync::LazyLock;
use std::sync::RwLock;
use std::time::Duration;

use unisaver_core::models::settings::ProxySettings;

static GLOBAL_PROXY: LazyLock<RwLock<ProxySettings>> =
    LazyLock::new(|| RwLock::new(ProxySettings::default()));

pub fn init_proxy(proxy: ProxySettings) {
    if let Ok(mut guard) = GLOBAL_PROXY.write() {
        *guard = proxy;
    }
}

pub fn get_proxy_snapshot() -> ProxySettings {
    GLOBAL_PROXY
        .read()
        .map(|g| g.clone())
        .unwrap_or_default()
}

/// Outbound proxy URL, also handed to yt-dlp as `--proxy`.
pub fn proxy_url() -> Option<String> {
    get_proxy_snapshot().url()
}

pub fn apply_proxy(
    builder: reqwest::ClientBuilder,
    proxy: &ProxySettings,
) -> reqwest::ClientBuilder {
    let Some(proxy_url) = proxy.url() else {
        return builder;
    };
    match reqwest::Proxy::all(&proxy_url) {
        Ok(p) => builder.proxy(p),
        Err(e) => {
            tracing::warn!("Invalid proxy URL: {}", e);
            builder
        }
    }
}

pub fn apply_global_proxy(builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
    let proxy = get_proxy_snapshot();
    apply_proxy(builder, &proxy)
}

/// Browser-like client used by the scraping extractors.
pub fn browser_client(user_agent: &str, timeout: Duration) -> reqwest::Client {
    apply_global_proxy(reqwest::Client::builder())
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(15))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_default()
}
