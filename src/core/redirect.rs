use anyhow::anyhow;

pub async fn resolve_redirect(client: &reqwest::Client, url: &str) -> anyhow::Result<String> {
    let response = client
        .get(url)
        .send()
        .await?;

    let final_url = response.url().to_string();

    if final_url == url {
        return Err(anyhow!("No redirect found for {}", url));
    }

    Ok(final_url)
}

/// Follows a short link (`vm.tiktok.com`, `pin.it`, ...) and falls back to the
/// input when it does not redirect anywhere.
pub async fn expand_short_link(client: &reqwest::Client, url: &str) -> String {
    match resolve_redirect(client, url).await {
        Ok(resolved) => {
            tracing::debug!("short link {} -> {}", url, resolved);
            resolved
        }
        Err(e) => {
            tracing::debug!("short link {} not expanded: {}", url, e);
            url.to_string()
        }
    }
}
