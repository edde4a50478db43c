use async_trait::async_trait;

use crate::models::media::MediaInfo;

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Route name, e.g. `"youtube"` for `/api/youtube`.
    fn name(&self) -> &str;
    fn can_handle(&self, url: &str) -> bool;
    async fn extract(&self, url: &str) -> anyhow::Result<MediaInfo>;
}
