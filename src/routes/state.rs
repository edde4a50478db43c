//! Shared application state injected into every handler.

use std::sync::Arc;

use anyhow::Context;

use crate::core::playable::PlayableFilter;
use crate::core::proxy::StreamProxy;
use crate::core::registry::ExtractorRegistry;
use crate::models::settings::{DeliveryMode, Settings};

pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: ExtractorRegistry,
    pub playable: PlayableFilter,
    pub proxy: StreamProxy,
}

impl AppState {
    pub fn new(settings: Settings, registry: ExtractorRegistry) -> anyhow::Result<Self> {
        let playable = PlayableFilter::new(settings.extraction.strict_validate, &settings.extraction.user_agent)
            .context("failed to build the playable-check HTTP client")?;
        let proxy = StreamProxy::new(&settings.extraction.user_agent)
            .context("failed to build the streaming proxy HTTP client")?;

        Ok(Self {
            settings: Arc::new(settings),
            registry,
            playable,
            proxy,
        })
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.settings.delivery.mode
    }
}
