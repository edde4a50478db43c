use std::sync::Arc;

use crate::platforms::traits::MediaExtractor;

/// Extractors in priority order. The catch-all generic extractor goes last.
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn MediaExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    pub fn register(&mut self, extractor: Arc<dyn MediaExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn find_platform(&self, url: &str) -> Option<Arc<dyn MediaExtractor>> {
        self.extractors.iter().find(|e| e.can_handle(url)).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn MediaExtractor>> {
        self.extractors
            .iter()
            .find(|e| e.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
