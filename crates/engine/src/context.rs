//! State shared by the scheduler and the expensive tier.

use std::sync::{Arc, RwLock};

use ruleguard_core::AnalysisConfig;

use crate::cache::FingerprintCache;
use crate::detector::{FastDetector, FindingSink, ResourceProvider};
use crate::merger::ResultMerger;

pub struct EngineContext {
    config: RwLock<Arc<AnalysisConfig>>,
    pub resources: Arc<dyn ResourceProvider>,
    pub detector: Arc<dyn FastDetector>,
    pub cache: FingerprintCache,
    pub merger: ResultMerger,
}

impl EngineContext {
    pub fn new(
        config: AnalysisConfig,
        resources: Arc<dyn ResourceProvider>,
        detector: Arc<dyn FastDetector>,
        sink: Arc<dyn FindingSink>,
    ) -> Self {
        let cache = FingerprintCache::new(config.cache_ttl(), config.cache_max_entries);
        Self {
            config: RwLock::new(Arc::new(config)),
            resources,
            detector,
            cache,
            merger: ResultMerger::new(sink),
        }
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> Arc<AnalysisConfig> {
        Arc::clone(&self.config.read().expect("config lock poisoned"))
    }

    pub(crate) fn replace_config(&self, config: AnalysisConfig) {
        *self.config.write().expect("config lock poisoned") = Arc::new(config);
    }
}
