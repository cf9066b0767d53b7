//! Application state shared across handlers.

use depot_content::{ContentManager, PromotionEngine};
use depot_core::EventSink;
use depot_core::config::AppConfig;
use depot_metadata::StoreDataManager;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Content retrieval, uploads and the store definitions behind them.
    pub content: Arc<ContentManager>,
    /// Promotion engine over the same content manager.
    pub promotions: Arc<PromotionEngine>,
}

impl AppState {
    pub fn new(config: AppConfig, content: Arc<ContentManager>, events: Arc<dyn EventSink>) -> Self {
        let promotions = Arc::new(PromotionEngine::new(
            content.clone(),
            events,
            &config.promotion,
        ));
        Self {
            config: Arc::new(config),
            content,
            promotions,
        }
    }

    /// Store definitions.
    pub fn stores(&self) -> &Arc<StoreDataManager> {
        self.content.stores()
    }
}
