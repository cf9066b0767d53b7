//! Startup wiring: persistence, storage and the content manager.

use crate::state::AppState;
use anyhow::{Context, Result};
use depot_content::ContentManager;
use depot_core::EventSink;
use depot_core::config::AppConfig;
use depot_storage::StoreAccessors;
use std::sync::Arc;

/// Build the application state from configuration.
///
/// Store definitions are loaded from the configured metadata backend before
/// this returns, so the first request already sees every persisted store.
pub async fn build_state(config: AppConfig, events: Arc<dyn EventSink>) -> Result<AppState> {
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let repo = depot_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    if repo.is_none() {
        tracing::warn!("Store definitions are kept in memory and will be lost on restart");
    }

    let accessors = StoreAccessors::from_config(&config.storage, config.content.upstream_timeout())
        .context("failed to initialize storage")?;

    let content = ContentManager::open(repo, events.clone(), Arc::new(accessors), &config.content)
        .await
        .context("failed to load store definitions")?;
    content
        .stores()
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!(
        stores = content.stores().len(),
        index_enabled = config.content.index_enabled,
        "Content manager ready"
    );

    Ok(AppState::new(config, Arc::new(content), events))
}
