use anyhow::{Context, Result};
use postkeep_application::PipelineOrchestrator;
use postkeep_core::config::AppConfig;
use postkeep_core::session::{Origin, SessionKey};
use postkeep_core::staging::StagingStore;
use postkeep_core::store::DurableStore;
use postkeep_infrastructure::{
    ConfigService, PostkeepPaths, StartupPolicy, build_durable_store, build_staging_store,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Resolved configuration and storage locations for one CLI invocation.
pub struct AppContext {
    pub config: AppConfig,
    pub paths: PostkeepPaths,
}

impl AppContext {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = ConfigService::new(config_path)
            .get_config()
            .context("Failed to load configuration")?;
        let paths = PostkeepPaths::from_config(&config).context("Failed to resolve data directory")?;
        Ok(Self { config, paths })
    }

    pub async fn durable_store(&self) -> Result<Arc<dyn DurableStore>> {
        build_durable_store(&self.config, &self.paths)
            .await
            .context("Failed to open durable store")
    }

    /// Staging store; `None` applies the configured startup policy.
    pub async fn staging_store(&self, policy: Option<StartupPolicy>) -> Result<Arc<dyn StagingStore>> {
        build_staging_store(&self.config, &self.paths, policy)
            .await
            .context("Failed to open staging store")
    }

    pub async fn orchestrator(&self, policy: Option<StartupPolicy>) -> Result<PipelineOrchestrator> {
        let store = self.durable_store().await?;
        let staging = self.staging_store(policy).await?;
        Ok(PipelineOrchestrator::new(store, staging))
    }
}

pub fn session_key(id: &str, origin: &str) -> Result<SessionKey> {
    let origin: Origin = origin.parse()?;
    Ok(SessionKey::new(id, origin))
}
