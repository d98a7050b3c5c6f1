//! Builds the stores selected by configuration.
//!
//! The backend is chosen once here; everything above works against the
//! `DurableStore` and `StagingStore` traits.

use crate::local_store::LocalDurableStore;
use crate::mirrored_store::MirroredDurableStore;
use crate::paths::PostkeepPaths;
use crate::shared::HttpSharedStore;
use crate::staging_store::{FileStagingStore, StartupPolicy};
use crate::storage::LockOptions;
use postkeep_core::Result;
use postkeep_core::config::AppConfig;
use postkeep_core::shared::SharedStore;
use postkeep_core::staging::StagingStore;
use postkeep_core::store::DurableStore;
use std::sync::Arc;

/// Local store, mirrored to the shared backend when `[shared] enabled = true`.
pub async fn build_durable_store(
    config: &AppConfig,
    paths: &PostkeepPaths,
) -> Result<Arc<dyn DurableStore>> {
    let local = LocalDurableStore::new(paths.sessions_dir(), LockOptions::from(&config.lock)).await?;

    if !config.shared.enabled {
        tracing::debug!("[Factory] Using local durable store at {}", paths.sessions_dir().display());
        return Ok(Arc::new(local));
    }

    let shared = HttpSharedStore::from_config(&config.shared)?;
    if let Err(e) = shared.ping().await {
        tracing::warn!("[Factory] Shared store not reachable at startup, mirroring anyway: {}", e);
    }
    Ok(Arc::new(MirroredDurableStore::new(local, Arc::new(shared))))
}

/// Staging store under `<data_dir>/staging`, purged at startup unless configured otherwise.
pub async fn build_staging_store(
    config: &AppConfig,
    paths: &PostkeepPaths,
    policy: Option<StartupPolicy>,
) -> Result<Arc<dyn StagingStore>> {
    let policy =
        policy.unwrap_or_else(|| StartupPolicy::from_purge_flag(config.staging.purge_on_start));
    let store = FileStagingStore::new(paths.staging_dir(), policy).await?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use postkeep_core::config::SharedConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_backend_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let paths = PostkeepPaths::new(temp_dir.path());
        let store = build_durable_store(&AppConfig::default(), &paths)
            .await
            .unwrap();
        assert_eq!(store.backend_name(), "local");
        assert!(paths.sessions_dir().exists());
    }

    #[tokio::test]
    async fn test_shared_without_url_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let paths = PostkeepPaths::new(temp_dir.path());
        let config = AppConfig {
            shared: SharedConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let err = match build_durable_store(&config, &paths).await {
            Ok(_) => panic!("expected a config error"),
            Err(e) => e,
        };
        assert!(matches!(err, postkeep_core::PostkeepError::Config(_)));
    }

    #[tokio::test]
    async fn test_staging_store_created() {
        let temp_dir = TempDir::new().unwrap();
        let paths = PostkeepPaths::new(temp_dir.path());
        let staging = build_staging_store(&AppConfig::default(), &paths, None)
            .await
            .unwrap();
        assert!(staging.list().await.unwrap().is_empty());
        assert!(paths.staging_dir().exists());
    }
}
