use super::context::{AppContext, session_key};
use anyhow::Result;
use postkeep_core::staging::StagingStore;
use postkeep_infrastructure::StartupPolicy;

// Both commands inspect snapshots left by earlier runs, so nothing is purged on open.

pub async fn list(ctx: &AppContext) -> Result<()> {
    let snapshots = ctx
        .staging_store(Some(StartupPolicy::Preserve))
        .await?
        .list()
        .await?;
    if snapshots.is_empty() {
        println!("No retained staging snapshots");
        return Ok(());
    }

    for snapshot in snapshots {
        println!(
            "{:<40} {:<16} {:<10} {:>6}  {}",
            snapshot.session_id,
            snapshot.origin,
            snapshot.kind,
            snapshot.records.len(),
            snapshot.written_at.to_rfc3339()
        );
    }
    Ok(())
}

pub async fn recover(ctx: &AppContext, id: &str, origin: &str) -> Result<()> {
    let key = session_key(id, origin)?;
    let orchestrator = ctx.orchestrator(Some(StartupPolicy::Preserve)).await?;
    let result = orchestrator.recover_from_staging(&key).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
