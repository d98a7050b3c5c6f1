use super::context::{AppContext, session_key};
use anyhow::{Result, bail};
use postkeep_core::store::DurableStore;

pub async fn fetch(ctx: &AppContext, id: &str, origin: &str) -> Result<()> {
    let key = session_key(id, origin)?;
    let records = ctx.durable_store().await?.fetch_committed(&key).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

pub async fn list(ctx: &AppContext) -> Result<()> {
    let sessions = ctx.durable_store().await?.list_sessions().await?;
    if sessions.is_empty() {
        println!("No sessions in {}", ctx.paths.sessions_dir().display());
        return Ok(());
    }

    for session in sessions {
        println!(
            "{:<40} {:<16} {:<11} {:<10} {:>6}  {}",
            session.session_id,
            session.origin,
            session.status,
            session.kind,
            session.committed_count,
            session.target.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn delete(ctx: &AppContext, id: &str, origin: &str) -> Result<()> {
    let key = session_key(id, origin)?;
    let store = ctx.durable_store().await?;
    if store.load_session(&key).await?.is_none() {
        bail!("No session {}", key);
    }
    store.delete_session(&key).await?;
    println!("Deleted {}", key);
    Ok(())
}
