use super::context::AppContext;
use super::jsonl::JsonlProducer;
use anyhow::{Context, Result};
use postkeep_application::SessionRequest;
use postkeep_core::session::{Origin, SessionKind};
use std::path::PathBuf;

pub struct RunArgs {
    pub kind: String,
    pub target: Option<String>,
    pub origin: String,
    pub input: PathBuf,
    pub desired_count: Option<usize>,
    pub batch_size: Option<usize>,
}

pub async fn run(ctx: &AppContext, args: RunArgs) -> Result<()> {
    let kind: SessionKind = args.kind.parse()?;
    let origin: Origin = args.origin.parse()?;
    let desired_count = args
        .desired_count
        .unwrap_or(ctx.config.pipeline.desired_count);
    let batch_size = args.batch_size.unwrap_or(ctx.config.pipeline.batch_size);

    let orchestrator = ctx.orchestrator(None).await?;
    let producer = JsonlProducer::new(args.input, batch_size);
    let request = SessionRequest::new(kind, args.target, origin).with_desired_count(desired_count);

    let result = orchestrator
        .run_session(request, &producer)
        .await
        .context("Session could not be run")?;

    if !result.persisted {
        tracing::warn!(
            "Session {} ended as {} but its header could not be saved",
            result.session_id,
            result.status
        );
    }

    let verification = orchestrator
        .verify_committed(&result.key(), &result.record_ids)
        .await?;
    if !verification.is_complete() {
        tracing::warn!(
            "Store is missing {} record(s) reported as committed",
            verification.missing.len()
        );
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
