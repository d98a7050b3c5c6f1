//! Pipeline Orchestrator.
//!
//! Public entry point for a scrape: opens a session, stages every batch the
//! producer yields, commits each record individually and closes the session.
//!
//! ```text
//! open ──▶ empty staging snapshot
//! producer batch ──▶ staging snapshot (all raw records so far)
//!                └─▶ per record: derive id + normalize ──▶ durable commit
//! end of stream ──▶ close ──▶ completed: drop snapshot / otherwise keep it
//! ```

use crate::lifecycle::{ClosedSession, SessionLifecycleManager};
use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use postkeep_core::envelope::{EncryptedEnvelope, EnvelopeSealer};
use postkeep_core::producer::{ProducerRequest, RecordBatchStream, RecordProducer};
use postkeep_core::record::{RawRecord, Record};
use postkeep_core::session::{
    Origin, Session, SessionDraft, SessionKey, SessionKind, SessionStatus,
};
use postkeep_core::staging::{StagingSnapshot, StagingStore};
use postkeep_core::store::{CommitKind, DurableStore, MirrorReport};
use postkeep_core::{PostkeepError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DESIRED_COUNT: usize = 100;

/// Attempts at persisting the terminal header when the store reports a transient error.
const CLOSE_ATTEMPTS: u32 = 3;
const CLOSE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// What to scrape, and for whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub kind: SessionKind,
    pub target: Option<String>,
    pub origin: Origin,
    pub desired_count: usize,
    /// Results will be returned through the encryption envelope
    pub encrypted: bool,
}

impl SessionRequest {
    pub fn new(kind: SessionKind, target: Option<String>, origin: Origin) -> Self {
        Self {
            kind,
            target,
            origin,
            desired_count: DEFAULT_DESIRED_COUNT,
            encrypted: false,
        }
    }

    pub fn with_desired_count(mut self, desired_count: usize) -> Self {
        self.desired_count = desired_count;
        self
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }
}

/// Summary of one finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub origin: Origin,
    pub status: SessionStatus,
    /// Distinct records held by the session at close
    pub records_committed: u64,
    /// Commits that refreshed an already-present record
    pub records_refreshed: u64,
    /// Records rejected or whose commit failed
    pub records_failed: u64,
    /// Ids inserted by this run, in commit order
    pub record_ids: Vec<String>,
    pub staging_retained: bool,
    pub failure: Option<String>,
    pub mirror: Option<MirrorReport>,
    /// False when the terminal header could not be saved; the stored header
    /// still reads `open` and the session stays in the lifecycle cache.
    pub persisted: bool,
}

impl SessionResult {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.session_id.clone(), self.origin)
    }
}

/// Result of re-querying the store for ids a caller expects to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub committed: usize,
    pub missing: Vec<String>,
}

impl Verification {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Records handed to the delegated-API caller.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryPayload {
    Plain(Vec<Record>),
    Sealed(EncryptedEnvelope),
}

#[derive(Default)]
struct RunTally {
    refreshed: u64,
    failed: u64,
    inserted_ids: Vec<String>,
}

pub struct PipelineOrchestrator {
    store: Arc<dyn DurableStore>,
    staging: Arc<dyn StagingStore>,
    lifecycle: SessionLifecycleManager,
}

impl PipelineOrchestrator {
    pub fn new(store: Arc<dyn DurableStore>, staging: Arc<dyn StagingStore>) -> Self {
        let lifecycle = SessionLifecycleManager::new(store.clone(), staging.clone());
        Self {
            store,
            staging,
            lifecycle,
        }
    }

    pub fn lifecycle(&self) -> &SessionLifecycleManager {
        &self.lifecycle
    }

    /// Runs one scrape session end to end.
    ///
    /// Per-record failures are counted in the result and never abort the loop.
    /// A producer error fails the session; records committed before it stand.
    /// Once the session is open a result is always returned, with `persisted`
    /// false if the terminal header never reached the store.
    ///
    /// # Errors
    ///
    /// Only when the session cannot be opened.
    pub async fn run_session(
        &self,
        request: SessionRequest,
        producer: &dyn RecordProducer,
    ) -> Result<SessionResult> {
        let draft = SessionDraft::new(request.kind, request.target.clone(), request.origin)
            .encrypted(request.encrypted);
        let session = self.lifecycle.open(draft).await?;
        let key = session.key();
        // the snapshot exists before the producer can yield or fail
        self.write_staging(&session, &[]).await;

        let producer_request = ProducerRequest {
            kind: request.kind,
            target: request.target.clone(),
            desired_count: request.desired_count,
        };
        let mut batches = producer.produce(&producer_request);

        let mut staged: Vec<RawRecord> = Vec::new();
        let mut tally = RunTally::default();
        let mut mirror = None;

        while let Some(item) = batches.next().await {
            let batch = match item {
                Ok(batch) => batch,
                Err(e) => {
                    if let Err(fail_err) = self.lifecycle.fail(&key, &e.to_string()).await {
                        tracing::error!(
                            "[Pipeline] Could not record failure of {}: {}",
                            key,
                            fail_err
                        );
                    }
                    break;
                }
            };

            staged.extend(batch.iter().cloned());
            self.write_staging(&session, &staged).await;

            for raw in &batch {
                self.commit_one(&key, raw, &mut tally).await;
            }

            match self.lifecycle.refresh_count(&key).await {
                Ok((count, report)) => {
                    tracing::debug!("[Pipeline] {} holds {} record(s) after batch", key, count);
                    mirror = report.or(mirror);
                }
                Err(e) => tracing::warn!("[Pipeline] Could not refresh count for {}: {}", key, e),
            }
        }
        drop(batches);

        let closed = match self.close_with_retry(&key).await {
            Ok(closed) => closed,
            Err(e) => return self.unpersisted_result(&key, tally, mirror, e).await,
        };
        let session = closed.session;

        Ok(SessionResult {
            session_id: session.session_id,
            origin: session.origin,
            status: session.status,
            records_committed: session.committed_count,
            records_refreshed: tally.refreshed,
            records_failed: tally.failed,
            record_ids: tally.inserted_ids,
            staging_retained: closed.staging_retained,
            failure: session.failure,
            mirror: closed.mirror.or(mirror),
            persisted: true,
        })
    }

    async fn close_with_retry(&self, key: &SessionKey) -> Result<ClosedSession> {
        let mut attempt = 1;
        loop {
            match self.lifecycle.close(key).await {
                Ok(closed) => return Ok(closed),
                Err(e) if e.is_transient() && attempt < CLOSE_ATTEMPTS => {
                    tracing::warn!(
                        "[Pipeline] Closing {} failed (attempt {}/{}), retrying: {}",
                        key,
                        attempt,
                        CLOSE_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(CLOSE_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reports a session whose terminal header could not be saved.
    ///
    /// The status is derived from the cached session; staging is left untouched.
    async fn unpersisted_result(
        &self,
        key: &SessionKey,
        tally: RunTally,
        mirror: Option<MirrorReport>,
        error: PostkeepError,
    ) -> Result<SessionResult> {
        let Some(mut session) = self.lifecycle.get(key).await else {
            return Err(error);
        };
        if let Err(e) = session.close(Utc::now()) {
            tracing::debug!("[Pipeline] Could not derive terminal status of {}: {}", key, e);
        }
        tracing::error!(
            "[Pipeline] {} ended as {} but its header was not saved: {}",
            key,
            session.status,
            error
        );

        let staging_retained = matches!(self.staging.read(key).await, Ok(Some(_)));
        Ok(SessionResult {
            session_id: session.session_id,
            origin: session.origin,
            status: session.status,
            records_committed: session.committed_count,
            records_refreshed: tally.refreshed,
            records_failed: tally.failed,
            record_ids: tally.inserted_ids,
            staging_retained,
            failure: session.failure,
            mirror,
            persisted: false,
        })
    }

    /// Writes the full batch-so-far snapshot. A failure is logged; commits proceed.
    async fn write_staging(&self, session: &Session, staged: &[RawRecord]) {
        let snapshot = StagingSnapshot {
            session_id: session.session_id.clone(),
            origin: session.origin,
            kind: session.kind,
            target: session.target.clone(),
            records: staged.to_vec(),
            written_at: Utc::now(),
        };
        if let Err(e) = self.staging.write(&snapshot).await {
            tracing::warn!(
                "[Pipeline] Staging write for {} failed, continuing: {}",
                session.key(),
                e
            );
        }
    }

    async fn commit_one(&self, key: &SessionKey, raw: &RawRecord, tally: &mut RunTally) {
        let record = match Record::from_raw(raw, Utc::now()) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("[Pipeline] Skipping record in {}: {}", key, e);
                tally.failed += 1;
                return;
            }
        };

        // the cached header carries the current status the store checks against
        let Some(session) = self.lifecycle.get(key).await else {
            tally.failed += 1;
            return;
        };

        match self.store.commit_record(&session, &record).await {
            Ok(outcome) => {
                match outcome.kind {
                    CommitKind::Inserted => tally.inserted_ids.push(record.record_id),
                    CommitKind::Refreshed => tally.refreshed += 1,
                }
                if let Err(e) = self.lifecycle.record_commit(key, &outcome).await {
                    tracing::warn!("[Pipeline] Could not update count for {}: {}", key, e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "[Pipeline] Commit of {} into {} failed ({:?}): {}",
                    record.record_id,
                    key,
                    e.class(),
                    e
                );
                tally.failed += 1;
            }
        }
    }

    /// Returns exactly the records the store holds for a session, in commit order.
    pub async fn fetch_committed(&self, key: &SessionKey) -> Result<Vec<Record>> {
        self.store.fetch_committed(key).await
    }

    /// Re-queries the store and reports which expected ids are absent.
    pub async fn verify_committed(
        &self,
        key: &SessionKey,
        expected_ids: &[String],
    ) -> Result<Verification> {
        let records = self.store.fetch_committed(key).await?;
        let present: HashSet<&str> = records.iter().map(|r| r.record_id.as_str()).collect();
        let missing: Vec<String> = expected_ids
            .iter()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            tracing::warn!(
                "[Pipeline] {} is missing {} of {} expected record(s)",
                key,
                missing.len(),
                expected_ids.len()
            );
        }
        Ok(Verification {
            committed: records.len(),
            missing,
        })
    }

    /// Packages a session's committed records for the delegated-API caller.
    ///
    /// With a sealer, the JSON record array is sealed into the encryption envelope.
    pub async fn deliver(
        &self,
        key: &SessionKey,
        sealer: Option<&dyn EnvelopeSealer>,
    ) -> Result<DeliveryPayload> {
        let records = self.store.fetch_committed(key).await?;
        match sealer {
            None => Ok(DeliveryPayload::Plain(records)),
            Some(sealer) => {
                let plaintext = serde_json::to_vec(&records)?;
                let envelope = sealer.seal(&plaintext)?;
                tracing::debug!(
                    "[Pipeline] Sealed {} record(s) for {}",
                    records.len(),
                    key
                );
                Ok(DeliveryPayload::Sealed(envelope))
            }
        }
    }

    /// Replays a retained staging snapshot into a fresh session without re-scraping.
    ///
    /// The old snapshot is deleted once the replay completes; otherwise it is kept.
    pub async fn recover_from_staging(&self, key: &SessionKey) -> Result<SessionResult> {
        let snapshot = self
            .staging
            .read(key)
            .await?
            .ok_or_else(|| PostkeepError::not_found("staging snapshot", key.to_string()))?;

        tracing::info!(
            "[Pipeline] Recovering {} raw record(s) from staging of {}",
            snapshot.records.len(),
            key
        );

        let request = SessionRequest::new(snapshot.kind, snapshot.target.clone(), snapshot.origin)
            .with_desired_count(snapshot.records.len());
        let replay = SnapshotProducer {
            records: snapshot.records,
        };
        let result = self.run_session(request, &replay).await?;

        if result.persisted && result.status == SessionStatus::Completed {
            self.staging.delete(key).await?;
        }
        Ok(result)
    }
}

/// Yields a staged record set as a single batch.
struct SnapshotProducer {
    records: Vec<RawRecord>,
}

impl RecordProducer for SnapshotProducer {
    fn produce(&self, _request: &ProducerRequest) -> RecordBatchStream<'_> {
        stream::iter(vec![Ok(self.records.clone())]).boxed()
    }
}
