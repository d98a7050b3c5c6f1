//! Record producer that replays scraper output saved as JSON Lines.

use futures::StreamExt;
use futures::stream;
use postkeep_core::producer::{ProducerRequest, RecordBatchStream, RecordProducer};
use postkeep_core::record::RawRecord;
use postkeep_core::{PostkeepError, Result};
use std::path::{Path, PathBuf};

pub struct JsonlProducer {
    path: PathBuf,
    batch_size: usize,
}

impl JsonlProducer {
    pub fn new(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            path: path.into(),
            batch_size: batch_size.max(1),
        }
    }
}

impl RecordProducer for JsonlProducer {
    fn produce(&self, request: &ProducerRequest) -> RecordBatchStream<'_> {
        let path = self.path.clone();
        let batch_size = self.batch_size;
        let limit = request.desired_count;

        stream::once(async move { read_records(&path, limit).await })
            .flat_map(move |loaded| {
                let batches: Vec<Result<Vec<RawRecord>>> = match loaded {
                    Ok(records) => records
                        .chunks(batch_size)
                        .map(|chunk| Ok(chunk.to_vec()))
                        .collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(batches)
            })
            .boxed()
    }
}

/// Reads up to `limit` records. Lines that do not parse are skipped with a warning.
async fn read_records(path: &Path, limit: usize) -> Result<Vec<RawRecord>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        PostkeepError::producer(format!("cannot read {}: {}", path.display(), e))
    })?;

    let mut records = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if records.len() >= limit {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                "[Jsonl] Skipping line {} of {}: {}",
                line_no + 1,
                path.display(),
                e
            ),
        }
    }
    Ok(records)
}
