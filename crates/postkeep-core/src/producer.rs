//! Contract of the external record producer.
//!
//! The browser-automation layer that actually extracts posts lives outside this
//! workspace. It is seen here only as a finite, non-restartable stream of
//! batches.

use crate::error::Result;
use crate::record::RawRecord;
use crate::session::SessionKind;
use futures::stream::BoxStream;

/// What to scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerRequest {
    pub kind: SessionKind,
    pub target: Option<String>,
    /// Upper bound; the producer may yield fewer.
    pub desired_count: usize,
}

/// Stream of record batches. An `Err` item is unrecoverable and ends the session.
pub type RecordBatchStream<'a> = BoxStream<'a, Result<Vec<RawRecord>>>;

pub trait RecordProducer: Send + Sync {
    /// Starts a fresh scrape. Calling it again re-scrapes from scratch.
    fn produce(&self, request: &ProducerRequest) -> RecordBatchStream<'_>;
}
