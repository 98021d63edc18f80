//! Bounded-concurrency fan-out of the record pipeline over a batch.

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::pipeline::RecordPipeline;
use crate::record::BusinessRecord;
use crate::TARGET_PIPELINE;

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Snapshot sent to a [`ProgressSink`] each time a record finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub message: String,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &BatchProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&BatchProgress) + Send + Sync,
{
    fn report(&self, progress: &BatchProgress) {
        self(progress)
    }
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: &BatchProgress) {}
}

/// A record that produced no output row.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub index: usize,
    pub legal_name: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Enriched records, in input order.
    pub records: Vec<BusinessRecord>,
    /// Failures, ordered by input index.
    pub failures: Vec<RecordFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.records.len() + self.failures.len()
    }
}

struct Tracker {
    completed: AtomicUsize,
    total: usize,
    sink: Arc<dyn ProgressSink>,
}

impl Tracker {
    fn finish(&self, message: String) {
        let processed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.sink.report(&BatchProgress {
            processed,
            total: self.total,
            message,
        });
    }
}

/// Runs `pipeline` over every record with at most `concurrency` in flight.
///
/// Records failing validation are rejected before they start. A record whose
/// task panics is reported as a failure and the rest of the batch carries on.
pub async fn process_batch(
    pipeline: Arc<RecordPipeline>,
    records: Vec<BusinessRecord>,
    concurrency: usize,
    progress: Arc<dyn ProgressSink>,
) -> BatchReport {
    let total = records.len();
    let concurrency = concurrency.max(1);
    info!(target: TARGET_PIPELINE, "Processing {} records with concurrency {}", total, concurrency);

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let tracker = Arc::new(Tracker {
        completed: AtomicUsize::new(0),
        total,
        sink: progress,
    });

    let mut failures = Vec::new();
    let mut tasks = Vec::with_capacity(total);

    for (index, record) in records.into_iter().enumerate() {
        if let Err(err) = record.validate() {
            warn!(target: TARGET_PIPELINE, "Rejecting record {} ('{}'): {}", index, record.legal_name, err);
            tracker.finish(format!("Rejected record {}", index));
            failures.push(RecordFailure {
                index,
                legal_name: record.legal_name,
                error: err.to_string(),
            });
            continue;
        }

        let legal_name = record.legal_name.clone();
        let pipeline = pipeline.clone();
        let semaphore = semaphore.clone();
        let tracker = tracker.clone();

        let handle = tokio::spawn(async move {
            // The semaphore is never closed, so acquiring only waits.
            let _permit = semaphore.acquire_owned().await.ok();
            let enriched = pipeline.run(record).await;
            tracker.finish(format!("Processed {}", enriched.legal_name));
            enriched
        });
        tasks.push((index, legal_name, handle));
    }

    let results = join_all(
        tasks
            .into_iter()
            .map(|(index, legal_name, handle)| async move { (index, legal_name, handle.await) }),
    )
    .await;

    let mut slots: Vec<Option<BusinessRecord>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);

    for (index, legal_name, result) in results {
        match result {
            Ok(enriched) => slots[index] = Some(enriched),
            Err(err) => {
                error!(target: TARGET_PIPELINE, "Record {} ('{}') aborted: {}", index, legal_name, err);
                tracker.finish(format!("Failed {}", legal_name));
                failures.push(RecordFailure {
                    index,
                    legal_name,
                    error: err.to_string(),
                });
            }
        }
    }

    failures.sort_by_key(|failure| failure.index);
    let records: Vec<BusinessRecord> = slots.into_iter().flatten().collect();

    info!(target: TARGET_PIPELINE, "Batch finished: {} enriched, {} failed", records.len(), failures.len());
    BatchReport { records, failures }
}
