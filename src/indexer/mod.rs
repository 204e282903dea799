// Indexer module
// Drains the embedding job queue into the vector store in the background

pub mod consistency;
pub mod queue;


use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

use crate::CofounderError;
use crate::database::lancedb::{INDEX_THRESHOLD_ROWS, VectorStore};
use crate::database::sqlite::{EmbeddingJob, JobOperation, JobStatus};
use crate::rag::{PipelineError, RetrievalPipeline};

pub use consistency::{ConsistencyReport, ConsistencyValidator, SpaceConsistencyIssue};
pub use queue::{EmbeddingQueue, QueueConfig, QueueStats};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Statistics about one pass over the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub jobs_processed: usize,
    pub embeddings_stored: usize,
    pub embeddings_removed: usize,
    pub retries_scheduled: usize,
    pub jobs_failed: usize,
    /// Failed jobs dropped because a newer job for the same source exists
    pub jobs_superseded: usize,
}

/// Background worker turning queued jobs into embedding writes
#[derive(Clone)]
pub struct BackgroundIndexer {
    queue: EmbeddingQueue,
    pipeline: RetrievalPipeline,
    vector_store: Option<Arc<VectorStore>>,
}

impl BackgroundIndexer {
    #[inline]
    pub fn new(queue: EmbeddingQueue, pipeline: RetrievalPipeline) -> Self {
        Self {
            queue,
            pipeline,
            vector_store: None,
        }
    }

    /// Let periodic maintenance build the vector index once the table grows
    #[inline]
    pub fn with_vector_store(mut self, vector_store: Arc<VectorStore>) -> Self {
        self.vector_store = Some(vector_store);
        self
    }

    #[inline]
    pub fn queue(&self) -> &EmbeddingQueue {
        &self.queue
    }

    /// Process every job that is currently due, batch by batch
    #[inline]
    pub async fn process_pending(&self) -> Result<IndexingStats> {
        let mut stats = IndexingStats::default();

        loop {
            let batch = self.queue.claim_next_batch().await?;
            if batch.is_empty() {
                break;
            }

            for job in batch {
                stats.jobs_processed += 1;

                match self.process_job(&job).await {
                    Ok(()) => {
                        self.queue.mark_completed(job.id).await?;
                        match job.operation {
                            JobOperation::Upsert => stats.embeddings_stored += 1,
                            JobOperation::Delete => stats.embeddings_removed += 1,
                        }
                    }
                    Err(e) => {
                        warn!("Embedding job {} for {} failed: {}", job.id, job.source_key(), e);
                        let retryable = e
                            .downcast_ref::<PipelineError>()
                            .is_none_or(PipelineError::is_retryable);

                        let status = if retryable {
                            self.queue
                                .mark_failed_with_retry(job.id, &e.to_string())
                                .await?
                        } else {
                            self.queue.mark_failed(job.id, &e.to_string()).await?;
                            JobStatus::Failed
                        };

                        match status {
                            JobStatus::Failed => stats.jobs_failed += 1,
                            JobStatus::Completed => stats.jobs_superseded += 1,
                            _ => stats.retries_scheduled += 1,
                        }
                    }
                }
            }
        }

        if stats.jobs_processed > 0 {
            info!(
                "Processed {} embedding jobs: {} stored, {} removed, {} retrying, {} failed, {} superseded",
                stats.jobs_processed,
                stats.embeddings_stored,
                stats.embeddings_removed,
                stats.retries_scheduled,
                stats.jobs_failed,
                stats.jobs_superseded
            );
        }

        Ok(stats)
    }

    async fn process_job(&self, job: &EmbeddingJob) -> Result<()> {
        debug!("Processing {:?} job {} for {}", job.operation, job.id, job.source_key());

        match job.operation {
            JobOperation::Upsert => {
                let content = job.content.as_deref().ok_or_else(|| {
                    CofounderError::Indexer(format!("Upsert job {} has no content", job.id))
                })?;
                self.pipeline
                    .index_source(job.source_type, &job.source_id, content, &job.space_id)
                    .await?;
            }
            JobOperation::Delete => {
                self.pipeline
                    .remove_source(job.source_type, &job.source_id)
                    .await?;
            }
        }

        Ok(())
    }

    /// Reset stuck jobs, prune finished ones and build the vector index when due
    #[inline]
    pub async fn run_maintenance(&self) {
        if let Err(e) = self.queue.reset_stuck_items().await {
            error!("Failed to reset stuck embedding jobs: {}", e);
        }

        if let Err(e) = self.queue.cleanup_old_items().await {
            error!("Failed to clean up old embedding jobs: {}", e);
        }

        if let Some(vector_store) = &self.vector_store {
            match vector_store.ensure_vector_index(INDEX_THRESHOLD_ROWS).await {
                Ok(true) => info!("Built vector index for embeddings table"),
                Ok(false) => {}
                Err(e) => warn!("Failed to build vector index: {}", e),
            }
        }
    }

    /// Work until `shutdown` turns true or its sender is dropped.
    ///
    /// Wakes on every enqueue, and otherwise every `poll_interval_ms` to pick up
    /// retries that have become due.
    #[inline]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let notify = self.queue.notifier();
        let poll_interval = self.queue.config().poll_interval();
        let mut maintenance = interval(MAINTENANCE_INTERVAL);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting background indexer");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.process_pending().await {
                error!("Error in indexing loop: {}", e);
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = notify.notified() => {}
                () = sleep(poll_interval) => {}
                _ = maintenance.tick() => self.run_maintenance().await,
            }
        }

        info!("Background indexer stopped");
        Ok(())
    }
}
