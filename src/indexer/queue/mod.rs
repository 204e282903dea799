// Embedding job queue backed by the `embedding_jobs` table
// Every content write lands here first and the background indexer drains it


use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::database::SourceType;
use crate::database::sqlite::{EmbeddingJob, JobOperation, JobStatus};
use crate::rag::content::IndexableSource;

const JOB_COLUMNS: &str = "id, operation, source_type, source_id, space_id, content, status, \
                           retry_count, error_message, available_at, created_at, updated_at";

// Matches jobs that a later enqueue for the same source has overtaken
const NEWER_JOB_EXISTS: &str = "EXISTS (SELECT 1 FROM embedding_jobs AS newer
     WHERE newer.source_type = embedding_jobs.source_type
       AND newer.source_id = embedding_jobs.source_id
       AND newer.id > embedding_jobs.id)";

const SUPERSEDED_MESSAGE: &str = "Superseded by a newer job";

/// Queue processing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of attempts before a job is failed permanently
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (exponential backoff base)
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Jobs claimed per batch
    pub batch_size: usize,
    /// How often the worker looks for due jobs when nothing wakes it
    pub poll_interval_ms: u64,
    /// Jobs processing for longer than this are handed back to the queue
    pub processing_timeout_seconds: u64,
    /// Finished jobs older than this are deleted
    pub cleanup_age_seconds: u64,
}

impl Default for QueueConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay_ms: 1000, // 1 second
            max_retry_delay_ms: 60000,    // 1 minute
            batch_size: 32,
            poll_interval_ms: 2000,
            processing_timeout_seconds: 300, // 5 minutes
            cleanup_age_seconds: 86400,      // 24 hours
        }
    }
}

impl QueueConfig {
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Delay before attempt `retry_count + 1`, doubling from the initial delay
    #[inline]
    pub fn retry_delay_ms(&self, retry_count: u32) -> u64 {
        let factor = 2_u64.saturating_pow(retry_count.saturating_sub(1));
        self.initial_retry_delay_ms
            .saturating_mul(factor)
            .min(self.max_retry_delay_ms)
    }
}

/// Queue statistics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending_count: u64,
    pub processing_count: u64,
    pub completed_count: u64,
    pub failed_count: u64,
    pub total_count: u64,
    pub oldest_pending_age_seconds: Option<u64>,
    pub retry_rate_percent: f32,
}

/// Durable queue of embedding writes
#[derive(Debug, Clone)]
pub struct EmbeddingQueue {
    pool: SqlitePool,
    config: QueueConfig,
    notify: Arc<Notify>,
}

impl EmbeddingQueue {
    #[inline]
    pub fn new(pool: SqlitePool, config: QueueConfig) -> Self {
        Self {
            pool,
            config,
            notify: Arc::new(Notify::new()),
        }
    }

    #[inline]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Signalled whenever a job is enqueued
    #[inline]
    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Queue (re)embedding of a source
    #[inline]
    pub async fn enqueue_upsert(&self, source: &IndexableSource) -> Result<EmbeddingJob> {
        self.enqueue(
            JobOperation::Upsert,
            source.source_type,
            &source.source_id,
            &source.space_id,
            Some(&source.content),
        )
        .await
    }

    /// Queue removal of a source's embedding
    #[inline]
    pub async fn enqueue_delete(
        &self,
        source_type: SourceType,
        source_id: &str,
        space_id: &str,
    ) -> Result<EmbeddingJob> {
        self.enqueue(JobOperation::Delete, source_type, source_id, space_id, None)
            .await
    }

    /// Replace any job still waiting for the same source with a new one
    async fn enqueue(
        &self,
        operation: JobOperation,
        source_type: SourceType,
        source_id: &str,
        space_id: &str,
        content: Option<&str>,
    ) -> Result<EmbeddingJob> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin enqueue transaction")?;

        let superseded = sqlx::query(
            "DELETE FROM embedding_jobs
             WHERE source_type = ? AND source_id = ? AND status IN ('pending', 'failed')",
        )
        .bind(source_type)
        .bind(source_id)
        .execute(&mut *tx)
        .await
        .context("Failed to supersede queued jobs")?
        .rows_affected();

        let job = sqlx::query_as::<_, EmbeddingJob>(&format!(
            "INSERT INTO embedding_jobs
             (operation, source_type, source_id, space_id, content, status, retry_count,
              available_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(operation)
        .bind(source_type)
        .bind(source_id)
        .bind(space_id)
        .bind(content)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert embedding job")?;

        tx.commit()
            .await
            .context("Failed to commit enqueue transaction")?;

        if superseded > 0 {
            debug!(
                "Job {} superseded {} queued jobs for {}",
                job.id,
                superseded,
                job.source_key()
            );
        }
        debug!("Enqueued {:?} job {} for {}", operation, job.id, job.source_key());

        self.notify.notify_one();
        Ok(job)
    }

    #[inline]
    pub async fn get_job(&self, id: i64) -> Result<Option<EmbeddingJob>> {
        sqlx::query_as::<_, EmbeddingJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM embedding_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get embedding job")
    }

    /// Claim up to `batch_size` due jobs, oldest first.
    ///
    /// A job is only returned if this call moved it from pending to processing.
    #[inline]
    pub async fn claim_next_batch(&self) -> Result<Vec<EmbeddingJob>> {
        let now = Utc::now();

        // A retry waiting behind a newer job for the same source would undo it
        let superseded = sqlx::query(&format!(
            "UPDATE embedding_jobs
             SET status = 'completed', error_message = ?, updated_at = ?
             WHERE status = 'pending' AND {NEWER_JOB_EXISTS}"
        ))
        .bind(SUPERSEDED_MESSAGE)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to retire superseded jobs")?
        .rows_affected();

        if superseded > 0 {
            debug!("Retired {} superseded embedding jobs", superseded);
        }

        let candidates = sqlx::query_as::<_, EmbeddingJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM embedding_jobs
             WHERE status = 'pending' AND available_at <= ?
             ORDER BY id ASC
             LIMIT ?"
        ))
        .bind(now)
        .bind(i64::try_from(self.config.batch_size).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to get next batch from queue")?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for mut job in candidates {
            let updated = sqlx::query(
                "UPDATE embedding_jobs SET status = 'processing', updated_at = ?
                 WHERE id = ? AND status = 'pending'",
            )
            .bind(now)
            .bind(job.id)
            .execute(&self.pool)
            .await
            .context("Failed to claim embedding job")?
            .rows_affected();

            if updated == 1 {
                job.status = JobStatus::Processing;
                job.updated_at = now;
                claimed.push(job);
            }
        }

        if !claimed.is_empty() {
            debug!("Claimed batch of {} embedding jobs", claimed.len());
        }
        Ok(claimed)
    }

    #[inline]
    pub async fn mark_completed(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE embedding_jobs SET status = 'completed', error_message = NULL, updated_at = ?
             WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark job as completed")?;

        debug!("Marked embedding job {} as completed", id);
        Ok(())
    }

    /// Fail a job permanently, counting this attempt
    #[inline]
    pub async fn mark_failed(&self, id: i64, error_message: &str) -> Result<()> {
        let retry_count: i64 = sqlx::query_scalar(
            "UPDATE embedding_jobs
             SET status = 'failed', retry_count = retry_count + 1, error_message = ?,
                 updated_at = ?
             WHERE id = ?
             RETURNING retry_count",
        )
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job as permanently failed")?;

        warn!(
            "Embedding job {} permanently failed after {} attempts: {}",
            id, retry_count, error_message
        );
        Ok(())
    }

    /// Complete the job if a newer one for the same source exists
    async fn retire_if_superseded(&self, id: i64) -> Result<bool> {
        let retired = sqlx::query(&format!(
            "UPDATE embedding_jobs
             SET status = 'completed', error_message = ?, updated_at = ?
             WHERE id = ? AND {NEWER_JOB_EXISTS}"
        ))
        .bind(SUPERSEDED_MESSAGE)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to retire superseded job")?
        .rows_affected();

        if retired > 0 {
            debug!("Embedding job {} was superseded, dropping its retry", id);
        }
        Ok(retired > 0)
    }

    /// Record a failed attempt, scheduling a retry with exponential backoff or
    /// failing the job once its attempts are used up. Returns the new status.
    ///
    /// A job overtaken by a newer one for the same source is completed instead,
    /// so its retry can never overwrite the newer result.
    #[inline]
    pub async fn mark_failed_with_retry(&self, id: i64, error_message: &str) -> Result<JobStatus> {
        if self.retire_if_superseded(id).await? {
            return Ok(JobStatus::Completed);
        }

        let retry_count: i64 =
            sqlx::query_scalar("SELECT retry_count FROM embedding_jobs WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to get current job for retry logic")?;

        let new_retry_count = retry_count + 1;
        let now = Utc::now();

        if new_retry_count >= i64::from(self.config.max_retries) {
            self.mark_failed(id, error_message).await?;
            return Ok(JobStatus::Failed);
        }

        let delay_ms = self
            .config
            .retry_delay_ms(u32::try_from(new_retry_count).unwrap_or(u32::MAX));
        let available_at = now
            + chrono::Duration::milliseconds(i64::try_from(delay_ms).unwrap_or(i64::MAX));

        sqlx::query(
            "UPDATE embedding_jobs
             SET status = 'pending', retry_count = ?, error_message = ?, available_at = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(new_retry_count)
        .bind(error_message)
        .bind(available_at)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to schedule job for retry")?;

        info!(
            "Embedding job {} scheduled for retry {} after {}ms: {}",
            id, new_retry_count, delay_ms, error_message
        );
        Ok(JobStatus::Pending)
    }

    /// Source keys with a job that has not finished yet
    #[inline]
    pub async fn queued_source_keys(&self) -> Result<HashSet<String>> {
        let rows: Vec<(SourceType, String)> = sqlx::query_as(
            "SELECT source_type, source_id FROM embedding_jobs
             WHERE status IN ('pending', 'processing')",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list queued sources")?;

        Ok(rows
            .into_iter()
            .map(|(source_type, source_id)| source_type.source_key(&source_id))
            .collect())
    }

    #[inline]
    pub async fn stats(&self) -> Result<QueueStats> {
        let (pending, processing, completed, failed, total, retried): (
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            i64,
            Option<i64>,
        ) = sqlx::query_as(
            "SELECT
                SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                COUNT(*),
                SUM(CASE WHEN retry_count > 0 THEN 1 ELSE 0 END)
             FROM embedding_jobs",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to get queue statistics")?;

        let oldest_pending: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MIN(created_at) FROM embedding_jobs WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to get oldest pending job")?;

        let count = |value: Option<i64>| u64::try_from(value.unwrap_or(0)).unwrap_or(0);
        let total_count = count(Some(total));
        let retry_rate_percent = if total_count > 0 {
            (count(retried) as f32 / total_count as f32) * 100.0
        } else {
            0.0
        };

        Ok(QueueStats {
            pending_count: count(pending),
            processing_count: count(processing),
            completed_count: count(completed),
            failed_count: count(failed),
            total_count,
            oldest_pending_age_seconds: oldest_pending.map(|created_at| {
                Utc::now()
                    .signed_duration_since(created_at)
                    .num_seconds()
                    .max(0)
                    .unsigned_abs()
            }),
            retry_rate_percent,
        })
    }

    /// Delete finished jobs older than `cleanup_age_seconds`
    #[inline]
    pub async fn cleanup_old_items(&self) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::seconds(
                i64::try_from(self.config.cleanup_age_seconds).unwrap_or(i64::MAX),
            );

        let deleted_count = sqlx::query(
            "DELETE FROM embedding_jobs
             WHERE status IN ('completed', 'failed') AND updated_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("Failed to cleanup old queue items")?
        .rows_affected();

        if deleted_count > 0 {
            info!("Cleaned up {} old embedding jobs", deleted_count);
        }
        Ok(deleted_count)
    }

    /// Hand jobs stuck in processing longer than the timeout back to the queue
    #[inline]
    pub async fn reset_stuck_items(&self) -> Result<u64> {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::seconds(
                i64::try_from(self.config.processing_timeout_seconds).unwrap_or(i64::MAX),
            );

        let reset_count = sqlx::query(
            "UPDATE embedding_jobs SET status = 'pending', available_at = ?, updated_at = ?
             WHERE status = 'processing' AND updated_at < ?",
        )
        .bind(now)
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("Failed to reset stuck processing items")?
        .rows_affected();

        if reset_count > 0 {
            warn!("Reset {} stuck embedding jobs", reset_count);
        }
        Ok(reset_count)
    }
}
