// Consistency validation between source rows and stored embeddings
// Ensures every piece of team content has exactly the embedding it should


use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use super::queue::EmbeddingQueue;
use crate::database::{EmbeddingRepository, SourceType};
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::rag::content::{IndexableSource, collect_sources};

/// Consistency check results between SQLite and LanceDB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of embeddable rows in SQLite
    pub sqlite_sources: usize,
    /// Number of embeddings in LanceDB
    pub lancedb_embeddings: usize,
    /// Source keys with no embedding and no queued job
    pub missing_in_vectors: Vec<String>,
    /// Embedding source keys whose source row no longer exists
    pub orphaned_in_vectors: Vec<String>,
    /// Spaces with consistency issues
    pub inconsistent_spaces: Vec<SpaceConsistencyIssue>,
    /// Overall consistency status
    pub is_consistent: bool,
}

/// Consistency issue for a specific space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceConsistencyIssue {
    pub space_id: String,
    pub sqlite_sources: usize,
    pub lancedb_embeddings: usize,
    pub missing_in_vectors: Vec<String>,
    pub orphaned_in_vectors: Vec<String>,
}

/// Performs consistency validation between SQLite and LanceDB
pub struct ConsistencyValidator<'a> {
    database: &'a Database,
    vector_store: &'a VectorStore,
    queue: &'a EmbeddingQueue,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(
        database: &'a Database,
        vector_store: &'a VectorStore,
        queue: &'a EmbeddingQueue,
    ) -> Self {
        Self {
            database,
            vector_store,
            queue,
        }
    }

    /// Compare every source row with the stored embeddings.
    ///
    /// Sources with an unfinished job are in flight and count as neither
    /// missing nor orphaned.
    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        info!("Starting cross-database consistency validation");

        let sources = collect_sources(self.database.pool(), None).await?;
        debug!("Found {} sources in SQLite", sources.len());

        let embeddings = self
            .vector_store
            .list_sources(None)
            .await
            .context("Failed to list stored embeddings")?;
        debug!("Found {} embeddings in LanceDB", embeddings.len());

        let queued = self.queue.queued_source_keys().await?;

        let source_spaces: HashMap<String, String> = sources
            .iter()
            .map(|source| (source.source_key(), source.space_id.clone()))
            .collect();
        let embedding_spaces: HashMap<String, String> = embeddings
            .iter()
            .map(|embedding| (embedding.source_key(), embedding.space_id.clone()))
            .collect();

        let mut missing_in_vectors: Vec<String> = source_spaces
            .keys()
            .filter(|key| !embedding_spaces.contains_key(*key) && !queued.contains(*key))
            .cloned()
            .collect();
        missing_in_vectors.sort();

        let mut orphaned_in_vectors: Vec<String> = embedding_spaces
            .keys()
            .filter(|key| !source_spaces.contains_key(*key) && !queued.contains(*key))
            .cloned()
            .collect();
        orphaned_in_vectors.sort();

        let inconsistent_spaces = Self::check_space_consistency(
            &source_spaces,
            &embedding_spaces,
            &missing_in_vectors,
            &orphaned_in_vectors,
        );

        let is_consistent = missing_in_vectors.is_empty() && orphaned_in_vectors.is_empty();

        let report = ConsistencyReport {
            sqlite_sources: sources.len(),
            lancedb_embeddings: embeddings.len(),
            missing_in_vectors,
            orphaned_in_vectors,
            inconsistent_spaces,
            is_consistent,
        };

        if report.is_consistent {
            info!("Database consistency validation passed");
        } else {
            warn!("Database consistency validation found issues");
            Self::log_consistency_issues(&report);
        }

        Ok(report)
    }

    /// Delete embeddings whose source row is gone
    #[inline]
    pub async fn cleanup_orphaned_embeddings(&self, source_keys: &[String]) -> Result<usize> {
        if source_keys.is_empty() {
            return Ok(0);
        }

        info!(
            "Cleaning up {} orphaned embeddings from LanceDB",
            source_keys.len()
        );

        let mut cleaned_count = 0;
        for source_key in source_keys {
            let Some((source_type, source_id)) = parse_source_key(source_key) else {
                warn!("Skipping malformed source key: {}", source_key);
                continue;
            };

            match self.vector_store.delete_source(source_type, source_id).await {
                Ok(()) => {
                    cleaned_count += 1;
                    debug!("Cleaned up orphaned embedding: {}", source_key);
                }
                Err(e) => {
                    error!("Failed to delete orphaned embedding {}: {}", source_key, e);
                }
            }
        }

        info!(
            "Successfully cleaned up {} orphaned embeddings",
            cleaned_count
        );
        Ok(cleaned_count)
    }

    /// Queue embedding jobs for sources that have none
    #[inline]
    pub async fn regenerate_missing_embeddings(&self, source_keys: &[String]) -> Result<usize> {
        if source_keys.is_empty() {
            return Ok(0);
        }

        info!("Queueing {} missing embeddings", source_keys.len());

        let wanted: HashSet<&str> = source_keys.iter().map(String::as_str).collect();
        let sources: Vec<IndexableSource> = collect_sources(self.database.pool(), None)
            .await?
            .into_iter()
            .filter(|source| wanted.contains(source.source_key().as_str()))
            .collect();

        let mut queued_count = 0;
        for source in &sources {
            match self.queue.enqueue_upsert(source).await {
                Ok(job) => {
                    queued_count += 1;
                    debug!("Queued job {} for {}", job.id, source.source_key());
                }
                Err(e) => {
                    error!("Failed to queue embedding for {}: {}", source.source_key(), e);
                }
            }
        }

        info!("Queued {} embeddings for regeneration", queued_count);
        Ok(queued_count)
    }

    /// Group the issues found by space
    fn check_space_consistency(
        source_spaces: &HashMap<String, String>,
        embedding_spaces: &HashMap<String, String>,
        missing: &[String],
        orphaned: &[String],
    ) -> Vec<SpaceConsistencyIssue> {
        let mut by_space: BTreeMap<&str, SpaceConsistencyIssue> = BTreeMap::new();

        let issue_for = |space_id: &str| -> SpaceConsistencyIssue {
            SpaceConsistencyIssue {
                space_id: space_id.to_string(),
                sqlite_sources: source_spaces.values().filter(|s| *s == space_id).count(),
                lancedb_embeddings: embedding_spaces
                    .values()
                    .filter(|s| *s == space_id)
                    .count(),
                missing_in_vectors: Vec::new(),
                orphaned_in_vectors: Vec::new(),
            }
        };

        for key in missing {
            if let Some(space_id) = source_spaces.get(key) {
                by_space
                    .entry(space_id.as_str())
                    .or_insert_with(|| issue_for(space_id))
                    .missing_in_vectors
                    .push(key.clone());
            }
        }

        for key in orphaned {
            if let Some(space_id) = embedding_spaces.get(key) {
                by_space
                    .entry(space_id.as_str())
                    .or_insert_with(|| issue_for(space_id))
                    .orphaned_in_vectors
                    .push(key.clone());
            }
        }

        by_space.into_values().collect()
    }

    fn log_consistency_issues(report: &ConsistencyReport) {
        if !report.missing_in_vectors.is_empty() {
            warn!(
                "Found {} sources in SQLite missing from LanceDB",
                report.missing_in_vectors.len()
            );
        }

        if !report.orphaned_in_vectors.is_empty() {
            warn!(
                "Found {} orphaned embeddings in LanceDB",
                report.orphaned_in_vectors.len()
            );
        }

        for space_issue in &report.inconsistent_spaces {
            warn!(
                "Space {} has consistency issues: {} SQLite sources, {} LanceDB embeddings",
                space_issue.space_id, space_issue.sqlite_sources, space_issue.lancedb_embeddings
            );
        }
    }
}

/// Split a `TYPE:id` key back into its parts
fn parse_source_key(source_key: &str) -> Option<(SourceType, &str)> {
    let (source_type, source_id) = source_key.split_once(':')?;
    let source_type = SourceType::from_str(source_type).ok()?;
    (!source_id.is_empty()).then_some((source_type, source_id))
}

impl ConsistencyReport {
    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Database is consistent: {} sources in SQLite, {} embeddings in LanceDB",
                self.sqlite_sources, self.lancedb_embeddings
            )
        } else {
            format!(
                "Database inconsistencies found: {} missing in LanceDB, {} orphaned in LanceDB, {} spaces with issues",
                self.missing_in_vectors.len(),
                self.orphaned_in_vectors.len(),
                self.inconsistent_spaces.len()
            )
        }
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_in_vectors.len() + self.orphaned_in_vectors.len()
    }
}
