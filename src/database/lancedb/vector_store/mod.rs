
use super::quote_literal;
use crate::database::{EmbeddingRecord, EmbeddingRepository, NearestMatch, SourceRef, SourceType};
use crate::{CofounderError, config::Config};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    index::Index,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TABLE_NAME: &str = "embeddings";

/// Tables smaller than this are searched with a flat scan
pub const INDEX_THRESHOLD_ROWS: usize = 5000;

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    vector_dimension: usize,
}

fn db_error(context: &str, e: impl std::fmt::Display) -> CofounderError {
    CofounderError::Database(format!("{context}: {e}"))
}

impl VectorStore {
    /// Open the store under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, CofounderError> {
        Self::open(&config.vector_database_path(), config.embedding_dimension()).await
    }

    /// Open or create the store at `path` for vectors of `dimension` entries.
    ///
    /// An existing table built for another dimension is rejected rather than
    /// silently replaced, see [`VectorStore::reset`].
    #[inline]
    pub async fn open(path: &Path, dimension: usize) -> Result<Self, CofounderError> {
        debug!("Initializing LanceDB at path: {:?}", path);

        std::fs::create_dir_all(path)
            .map_err(|e| db_error("Failed to create vector database directory", e))?;

        let uri = path.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| db_error("Failed to connect to LanceDB", e))?;

        let store = Self {
            connection,
            vector_dimension: dimension,
        };
        store.initialize_table().await?;

        info!("Vector store initialized with {} dimensions", dimension);
        Ok(store)
    }

    async fn initialize_table(&self) -> Result<(), CofounderError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables", e))?;

        if table_names.iter().any(|name| name == TABLE_NAME) {
            let existing = self.detect_existing_vector_dimension().await?;
            if existing != self.vector_dimension {
                return Err(CofounderError::Database(format!(
                    "Embeddings table stores {existing}-dimensional vectors but the provider \
                     produces {}; run `cofounder reindex --reset` to rebuild it",
                    self.vector_dimension
                )));
            }
            debug!("Embeddings table already exists with {} dimensions", existing);
            return Ok(());
        }

        self.connection
            .create_empty_table(TABLE_NAME, self.create_schema())
            .execute()
            .await
            .map_err(|e| db_error("Failed to create table", e))?;

        info!(
            "Embeddings table created with {} dimensions",
            self.vector_dimension
        );
        Ok(())
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize, CofounderError> {
        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| db_error("Failed to get table schema", e))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(CofounderError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.vector_dimension as i32,
                ),
                false,
            ),
            Field::new("source_key", DataType::Utf8, false),
            Field::new("source_type", DataType::Utf8, false),
            Field::new("source_id", DataType::Utf8, false),
            Field::new("space_id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<Table, CofounderError> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| db_error("Failed to open table", e))
    }

    fn create_record_batch(&self, record: &EmbeddingRecord) -> Result<RecordBatch, CofounderError> {
        if record.vector.len() != self.vector_dimension {
            return Err(CofounderError::Database(format!(
                "Refusing to store a {}-dimensional vector in a {}-dimensional table",
                record.vector.len(),
                self.vector_dimension
            )));
        }

        let values_array = Float32Array::from(record.vector.clone());
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.vector_dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| db_error("Failed to create vector array", e))?;

        let created_at = record.created_at.to_rfc3339();
        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(vec![record.id.as_str()])),
            Arc::new(vector_array),
            Arc::new(StringArray::from(vec![record.source_key()])),
            Arc::new(StringArray::from(vec![record.source_type.as_str()])),
            Arc::new(StringArray::from(vec![record.source_id.as_str()])),
            Arc::new(StringArray::from(vec![record.space_id.as_str()])),
            Arc::new(StringArray::from(vec![record.content.as_str()])),
            Arc::new(StringArray::from(vec![created_at])),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| db_error("Failed to create record batch", e))
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<NearestMatch>, CofounderError> {
        let ids = string_column(batch, "id")?;
        let source_types = string_column(batch, "source_type")?;
        let source_ids = string_column(batch, "source_id")?;
        let space_ids = string_column(batch, "space_id")?;
        let contents = string_column(batch, "content")?;
        let created_ats = string_column(batch, "created_at")?;

        let distances = batch
            .column_by_name("_distance")
            .ok_or_else(|| CofounderError::Database("Missing _distance column".to_string()))?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| CofounderError::Database("Invalid _distance column type".to_string()))?;

        let mut results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let created_at = DateTime::parse_from_rfc3339(created_ats.value(row))
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| db_error("Invalid created_at value", e))?;

            if distances.is_null(row) {
                return Err(CofounderError::Database(format!(
                    "Search result {} has no distance",
                    ids.value(row)
                )));
            }
            let distance = distances.value(row);

            results.push(NearestMatch {
                id: ids.value(row).to_string(),
                source_type: source_types.value(row).parse()?,
                source_id: source_ids.value(row).to_string(),
                space_id: space_ids.value(row).to_string(),
                content: contents.value(row).to_string(),
                created_at,
                distance,
            });
        }

        Ok(results)
    }

    /// Get the number of stored embeddings, optionally for one space
    #[inline]
    pub async fn count_embeddings(&self, space_id: Option<&str>) -> Result<u64, CofounderError> {
        let table = self.open_table().await?;
        let filter = space_id.map(|id| format!("space_id = {}", quote_literal(id)));

        let count = table
            .count_rows(filter)
            .await
            .map_err(|e| db_error("Failed to count rows", e))?;

        Ok(count as u64)
    }

    /// List the sources that currently have an embedding
    #[inline]
    pub async fn list_sources(
        &self,
        space_id: Option<&str>,
    ) -> Result<Vec<SourceRef>, CofounderError> {
        // A plain scan has no row limit, so rows written meanwhile are not cut off
        let table = self.open_table().await?;
        let mut query = table
            .query()
            .select(Select::columns(&["source_type", "source_id", "space_id"]));
        if let Some(space_id) = space_id {
            query = query.only_if(format!("space_id = {}", quote_literal(space_id)));
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| db_error("Failed to list embeddings", e))?;

        let mut sources = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            let source_types = string_column(&batch, "source_type")?;
            let source_ids = string_column(&batch, "source_id")?;
            let space_ids = string_column(&batch, "space_id")?;
            for row in 0..batch.num_rows() {
                sources.push(SourceRef {
                    source_type: source_types.value(row).parse()?,
                    source_id: source_ids.value(row).to_string(),
                    space_id: space_ids.value(row).to_string(),
                });
            }
        }

        Ok(sources)
    }

    /// Delete every embedding of a space
    #[inline]
    pub async fn delete_space(&self, space_id: &str) -> Result<(), CofounderError> {
        let table = self.open_table().await?;
        table
            .delete(&format!("space_id = {}", quote_literal(space_id)))
            .await
            .map_err(|e| db_error("Failed to delete space embeddings", e))?;

        info!("Deleted embeddings for space: {}", space_id);
        Ok(())
    }

    /// Build an ANN index on the vector column once the table is large enough.
    /// Returns whether a new index was created.
    #[inline]
    pub async fn ensure_vector_index(&self, min_rows: usize) -> Result<bool, CofounderError> {
        let table = self.open_table().await?;

        let indices = table
            .list_indices()
            .await
            .map_err(|e| db_error("Failed to list indices", e))?;
        if indices
            .iter()
            .any(|index| index.columns.iter().any(|column| column == "vector"))
        {
            debug!("Vector index already exists");
            return Ok(false);
        }

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| db_error("Failed to count rows", e))?;
        if rows < min_rows {
            debug!("Skipping vector index, only {} rows stored", rows);
            return Ok(false);
        }

        table
            .create_index(&["vector"], Index::Auto)
            .execute()
            .await
            .map_err(|e| db_error("Failed to create vector index", e))?;

        info!("Vector index created over {} rows", rows);
        Ok(true)
    }

    /// Optimize the vector database by compacting data and updating indices
    #[inline]
    pub async fn optimize(&self) -> Result<(), CofounderError> {
        debug!("Optimizing vector database");

        let table = self.open_table().await?;
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| db_error("Failed to optimize table", e))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    /// Drop all embeddings and recreate the table for the configured dimension
    #[inline]
    pub async fn reset(path: &Path, dimension: usize) -> Result<Self, CofounderError> {
        if path.exists() {
            warn!("Removing vector database at {:?}", path);
            std::fs::remove_dir_all(path)
                .map_err(|e| db_error("Failed to remove vector database", e))?;
        }

        Self::open(path, dimension).await
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, CofounderError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| CofounderError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| CofounderError::Database(format!("Invalid {name} column type")))
}

#[async_trait]
impl EmbeddingRepository for VectorStore {
    fn dimension(&self) -> usize {
        self.vector_dimension
    }

    async fn upsert_embedding(&self, record: EmbeddingRecord) -> Result<(), CofounderError> {
        let record_batch = self.create_record_batch(&record)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        // One commit: the previous row of the source is replaced, never duplicated
        let mut merge_insert = table.merge_insert(&["source_key"]);
        merge_insert
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge_insert
            .execute(Box::new(reader))
            .await
            .map_err(|e| db_error("Failed to upsert embedding", e))?;

        debug!(
            "Stored embedding for {} in space {}",
            record.source_key(),
            record.space_id
        );
        Ok(())
    }

    async fn query_nearest(
        &self,
        vector: &[f32],
        space_id: &str,
        limit: usize,
    ) -> Result<Vec<NearestMatch>, CofounderError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        if vector.len() != self.vector_dimension {
            return Err(CofounderError::Database(format!(
                "Query vector has {} dimensions, table expects {}",
                vector.len(),
                self.vector_dimension
            )));
        }

        debug!(
            "Searching space {} for similar vectors with limit: {}",
            space_id, limit
        );

        let table = self.open_table().await?;
        let results = table
            .vector_search(vector)
            .map_err(|e| db_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(format!("space_id = {}", quote_literal(space_id)))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| db_error("Failed to execute search", e))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?;

        let mut matches = Vec::new();
        for batch in &batches {
            matches.extend(Self::parse_search_batch(batch)?);
        }
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(limit);

        debug!("Found {} matches in space {}", matches.len(), space_id);
        Ok(matches)
    }

    async fn delete_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<(), CofounderError> {
        let table = self.open_table().await?;
        let predicate = format!(
            "source_key = {}",
            quote_literal(&source_type.source_key(source_id))
        );

        table
            .delete(&predicate)
            .await
            .map_err(|e| db_error("Failed to delete embedding", e))?;

        debug!("Deleted embedding for {}", source_type.source_key(source_id));
        Ok(())
    }
}
