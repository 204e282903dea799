use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::config::{Config, ProviderKind};
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::{Database, SpaceQueries};
use crate::indexer::{BackgroundIndexer, ConsistencyValidator, EmbeddingQueue};
use crate::providers::{OllamaClient, build_providers};
use crate::rag::content::collect_sources;
use crate::rag::{ChatRequest, CoFounder, RetrievalPipeline};

/// Everything a command needs, built once from the configuration
#[derive(Clone)]
pub struct Runtime {
    pub config: Config,
    pub database: Database,
    pub vector_store: Arc<VectorStore>,
    pub queue: EmbeddingQueue,
    pub cofounder: CoFounder,
    pub indexer: BackgroundIndexer,
}

/// Connect the datastores and model clients and wire them together
#[inline]
pub async fn build_runtime(config: Config) -> Result<Runtime> {
    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize SQLite database")?;

    let vector_store = Arc::new(
        VectorStore::new(&config)
            .await
            .context("Failed to initialize vector store")?,
    );

    let (embedder, generator) = build_providers(&config)?;

    let pipeline = RetrievalPipeline::new(
        embedder,
        Arc::<VectorStore>::clone(&vector_store),
        config.retrieval.max_content_chars,
    );
    let queue = EmbeddingQueue::new(database.pool().clone(), config.indexer.clone());
    let cofounder = CoFounder::new(pipeline.clone(), generator, &config.retrieval);
    let indexer = BackgroundIndexer::new(queue.clone(), pipeline)
        .with_vector_store(Arc::clone(&vector_store));

    Ok(Runtime {
        config,
        database,
        vector_store,
        queue,
        cofounder,
        indexer,
    })
}

/// Warn early when the configured Ollama server is not ready
async fn check_provider(config: &Config) {
    if config.provider != ProviderKind::Ollama {
        return;
    }

    let ollama = config.ollama.clone();
    let result = tokio::task::spawn_blocking(move || {
        OllamaClient::new(&ollama).and_then(|client| client.health_check())
    })
    .await;

    match result {
        Ok(Ok(())) => info!(
            "✅ Ollama connected at {}:{}",
            config.ollama.host, config.ollama.port
        ),
        Ok(Err(e)) => {
            warn!("⚠️  Ollama is not ready: {:#}", e);
            println!("Warning: Ollama may not be ready. Indexing and chat may fail.");
            println!("Use 'cofounder config' to update connection settings.");
        }
        Err(e) => warn!("Ollama health check did not complete: {}", e),
    }
}

/// Start the HTTP API together with the background indexer
#[inline]
pub async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = config.server.socket_addr()?;

    check_provider(&config).await;

    let runtime = build_runtime(config).await?;

    // Jobs left mid-flight by a previous run go back to the queue
    match runtime.queue.reset_stuck_items().await {
        Ok(0) => {}
        Ok(count) => info!("Re-queued {} interrupted embedding jobs", count),
        Err(e) => warn!("Failed to reset interrupted embedding jobs: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let indexer = runtime.indexer.clone();
    let indexer_handle = tokio::spawn(async move {
        if let Err(e) = indexer.run(shutdown_rx).await {
            error!("Background indexer failed: {}", e);
        }
    });

    let state = AppState {
        database: runtime.database.clone(),
        queue: runtime.queue.clone(),
        cofounder: runtime.cofounder.clone(),
    };
    let router = api::router(state, &runtime.config.server);

    println!("🚀 AI co-founder listening on http://{}", addr);
    println!("Press Ctrl+C to stop the server and background indexer");

    let result = api::serve(router, addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        println!("\n📴 Received interrupt signal, shutting down...");
    })
    .await;

    // The worker finishes its current batch before it sees the flag
    let _ = shutdown_tx.send(true);
    if let Err(e) = indexer_handle.await {
        warn!("⚠️  Error stopping background indexer: {}", e);
    }

    println!("✅ Shutdown complete");
    result
}

/// Ask the co-founder a question from the terminal
#[inline]
pub async fn ask(config: Config, space_id: String, query: String, limit: Option<usize>) -> Result<()> {
    let runtime = build_runtime(config).await?;

    if SpaceQueries::get_by_id(runtime.database.pool(), &space_id)
        .await?
        .is_none()
    {
        warn!("Space {} does not exist, answering without team history", space_id);
    }

    let mut request = ChatRequest::new(space_id, query);
    request.limit = limit;

    let response = runtime
        .cofounder
        .answer(&request)
        .await
        .context("Failed to generate response")?;

    println!("{}", response.answer.trim());

    if !response.context.is_empty() {
        println!();
        println!("Sources:");
        for item in &response.context {
            println!(
                "  [{}] {} ({}, score {:.2})",
                item.source_type,
                first_line(&item.content),
                item.created_at.format("%Y-%m-%d"),
                item.score
            );
        }
    }

    Ok(())
}

fn first_line(content: &str) -> &str {
    content.lines().next().unwrap_or_default()
}

/// Show queue statistics and the size of the vector store
#[inline]
pub async fn show_status(config: Config) -> Result<()> {
    let runtime = build_runtime(config).await?;

    println!("🔍 AI Co-founder Status");
    println!("========================");
    println!();
    println!(
        "🤖 Provider: {} (embedding dimension {})",
        runtime.config.provider,
        runtime.config.embedding_dimension()
    );
    println!("📁 Data directory: {}", runtime.config.get_base_dir().display());
    println!();

    let stats = runtime
        .queue
        .stats()
        .await
        .context("Failed to load queue statistics")?;

    println!("📋 Embedding Queue:");
    println!("   ⏳ Pending: {}", stats.pending_count);
    println!("   🔄 Processing: {}", stats.processing_count);
    println!("   ✅ Completed: {}", stats.completed_count);
    println!("   ❌ Failed: {}", stats.failed_count);
    if let Some(age) = stats.oldest_pending_age_seconds {
        println!("   ⏰ Oldest pending job: {}s", age);
    }
    if stats.total_count > 0 {
        println!("   🔁 Retry rate: {:.1}%", stats.retry_rate_percent);
    }

    println!();
    match runtime.vector_store.count_embeddings(None).await {
        Ok(count) => println!("🧠 Stored embeddings: {}", count),
        Err(e) => println!("🧠 Stored embeddings: unavailable ({})", e),
    }

    if stats.failed_count > 0 {
        println!();
        println!("💡 Run 'cofounder check --fix' to re-queue missing embeddings");
    }

    Ok(())
}

/// Queue every source (of one space, or all of them) and index it now
#[inline]
pub async fn reindex(config: Config, space_id: Option<String>, reset: bool) -> Result<()> {
    if reset {
        VectorStore::reset(&config.vector_database_path(), config.embedding_dimension())
            .await
            .context("Failed to reset vector store")?;
        println!("🗑️  Vector store reset");
    }

    let runtime = build_runtime(config).await?;

    if let Some(space_id) = &space_id {
        SpaceQueries::get_by_id(runtime.database.pool(), space_id)
            .await?
            .with_context(|| format!("Space not found: {space_id}"))?;
    }

    let sources = collect_sources(runtime.database.pool(), space_id.as_deref()).await?;
    if sources.is_empty() {
        println!("Nothing to index.");
        return Ok(());
    }

    for source in &sources {
        runtime.queue.enqueue_upsert(source).await?;
    }
    println!("📥 Queued {} sources for embedding", sources.len());

    let stats = runtime.indexer.process_pending().await?;

    println!("✅ Stored {} embeddings", stats.embeddings_stored);
    if stats.embeddings_removed > 0 {
        println!("🗑️  Removed {} embeddings", stats.embeddings_removed);
    }
    if stats.retries_scheduled > 0 {
        println!(
            "🔁 {} jobs will be retried by the background indexer",
            stats.retries_scheduled
        );
    }
    if stats.jobs_failed > 0 {
        println!("❌ {} jobs failed permanently", stats.jobs_failed);
    }

    if let Err(e) = runtime.vector_store.optimize().await {
        warn!("Failed to optimize vector store: {}", e);
    }

    Ok(())
}

/// Compare SQLite sources with stored embeddings, optionally repairing the gaps
#[inline]
pub async fn check(config: Config, fix: bool) -> Result<()> {
    let runtime = build_runtime(config).await?;
    let validator =
        ConsistencyValidator::new(&runtime.database, &runtime.vector_store, &runtime.queue);

    let report = validator
        .validate_consistency()
        .await
        .context("Failed to check consistency")?;

    println!("{}", report.summary());

    for issue in &report.inconsistent_spaces {
        println!(
            "   Space {}: {} sources, {} embeddings ({} missing, {} orphaned)",
            issue.space_id,
            issue.sqlite_sources,
            issue.lancedb_embeddings,
            issue.missing_in_vectors.len(),
            issue.orphaned_in_vectors.len()
        );
    }

    if report.is_consistent || !fix {
        if !report.is_consistent {
            println!();
            println!("💡 Run 'cofounder check --fix' to repair {} issues", report.total_issues());
        }
        return Ok(());
    }

    let removed = validator
        .cleanup_orphaned_embeddings(&report.orphaned_in_vectors)
        .await?;
    let queued = validator
        .regenerate_missing_embeddings(&report.missing_in_vectors)
        .await?;
    println!("🗑️  Removed {} orphaned embeddings", removed);
    println!("📥 Queued {} missing sources", queued);

    if queued > 0 {
        let stats = runtime.indexer.process_pending().await?;
        println!("✅ Stored {} embeddings", stats.embeddings_stored);
    }

    Ok(())
}
