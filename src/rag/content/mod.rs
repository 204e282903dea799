// Text representations of team content as they are embedded


use anyhow::Result;
use sqlx::SqlitePool;

use crate::database::SourceType;
use crate::database::sqlite::{
    Document, DocumentQueries, JournalEntry, JournalQueries, Message, MessageQueries, Task,
    TaskQueries,
};

/// A source row reduced to what the embedding pipeline needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexableSource {
    pub source_type: SourceType,
    pub source_id: String,
    pub space_id: String,
    pub content: String,
}

impl IndexableSource {
    #[inline]
    pub fn source_key(&self) -> String {
        self.source_type.source_key(&self.source_id)
    }
}

impl From<&Message> for IndexableSource {
    #[inline]
    fn from(message: &Message) -> Self {
        Self {
            source_type: SourceType::Chat,
            source_id: message.id.clone(),
            space_id: message.space_id.clone(),
            content: message.content.clone(),
        }
    }
}

impl From<&JournalEntry> for IndexableSource {
    #[inline]
    fn from(entry: &JournalEntry) -> Self {
        Self {
            source_type: SourceType::Journal,
            source_id: entry.id.clone(),
            space_id: entry.space_id.clone(),
            content: format!("{}\n{}", entry.title, entry.content),
        }
    }
}

impl From<&Document> for IndexableSource {
    #[inline]
    fn from(document: &Document) -> Self {
        Self {
            source_type: SourceType::Doc,
            source_id: document.id.clone(),
            space_id: document.space_id.clone(),
            content: format!(
                "Document: {}\nSummary: {}",
                document.title,
                document.summary.as_deref().unwrap_or_default()
            ),
        }
    }
}

impl From<&Task> for IndexableSource {
    #[inline]
    fn from(task: &Task) -> Self {
        let mut content = format!("Task: {}", task.title);
        if let Some(category) = task.category.as_deref().filter(|c| !c.trim().is_empty()) {
            content.push_str("\nCategory: ");
            content.push_str(category);
        }
        content.push_str("\nStatus: ");
        content.push_str(&task.status.to_string());

        Self {
            source_type: SourceType::Task,
            source_id: task.id.clone(),
            space_id: task.space_id.clone(),
            content,
        }
    }
}

/// Cut `text` to at most `max_chars` characters, never splitting a character
#[inline]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text.split_at(byte_index).0,
        None => text,
    }
}

/// Every embeddable source, optionally restricted to one space
#[inline]
pub async fn collect_sources(
    pool: &SqlitePool,
    space_id: Option<&str>,
) -> Result<Vec<IndexableSource>> {
    let mut sources = Vec::new();

    sources.extend(
        MessageQueries::list_all(pool, space_id)
            .await?
            .iter()
            .map(IndexableSource::from),
    );
    sources.extend(
        JournalQueries::list_all(pool, space_id)
            .await?
            .iter()
            .map(IndexableSource::from),
    );
    sources.extend(
        DocumentQueries::list_all(pool, space_id)
            .await?
            .iter()
            .map(IndexableSource::from),
    );
    sources.extend(
        TaskQueries::list_all(pool, space_id)
            .await?
            .iter()
            .map(IndexableSource::from),
    );

    Ok(sources)
}
