#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// Number of journal entries shown on a space overview
pub const RECENT_JOURNAL_ENTRIES: i64 = 5;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub struct SpaceQueries;

impl SpaceQueries {
    /// Create a space and record its creator as the owner
    #[inline]
    pub async fn create(pool: &SqlitePool, new_space: NewSpace) -> Result<(Space, SpaceMember)> {
        let now = Utc::now();
        let space = Space {
            id: new_id(),
            name: new_space.name,
            description: new_space.description,
            problem_statement: new_space.problem_statement,
            invite_token: new_id(),
            created_at: now,
        };
        let owner = SpaceMember {
            id: new_id(),
            space_id: space.id.clone(),
            user_id: new_space.user_id,
            role: MemberRole::Owner,
            joined_at: now,
        };

        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT INTO spaces (id, name, description, problem_statement, invite_token, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&space.id)
        .bind(&space.name)
        .bind(&space.description)
        .bind(&space.problem_statement)
        .bind(&space.invite_token)
        .bind(space.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to create space")?;

        sqlx::query(
            "INSERT INTO space_members (id, space_id, user_id, role, joined_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&owner.id)
        .bind(&owner.space_id)
        .bind(&owner.user_id)
        .bind(owner.role)
        .bind(owner.joined_at)
        .execute(&mut *tx)
        .await
        .context("Failed to add space owner")?;

        tx.commit().await.context("Failed to commit space creation")?;

        debug!("Created space {} ({})", space.name, space.id);
        Ok((space, owner))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Space>> {
        sqlx::query_as::<_, Space>(
            "SELECT id, name, description, problem_statement, invite_token, created_at
             FROM spaces WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get space by id")
    }

    #[inline]
    pub async fn get_by_invite_token(pool: &SqlitePool, token: &str) -> Result<Option<Space>> {
        sqlx::query_as::<_, Space>(
            "SELECT id, name, description, problem_statement, invite_token, created_at
             FROM spaces WHERE invite_token = ?",
        )
        .bind(token)
        .fetch_optional(pool)
        .await
        .context("Failed to get space by invite token")
    }

    /// Add `user_id` to the space behind `invite_token`. Joining twice returns the
    /// existing membership. `None` when the token is unknown.
    #[inline]
    pub async fn join(
        pool: &SqlitePool,
        invite_token: &str,
        user_id: &str,
    ) -> Result<Option<(Space, SpaceMember)>> {
        let Some(space) = Self::get_by_invite_token(pool, invite_token).await? else {
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO space_members (id, space_id, user_id, role, joined_at)
             VALUES (?, ?, ?, 'MEMBER', ?)
             ON CONFLICT (space_id, user_id) DO NOTHING",
        )
        .bind(new_id())
        .bind(&space.id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to join space")?;

        let member = sqlx::query_as::<_, SpaceMember>(
            "SELECT id, space_id, user_id, role, joined_at
             FROM space_members WHERE space_id = ? AND user_id = ?",
        )
        .bind(&space.id)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("Failed to load space membership")?;

        Ok(Some((space, member)))
    }

    #[inline]
    pub async fn list_members(pool: &SqlitePool, space_id: &str) -> Result<Vec<SpaceMember>> {
        sqlx::query_as::<_, SpaceMember>(
            "SELECT id, space_id, user_id, role, joined_at
             FROM space_members WHERE space_id = ? ORDER BY joined_at ASC",
        )
        .bind(space_id)
        .fetch_all(pool)
        .await
        .context("Failed to list space members")
    }

    /// Space overview: members, recent journal entries, tasks and documents
    #[inline]
    pub async fn get_details(pool: &SqlitePool, id: &str) -> Result<Option<SpaceDetails>> {
        let Some(space) = Self::get_by_id(pool, id).await? else {
            return Ok(None);
        };

        let members = Self::list_members(pool, id).await?;
        let journal_entries = JournalQueries::list_recent(pool, id, RECENT_JOURNAL_ENTRIES).await?;
        let tasks = TaskQueries::list_by_space(pool, id).await?;
        let documents = DocumentQueries::list_by_space(pool, id).await?;

        Ok(Some(SpaceDetails {
            space,
            members,
            journal_entries,
            tasks,
            documents,
        }))
    }

    #[inline]
    pub async fn list_ids(pool: &SqlitePool) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT id FROM spaces ORDER BY created_at ASC")
            .fetch_all(pool)
            .await
            .context("Failed to list spaces")
    }
}

pub struct MessageQueries;

impl MessageQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_message: NewMessage) -> Result<Message> {
        let message = Message {
            id: new_id(),
            space_id: new_message.space_id,
            user_id: new_message.user_id,
            content: new_message.content,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO messages (id, space_id, user_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.space_id)
        .bind(&message.user_id)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(pool)
        .await
        .context("Failed to create message")?;

        Ok(message)
    }

    /// Messages of a space, oldest first
    #[inline]
    pub async fn list_by_space(pool: &SqlitePool, space_id: &str) -> Result<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            "SELECT id, space_id, user_id, content, created_at
             FROM messages WHERE space_id = ? ORDER BY created_at ASC",
        )
        .bind(space_id)
        .fetch_all(pool)
        .await
        .context("Failed to list messages")
    }

    /// Every message, optionally restricted to one space
    #[inline]
    pub async fn list_all(pool: &SqlitePool, space_id: Option<&str>) -> Result<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            "SELECT id, space_id, user_id, content, created_at
             FROM messages WHERE (?1 IS NULL OR space_id = ?1) ORDER BY created_at ASC",
        )
        .bind(space_id)
        .fetch_all(pool)
        .await
        .context("Failed to list all messages")
    }
}

pub struct JournalQueries;

impl JournalQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_entry: NewJournalEntry) -> Result<JournalEntry> {
        let now = Utc::now();
        let entry = JournalEntry {
            id: new_id(),
            space_id: new_entry.space_id,
            user_id: new_entry.user_id,
            title: new_entry.title,
            content: new_entry.content,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO journal_entries (id, space_id, user_id, title, content, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.space_id)
        .bind(&entry.user_id)
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(pool)
        .await
        .context("Failed to create journal entry")?;

        Ok(entry)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<JournalEntry>> {
        sqlx::query_as::<_, JournalEntry>(
            "SELECT id, space_id, user_id, title, content, created_at, updated_at
             FROM journal_entries WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get journal entry by id")
    }

    /// Journal entries of a space, newest first
    #[inline]
    pub async fn list_by_space(pool: &SqlitePool, space_id: &str) -> Result<Vec<JournalEntry>> {
        Self::list_recent(pool, space_id, -1).await
    }

    /// The `limit` newest entries of a space; a negative limit means all of them
    #[inline]
    pub async fn list_recent(
        pool: &SqlitePool,
        space_id: &str,
        limit: i64,
    ) -> Result<Vec<JournalEntry>> {
        sqlx::query_as::<_, JournalEntry>(
            "SELECT id, space_id, user_id, title, content, created_at, updated_at
             FROM journal_entries WHERE space_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(space_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list journal entries")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool, space_id: Option<&str>) -> Result<Vec<JournalEntry>> {
        sqlx::query_as::<_, JournalEntry>(
            "SELECT id, space_id, user_id, title, content, created_at, updated_at
             FROM journal_entries WHERE (?1 IS NULL OR space_id = ?1) ORDER BY created_at ASC",
        )
        .bind(space_id)
        .fetch_all(pool)
        .await
        .context("Failed to list all journal entries")
    }

    #[inline]
    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        update: JournalEntryUpdate,
    ) -> Result<Option<JournalEntry>> {
        let result = sqlx::query(
            "UPDATE journal_entries
             SET title = COALESCE(?, title), content = COALESCE(?, content), updated_at = ?
             WHERE id = ?",
        )
        .bind(update.title)
        .bind(update.content)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update journal entry")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::get_by_id(pool, id).await
    }

    /// Delete an entry, returning it when it existed
    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<Option<JournalEntry>> {
        let Some(entry) = Self::get_by_id(pool, id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM journal_entries WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete journal entry")?;

        Ok(Some(entry))
    }
}

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let now = Utc::now();
        let document = Document {
            id: new_id(),
            space_id: new_document.space_id,
            title: new_document.title,
            url: new_document.url,
            summary: new_document.summary,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO documents (id, space_id, title, url, summary, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id)
        .bind(&document.space_id)
        .bind(&document.title)
        .bind(&document.url)
        .bind(&document.summary)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(pool)
        .await
        .context("Failed to create document")?;

        Ok(document)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
        sqlx::query_as::<_, Document>(
            "SELECT id, space_id, title, url, summary, created_at, updated_at
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by id")
    }

    /// Documents of a space, newest first
    #[inline]
    pub async fn list_by_space(pool: &SqlitePool, space_id: &str) -> Result<Vec<Document>> {
        sqlx::query_as::<_, Document>(
            "SELECT id, space_id, title, url, summary, created_at, updated_at
             FROM documents WHERE space_id = ? ORDER BY created_at DESC",
        )
        .bind(space_id)
        .fetch_all(pool)
        .await
        .context("Failed to list documents")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool, space_id: Option<&str>) -> Result<Vec<Document>> {
        sqlx::query_as::<_, Document>(
            "SELECT id, space_id, title, url, summary, created_at, updated_at
             FROM documents WHERE (?1 IS NULL OR space_id = ?1) ORDER BY created_at ASC",
        )
        .bind(space_id)
        .fetch_all(pool)
        .await
        .context("Failed to list all documents")
    }

    #[inline]
    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        update: DocumentUpdate,
    ) -> Result<Option<Document>> {
        let result = sqlx::query(
            "UPDATE documents
             SET title = COALESCE(?, title), url = COALESCE(?, url),
                 summary = COALESCE(?, summary), updated_at = ?
             WHERE id = ?",
        )
        .bind(update.title)
        .bind(update.url)
        .bind(update.summary)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update document")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
        let Some(document) = Self::get_by_id(pool, id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(Some(document))
    }
}

pub struct TaskQueries;

impl TaskQueries {
    /// Create a task in the `TODO` state
    #[inline]
    pub async fn create(pool: &SqlitePool, new_task: NewTask) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            id: new_id(),
            space_id: new_task.space_id,
            user_id: new_task.user_id,
            title: new_task.title,
            category: new_task.category,
            status: TaskStatus::Todo,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO tasks (id, space_id, user_id, title, category, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(&task.space_id)
        .bind(&task.user_id)
        .bind(&task.title)
        .bind(&task.category)
        .bind(task.status)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(pool)
        .await
        .context("Failed to create task")?;

        Ok(task)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Task>> {
        sqlx::query_as::<_, Task>(
            "SELECT id, space_id, user_id, title, category, status, created_at, updated_at
             FROM tasks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get task by id")
    }

    /// Tasks of a space, newest first
    #[inline]
    pub async fn list_by_space(pool: &SqlitePool, space_id: &str) -> Result<Vec<Task>> {
        sqlx::query_as::<_, Task>(
            "SELECT id, space_id, user_id, title, category, status, created_at, updated_at
             FROM tasks WHERE space_id = ? ORDER BY created_at DESC",
        )
        .bind(space_id)
        .fetch_all(pool)
        .await
        .context("Failed to list tasks")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool, space_id: Option<&str>) -> Result<Vec<Task>> {
        sqlx::query_as::<_, Task>(
            "SELECT id, space_id, user_id, title, category, status, created_at, updated_at
             FROM tasks WHERE (?1 IS NULL OR space_id = ?1) ORDER BY created_at ASC",
        )
        .bind(space_id)
        .fetch_all(pool)
        .await
        .context("Failed to list all tasks")
    }

    #[inline]
    pub async fn update(pool: &SqlitePool, id: &str, update: TaskUpdate) -> Result<Option<Task>> {
        let result = sqlx::query(
            "UPDATE tasks
             SET title = COALESCE(?, title), category = COALESCE(?, category),
                 status = COALESCE(?, status), updated_at = ?
             WHERE id = ?",
        )
        .bind(update.title)
        .bind(update.category)
        .bind(update.status)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update task")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<Option<Task>> {
        let Some(task) = Self::get_by_id(pool, id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete task")?;

        Ok(Some(task))
    }
}
